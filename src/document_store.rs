use crate::config::DocumentStoreConfig;
use crate::error::BackfillError;
use crate::observation::TitleIdIndex;
use serde::Deserialize;

/// One book from the library's Parse server. Any field can be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BookRecord {
    #[serde(rename = "objectId", default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "bookInstanceId", default)]
    pub book_instance_id: Option<String>,
}

impl BookRecord {
    pub fn new(title: Option<&str>, book_instance_id: Option<&str>) -> Self {
        Self {
            object_id: None,
            title: title.map(str::to_string),
            book_instance_id: book_instance_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    results: Option<Vec<BookRecord>>,
}

#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    async fn fetch_books(&self) -> Result<Vec<BookRecord>, BackfillError>;
}

pub fn index_books(books: &[BookRecord]) -> TitleIdIndex {
    TitleIdIndex::from_raw(
        books
            .iter()
            .map(|b| (b.title.as_deref(), b.book_instance_id.as_deref())),
    )
}

pub struct ParseDocumentStore {
    client: reqwest::Client,
    config: DocumentStoreConfig,
}

impl ParseDocumentStore {
    pub fn new(config: DocumentStoreConfig) -> Result<Self, BackfillError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: DocumentStoreConfig) -> Self {
        Self { client, config }
    }

    pub fn books_url(&self) -> String {
        format!("{}/classes/books", self.config.url.trim_end_matches('/'))
    }
}

impl DocumentSource for ParseDocumentStore {
    async fn fetch_books(&self) -> Result<Vec<BookRecord>, BackfillError> {
        let limit = self.config.limit.to_string();
        let response = self
            .client
            .get(self.books_url())
            .header("Content-Type", "text/json")
            .header("X-Parse-Application-Id", &self.config.app_id)
            .query(&[("keys", "objectId,bookInstanceId,title"), ("limit", limit.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(BackfillError::DocumentStore(format!(
                "request returned with problems, status was {}",
                status.as_u16()
            )));
        }

        let body: ParseResponse = response
            .json()
            .await
            .map_err(|e| BackfillError::DocumentStore(format!("malformed response: {}", e)))?;
        let books = body
            .results
            .ok_or_else(|| BackfillError::DocumentStore("response has no results list".to_string()))?;

        tracing::info!(count = books.len(), "fetched books from document store");
        if books.len() >= self.config.limit {
            tracing::warn!(limit = self.config.limit, "document store result count reached the limit; results may be truncated");
        }
        Ok(books)
    }
}

pub struct InMemoryDocumentSource {
    books: Result<Vec<BookRecord>, String>,
}

impl InMemoryDocumentSource {
    pub fn new(books: Vec<BookRecord>) -> Self {
        Self { books: Ok(books) }
    }

    /// A source whose every fetch fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            books: Err(message.to_string()),
        }
    }
}

impl DocumentSource for InMemoryDocumentSource {
    async fn fetch_books(&self) -> Result<Vec<BookRecord>, BackfillError> {
        self.books.clone().map_err(BackfillError::DocumentStore)
    }
}
