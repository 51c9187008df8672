use crate::error::BackfillError;
use crate::sql::validate_identifier;
use std::fmt;

/// Column holding the instance id in every target table.
pub const INSTANCE_ID_COLUMN: &str = "book_instance_id";

/// Tables present in every analytics schema.
pub const SCHEMA_TABLES: [&str; 4] = [
    "pages_read",
    "book_or_shelf_opened",
    "comprehension",
    "questions_correct",
];

/// Parse defaults to 100 results when no limit is given, which silently truncates.
pub const DEFAULT_PARSE_LIMIT: usize = 1_000_000;

pub const DEFAULT_POOL_SIZE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

impl Environment {
    pub fn default_parse_url(&self) -> &'static str {
        match self {
            Environment::Local => "http://localhost:1337/parse",
            Environment::Dev => "https://bloom-parse-server-develop.azurewebsites.net/parse",
            Environment::Prod => "https://bloom-parse-server-production.azurewebsites.net/parse",
        }
    }

    pub fn default_app_id(&self) -> Option<&'static str> {
        match self {
            Environment::Local => Some("myAppId"),
            _ => None,
        }
    }

    pub fn schemas(&self) -> &'static [&'static str] {
        match self {
            Environment::Local | Environment::Dev => &["bloomreadertest"],
            Environment::Prod => &["bloomreader", "bloomreaderbeta"],
        }
    }

    /// The one table outside the per-schema set, if this environment has it.
    pub fn additional_table(&self) -> Option<TableRef> {
        match self {
            Environment::Prod => Some(TableRef::new("public", "bloom_library_downloads", "book_title")),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => write!(f, "local"),
            Environment::Dev => write!(f, "dev"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

/// A target table and the name of its title column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
    pub title_column: String,
}

impl TableRef {
    pub fn new(schema: &str, table: &str, title_column: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
            title_column: title_column.to_string(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    pub fn validate(&self) -> Result<(), BackfillError> {
        validate_identifier(&self.schema)?;
        validate_identifier(&self.table)?;
        validate_identifier(&self.title_column)?;
        Ok(())
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStoreConfig {
    pub url: String,
    pub app_id: String,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub environment: Environment,
    /// false = plan and report only, true = actually run the updates
    pub really_run_update: bool,
    pub document_store: DocumentStoreConfig,
    pub database_url: String,
    pub pool_size: u32,
    pub text_batches: bool,
    pub ambiguous_report: Option<std::path::PathBuf>,
    pub tables: Vec<TableRef>,
}

impl BackfillConfig {
    /// Defaults for an environment. The Parse app id must be supplied outside Local.
    pub fn for_environment(
        environment: Environment,
        app_id: Option<String>,
        database_url: &str,
    ) -> Result<Self, BackfillError> {
        let app_id = app_id
            .or_else(|| environment.default_app_id().map(str::to_string))
            .ok_or_else(|| BackfillError::Config(format!("PARSE_APP_ID is required for the {} environment", environment)))?;

        let config = Self {
            environment,
            really_run_update: false,
            document_store: DocumentStoreConfig {
                url: environment.default_parse_url().to_string(),
                app_id,
                limit: DEFAULT_PARSE_LIMIT,
            },
            database_url: database_url.to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            text_batches: false,
            ambiguous_report: None,
            tables: tables_for(environment),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), BackfillError> {
        if self.tables.is_empty() {
            return Err(BackfillError::Config("no target tables configured".to_string()));
        }
        for table in &self.tables {
            table.validate()?;
        }
        validate_identifier(INSTANCE_ID_COLUMN)?;
        if self.document_store.limit == 0 {
            return Err(BackfillError::Config("document store limit must be set above zero".to_string()));
        }
        if self.pool_size == 0 {
            return Err(BackfillError::Config("pool size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Every schema table for the environment, followed by its additional table.
pub fn tables_for(environment: Environment) -> Vec<TableRef> {
    let mut tables: Vec<TableRef> = environment
        .schemas()
        .iter()
        .flat_map(|schema| SCHEMA_TABLES.iter().map(move |table| TableRef::new(schema, table, "title")))
        .collect();
    if let Some(extra) = environment.additional_table() {
        tables.push(extra);
    }
    tables
}
