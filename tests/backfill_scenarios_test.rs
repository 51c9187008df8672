use instance_backfill::config::{BackfillConfig, Environment, TableRef};
use instance_backfill::document_store::{BookRecord, InMemoryDocumentSource};
use instance_backfill::placeholder::is_placeholder;
use instance_backfill::target_store::InMemoryTargetStore;
use instance_backfill::{Backfiller, BackfillError};

fn pages_read() -> TableRef {
    TableRef::new("bloomreadertest", "pages_read", "title")
}

fn comprehension() -> TableRef {
    TableRef::new("bloomreadertest", "comprehension", "title")
}

fn config(execute: bool) -> BackfillConfig {
    let mut config = BackfillConfig::for_environment(Environment::Local, None, "postgres://unused").unwrap();
    config.tables = vec![pages_read(), comprehension()];
    config.really_run_update = execute;
    config
}

#[tokio::test]
async fn test_safe_title_updates_only_the_table_missing_it() {
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some("Cat"), Some("abc"))]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Cat"), Some("abc"))
        .with_row(&comprehension(), Some("Cat"), None);
    let config = config(true);

    let summary = Backfiller::new(&config, &docs, &store).run().await.unwrap();

    assert_eq!(summary.classification.safe.get("Cat").map(String::as_str), Some("abc"));
    assert_eq!(summary.safe_pass.tables[0].planned, 0, "pages_read already has the id");
    assert_eq!(summary.safe_pass.tables[1].planned, 1);
    assert_eq!(store.ids_for(&comprehension(), "Cat"), vec![Some("abc".to_string())]);
    assert!(summary.placeholders.is_empty());
}

#[tokio::test]
async fn test_conflicting_sources_make_title_ambiguous() {
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some("Dog"), Some("X"))]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Dog"), Some("Y"))
        .with_row(&comprehension(), Some("Dog"), None);
    let config = config(true);

    let summary = Backfiller::new(&config, &docs, &store).run().await.unwrap();

    assert!(summary.classification.is_ambiguous("Dog"));
    assert!(!summary.classification.is_safe("Dog"));
    assert_eq!(summary.safe_pass.planned(), 0);
    // ambiguous titles are known, so they never get a placeholder either
    assert!(!summary.placeholders.contains_key("Dog"));
    assert_eq!(store.ids_for(&comprehension(), "Dog"), vec![None]);
    assert_eq!(store.statements_executed(), 0);
}

#[tokio::test]
async fn test_orphan_gets_one_placeholder_everywhere() {
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some("Orphan"), None)]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Orphan"), None)
        .with_row(&pages_read(), Some("Orphan"), None)
        .with_row(&comprehension(), Some("Orphan"), None);
    let config = config(true);

    let summary = Backfiller::new(&config, &docs, &store).run().await.unwrap();

    let generated = summary.placeholders.get("Orphan").expect("Orphan should get a placeholder");
    assert!(generated.starts_with("auto_"));
    assert!(is_placeholder(generated));
    assert_eq!(summary.placeholders.len(), 1);

    let expected = Some(generated.clone());
    assert_eq!(store.ids_for(&pages_read(), "Orphan"), vec![expected.clone(), expected.clone()]);
    assert_eq!(store.ids_for(&comprehension(), "Orphan"), vec![expected]);
}

#[tokio::test]
async fn test_null_here_but_id_elsewhere_gets_no_placeholder() {
    let docs = InMemoryDocumentSource::new(vec![]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Cat"), None)
        .with_row(&comprehension(), Some("Cat"), Some("abc"));
    let config = config(true);

    let summary = Backfiller::new(&config, &docs, &store).run().await.unwrap();

    assert!(summary.placeholders.is_empty());
    assert_eq!(store.ids_for(&pages_read(), "Cat"), vec![Some("abc".to_string())]);
}

#[tokio::test]
async fn test_blank_titles_never_get_a_placeholder() {
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some(""), Some("doc-id"))]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some(""), Some("abc"))
        .with_row(&comprehension(), Some(""), None)
        .with_row(&comprehension(), Some(""), None);
    let config = config(true);

    let summary = Backfiller::new(&config, &docs, &store).run().await.unwrap();

    assert!(summary.placeholders.is_empty(), "blank title got {:?}", summary.placeholders);
    assert_eq!(summary.placeholder_pass.planned(), 0);
    assert_eq!(store.ids_for(&comprehension(), ""), vec![None, None]);
    assert_eq!(store.statements_executed(), 0);
}

#[tokio::test]
async fn test_blank_id_is_replaced_by_placeholder() {
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some("Ghost"), Some(""))]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Ghost"), Some(""))
        .with_row(&comprehension(), Some("Ghost"), None);
    let config = config(true);

    let summary = Backfiller::new(&config, &docs, &store).run().await.unwrap();

    let generated = summary.placeholders.get("Ghost").expect("Ghost has no usable id anywhere");
    assert_eq!(summary.placeholder_pass.planned(), 2, "both tables still lack an id");
    let expected = vec![Some(generated.clone())];
    assert_eq!(store.ids_for(&pages_read(), "Ghost"), expected);
    assert_eq!(store.ids_for(&comprehension(), "Ghost"), expected);
}

#[tokio::test]
async fn test_second_run_plans_nothing() {
    let docs = InMemoryDocumentSource::new(vec![
        BookRecord::new(Some("Cat"), Some("abc")),
        BookRecord::new(Some("Noah's Ark"), Some("n1")),
    ]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Cat"), None)
        .with_row(&pages_read(), Some("Noah's Ark"), None)
        .with_row(&comprehension(), Some("Orphan"), None);
    let config = config(true);

    let first = Backfiller::new(&config, &docs, &store).run().await.unwrap();
    assert_eq!(first.safe_pass.planned(), 2);
    assert_eq!(first.placeholder_pass.planned(), 1);
    let executed = store.statements_executed();

    let second = Backfiller::new(&config, &docs, &store).run().await.unwrap();
    assert_eq!(second.safe_pass.planned(), 0);
    // the orphan's placeholder is now a real observation
    assert!(second.placeholders.is_empty());
    assert_eq!(store.statements_executed(), executed, "No statements on the second run");
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some("Cat"), Some("abc"))]);
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Cat"), None)
        .with_row(&pages_read(), Some("Cat"), None)
        .with_row(&comprehension(), Some("Orphan"), None);
    let config = config(false);

    let summary = Backfiller::new(&config, &docs, &store).run().await.unwrap();

    // one statement per title, not per row
    assert_eq!(summary.safe_pass.planned(), 1);
    assert_eq!(summary.placeholder_pass.planned(), 1);
    for table in summary.safe_pass.tables.iter().chain(summary.placeholder_pass.tables.iter()) {
        if let Some(batch) = table.batch {
            assert_eq!(batch.before, batch.after, "{} changed on a dry run", table.table);
        }
    }
    assert_eq!(store.statements_executed(), 0);
    assert_eq!(store.ids_for(&pages_read(), "Cat"), vec![None, None]);
}

#[tokio::test]
async fn test_document_store_failure_aborts_before_any_update() {
    let docs = InMemoryDocumentSource::failing("status was 500");
    let store = InMemoryTargetStore::new()
        .with_row(&pages_read(), Some("Cat"), None)
        .with_row(&comprehension(), Some("Cat"), None);
    let config = config(true);

    let err = Backfiller::new(&config, &docs, &store).run().await.unwrap_err();

    assert!(matches!(err, BackfillError::DocumentStore(_)));
    assert_eq!(store.statements_executed(), 0);
}

#[tokio::test]
async fn test_missing_table_aborts_run() {
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some("Cat"), Some("abc"))]);
    // comprehension is configured but was never created
    let store = InMemoryTargetStore::new().with_row(&pages_read(), Some("Cat"), None);
    let config = config(true);

    let err = Backfiller::new(&config, &docs, &store).run().await.unwrap_err();

    assert!(matches!(err, BackfillError::Database(_)));
    assert_eq!(store.statements_executed(), 0);
}

#[tokio::test]
async fn test_ambiguous_report_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ambiguous.json");
    let docs = InMemoryDocumentSource::new(vec![BookRecord::new(Some("Dog"), Some("X"))]);
    let store = InMemoryTargetStore::new().with_row(&pages_read(), Some("Dog"), Some("Y"));
    let mut config = config(false);
    config.tables = vec![pages_read()];
    config.ambiguous_report = Some(path.clone());

    Backfiller::new(&config, &docs, &store).run().await.unwrap();

    let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written[0]["title"], "Dog");
    assert_eq!(written[0]["instance_ids"], serde_json::json!(["X", "Y"]));
}
