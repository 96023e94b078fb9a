//! Integration tests for the harvester
//!
//! These tests drive the coordinator through whole runs, first with
//! in-memory collaborators and then end-to-end against wiremock servers
//! standing in for the search service and the document source.

use async_trait::async_trait;
use lex_harvest::checkpoint::{CheckpointStore, FileCheckpointStore};
use lex_harvest::config::{Config, PublishTarget};
use lex_harvest::crawler::{run_harvest, Coordinator, ResolvedEntry, RunSettings};
use lex_harvest::documents::{CelexId, DocumentSource, FetchError};
use lex_harvest::publish::{LocalPublisher, PublishError, PublishReceipt, Publisher};
use lex_harvest::search::{Record, SearchPage, SearchSource};
use lex_harvest::state::RunPhase;
use lex_harvest::storage::{Ledger, SqliteLedger};
use lex_harvest::HarvestError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ===== In-memory collaborators =====

/// Search source over a fixed list of references
struct ListSearch {
    references: Vec<Option<String>>,
    calls: Arc<Mutex<Vec<(u64, u32)>>>,
}

impl ListSearch {
    fn new(references: Vec<Option<String>>) -> Self {
        Self {
            references,
            calls: Arc::default(),
        }
    }
}

#[async_trait]
impl SearchSource for ListSearch {
    async fn fetch_page(&self, offset: u64, page_size: u32) -> Result<SearchPage, HarvestError> {
        self.calls.lock().unwrap().push((offset, page_size));
        let records = self
            .references
            .iter()
            .enumerate()
            .skip(offset as usize)
            .take(page_size as usize)
            .map(|(i, reference)| Record {
                position: i as u64,
                reference: reference.clone(),
                title: None,
            })
            .collect();
        Ok(SearchPage {
            records,
            total_available: Some(self.references.len() as u64),
        })
    }
}

/// Document source answering from a map; unknown identifiers are 404s
///
/// Identifiers marked as down fail the way an overloaded source does.
#[derive(Clone, Default)]
struct MapDocuments {
    texts: Arc<Mutex<HashMap<String, String>>>,
    down: Arc<Mutex<HashSet<String>>>,
}

impl MapDocuments {
    fn with(texts: &[(&str, &str)]) -> Self {
        let docs = Self::default();
        for (id, text) in texts {
            docs.insert(id, text);
        }
        docs
    }

    fn insert(&self, id: &str, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(id.to_string(), text.to_string());
    }

    fn set_down(&self, id: &str, down: bool) {
        let mut ids = self.down.lock().unwrap();
        if down {
            ids.insert(id.to_string());
        } else {
            ids.remove(id);
        }
    }
}

#[async_trait]
impl DocumentSource for MapDocuments {
    async fn fetch_text(&self, id: &CelexId) -> Result<String, FetchError> {
        if self.down.lock().unwrap().contains(id.as_str()) {
            return Err(FetchError::RetriesExhausted {
                attempts: 3,
                last_error: "HTTP 503".to_string(),
            });
        }
        self.texts
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or(FetchError::Status { status: 404 })
    }
}

/// Publisher that records every batch it accepts
#[derive(Clone, Default)]
struct RecordingPublisher {
    batches: Arc<Mutex<Vec<Vec<ResolvedEntry>>>>,
    fail: bool,
}

impl RecordingPublisher {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn batches(&self) -> Vec<Vec<ResolvedEntry>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, batch: &[ResolvedEntry]) -> Result<PublishReceipt, PublishError> {
        if self.fail {
            return Err(PublishError::Status {
                operation: "commit",
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(PublishReceipt {
            added: batch.len(),
            updated: 0,
            total_rows: batch.len(),
            commit: Some("test".to_string()),
        })
    }
}

/// Checkpoint store whose saves always fail, simulating a crash after publish
struct BrokenCheckpoint;

impl CheckpointStore for BrokenCheckpoint {
    fn load(&self) -> u64 {
        0
    }

    fn save(&mut self, _offset: u64) -> Result<(), HarvestError> {
        Err(HarvestError::Checkpoint {
            path: "broken".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }
}

// ===== Helpers =====

fn celex(n: u32) -> String {
    format!("32019L{:04}", n)
}

fn references(ids: &[String]) -> Vec<Option<String>> {
    ids.iter().map(|id| Some(format!("CELEX:{}", id))).collect()
}

fn settings(page_size: u32, max_entries: usize) -> RunSettings {
    RunSettings {
        page_size,
        max_entries,
        request_delay: Duration::ZERO,
        config_hash: "test".to_string(),
        ..RunSettings::default()
    }
}

fn read_checkpoint(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

struct Harness {
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn checkpoint_path(&self) -> PathBuf {
        self.dir.path().join("state/checkpoint.txt")
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("state/ledger.db")
    }

    fn dataset_path(&self) -> PathBuf {
        self.dir.path().join("dataset/train.jsonl")
    }

    fn set_checkpoint(&self, offset: u64) {
        FileCheckpointStore::new(self.checkpoint_path())
            .save(offset)
            .unwrap();
    }

    fn ledger(&self) -> SqliteLedger {
        SqliteLedger::open(&self.ledger_path()).unwrap()
    }

    fn coordinator(
        &self,
        search: ListSearch,
        documents: MapDocuments,
        publisher: Box<dyn Publisher>,
        settings: RunSettings,
    ) -> Coordinator {
        Coordinator::new(
            Box::new(FileCheckpointStore::new(self.checkpoint_path())),
            Box::new(search),
            Box::new(documents),
            publisher,
            Box::new(self.ledger()),
            settings,
        )
    }
}

// ===== Run semantics =====

#[tokio::test]
async fn test_resolved_missed_and_failed_records() {
    let harness = Harness::new();
    let search = ListSearch::new(vec![
        Some("CELEX:32019L0790".to_string()),
        Some("Besluit zonder nummer".to_string()),
        Some("CELEX:32019L0771".to_string()),
    ]);
    let documents = MapDocuments::with(&[("32019L0790", "A")]);
    let publisher = RecordingPublisher::default();

    let report = harness
        .coordinator(search, documents, Box::new(publisher.clone()), settings(3, 250))
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(report.examined, 3);
    assert_eq!(report.resolution_misses, 1);
    assert_eq!(report.fetch_failures, 1);

    let batches = publisher.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[0][0].identifier.as_str(), "32019L0790");
    assert_eq!(batches[0][0].text, "A");

    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("3"));

    // The failed document is kept for a later run
    let ledger = harness.ledger();
    let due = ledger.due_deferred(10, 3).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].identifier, "32019L0771");
    assert_eq!(due[0].record_offset, Some(2));

    let run = &ledger.recent_runs(1).unwrap()[0];
    assert_eq!(run.phase, RunPhase::Done);
    assert_eq!(run.end_offset, Some(3));
    assert_eq!(run.published, 1);
}

#[tokio::test]
async fn test_batch_never_exceeds_cap() {
    let harness = Harness::new();
    let ids: Vec<String> = (1..=300).map(celex).collect();
    let texts: Vec<(String, String)> = ids.iter().map(|id| (id.clone(), format!("tekst {}", id))).collect();
    let documents = MapDocuments::default();
    for (id, text) in &texts {
        documents.insert(id, text);
    }
    let publisher = RecordingPublisher::default();

    let report = harness
        .coordinator(
            ListSearch::new(references(&ids)),
            documents,
            Box::new(publisher.clone()),
            settings(100, 250),
        )
        .run()
        .await
        .unwrap();

    assert_eq!(report.published, 250);
    assert_eq!(report.pages_fetched, 3);
    assert!(!report.exhausted);
    assert_eq!(publisher.batches()[0].len(), 250);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("250"));
}

#[tokio::test]
async fn test_exactly_cap_records_available() {
    let harness = Harness::new();
    let ids: Vec<String> = (1..=250).map(celex).collect();
    let documents = MapDocuments::default();
    for id in &ids {
        documents.insert(id, "tekst");
    }
    let publisher = RecordingPublisher::default();

    let report = harness
        .coordinator(
            ListSearch::new(references(&ids)),
            documents,
            Box::new(publisher.clone()),
            settings(100, 250),
        )
        .run()
        .await
        .unwrap();

    assert_eq!(report.published, 250);
    assert_eq!(report.end_offset, 250);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("250"));
}

#[tokio::test]
async fn test_zero_records_at_offset_keeps_checkpoint() {
    let harness = Harness::new();
    harness.set_checkpoint(40);
    let ids: Vec<String> = (1..=40).map(celex).collect();
    let search = ListSearch::new(references(&ids));
    let calls = search.calls.clone();
    let publisher = RecordingPublisher::default();

    let report = harness
        .coordinator(
            search,
            MapDocuments::default(),
            Box::new(publisher.clone()),
            settings(100, 250),
        )
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(report.examined, 0);
    assert!(report.exhausted);
    assert!(report.receipt.is_none());
    assert!(publisher.batches().is_empty());
    assert_eq!(*calls.lock().unwrap(), vec![(40, 100)]);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("40"));
}

#[tokio::test]
async fn test_publish_failure_leaves_checkpoint_unchanged() {
    let harness = Harness::new();
    harness.set_checkpoint(5);
    let ids: Vec<String> = (1..=15).map(celex).collect();
    let documents = MapDocuments::default();
    for id in &ids {
        documents.insert(id, "tekst");
    }

    let mut coordinator = harness.coordinator(
        ListSearch::new(references(&ids)),
        documents,
        Box::new(RecordingPublisher::failing()),
        settings(100, 250),
    );
    let err = coordinator.run().await.unwrap_err();

    assert!(matches!(err, HarvestError::Publish(_)));
    assert_eq!(coordinator.phase(), RunPhase::Failed);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("5"));

    // Nothing from the failed run is deferred; the records will be re-examined
    let ledger = harness.ledger();
    assert_eq!(ledger.count_deferred_pending().unwrap(), 0);
    let run = &ledger.recent_runs(1).unwrap()[0];
    assert_eq!(run.phase, RunPhase::Failed);
    assert!(run.error_message.is_some());
}

#[tokio::test]
async fn test_republish_after_crash_does_not_duplicate() {
    let harness = Harness::new();
    let ids: Vec<String> = (1..=3).map(celex).collect();
    let documents = MapDocuments::default();
    for id in &ids {
        documents.insert(id, "tekst");
    }
    let publisher = LocalPublisher::new(harness.dataset_path(), "EU richtlijnen");

    // First run publishes, then fails to save the checkpoint
    let mut crashed = Coordinator::new(
        Box::new(BrokenCheckpoint),
        Box::new(ListSearch::new(references(&ids))),
        Box::new(documents.clone()),
        Box::new(publisher.clone()),
        Box::new(SqliteLedger::in_memory().unwrap()),
        settings(100, 250),
    );
    assert!(matches!(
        crashed.run().await,
        Err(HarvestError::Checkpoint { .. })
    ));
    assert_eq!(publisher.read_rows().await.unwrap().len(), 3);

    // The rerun starts from the same offset and publishes the same batch
    let report = harness
        .coordinator(
            ListSearch::new(references(&ids)),
            documents,
            Box::new(publisher.clone()),
            settings(100, 250),
        )
        .run()
        .await
        .unwrap();

    let receipt = report.receipt.unwrap();
    assert_eq!(receipt.added, 0);
    assert_eq!(receipt.updated, 3);
    assert_eq!(publisher.read_rows().await.unwrap().len(), 3);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("3"));
}

#[tokio::test]
async fn test_deferred_document_recovered_by_later_run() {
    let harness = Harness::new();
    let ids = vec![celex(1), celex(2)];
    let documents = MapDocuments::with(&[("32019L0001", "een")]);
    let publisher = RecordingPublisher::default();

    let first = harness
        .coordinator(
            ListSearch::new(references(&ids)),
            documents.clone(),
            Box::new(publisher.clone()),
            settings(100, 250),
        )
        .run()
        .await
        .unwrap();
    assert_eq!(first.fetch_failures, 1);
    assert_eq!(harness.ledger().count_deferred_pending().unwrap(), 1);

    // The source recovers; no new search records exist
    documents.insert("32019L0002", "twee");
    let second = harness
        .coordinator(
            ListSearch::new(references(&ids)),
            documents,
            Box::new(publisher.clone()),
            settings(100, 250),
        )
        .run()
        .await
        .unwrap();

    assert_eq!(second.examined, 0);
    assert_eq!(second.recovered, 1);
    assert_eq!(second.published, 1);
    assert_eq!(publisher.batches()[1][0].identifier.as_str(), "32019L0002");

    let ledger = harness.ledger();
    assert_eq!(ledger.count_deferred_pending().unwrap(), 0);
    assert_eq!(ledger.count_deferred_recovered().unwrap(), 1);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("2"));
}

#[tokio::test]
async fn test_deferred_document_given_up_after_max_attempts() {
    let harness = Harness::new();
    let ids = vec![celex(1)];
    let publisher = RecordingPublisher::default();

    for _ in 0..4 {
        harness
            .coordinator(
                ListSearch::new(references(&ids)),
                MapDocuments::default(),
                Box::new(publisher.clone()),
                RunSettings {
                    max_deferred_attempts: 3,
                    ..settings(100, 250)
                },
            )
            .run()
            .await
            .unwrap();
    }

    let ledger = harness.ledger();
    assert!(ledger.due_deferred(10, 3).unwrap().is_empty());
    assert_eq!(ledger.count_deferred_pending().unwrap(), 1);
    assert!(publisher.batches().is_empty());
}

#[tokio::test]
async fn test_deferred_retry_failing_again_bumps_attempts() {
    let harness = Harness::new();
    let ids = vec![celex(1), celex(2)];
    let documents = MapDocuments::with(&[("32019L0001", "een")]);
    documents.set_down("32019L0002", true);
    let publisher = RecordingPublisher::default();
    let run = |documents: MapDocuments| {
        harness.coordinator(
            ListSearch::new(references(&ids)),
            documents,
            Box::new(publisher.clone()),
            RunSettings {
                max_deferred_attempts: 5,
                ..settings(100, 250)
            },
        )
    };

    run(documents.clone()).run().await.unwrap();
    let due = harness.ledger().due_deferred(10, 5).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].identifier, "32019L0002");
    assert_eq!(due[0].attempts, 1);
    assert_eq!(due[0].record_offset, Some(1));

    // Still down: the retry fails and only the attempt count moves
    let second = run(documents.clone()).run().await.unwrap();
    assert_eq!(second.examined, 0);
    assert_eq!(second.recovered, 0);
    assert_eq!(second.published, 0);
    let due = harness.ledger().due_deferred(10, 5).unwrap();
    assert_eq!(due[0].attempts, 2);
    assert!(due[0].last_error.contains("503"), "{}", due[0].last_error);

    // Back up, but the document is gone for now
    documents.set_down("32019L0002", false);
    run(documents.clone()).run().await.unwrap();
    let due = harness.ledger().due_deferred(10, 5).unwrap();
    assert_eq!(due[0].attempts, 3);
    assert!(due[0].last_error.contains("404"), "{}", due[0].last_error);

    documents.insert("32019L0002", "twee");
    let last = run(documents).run().await.unwrap();
    assert_eq!(last.recovered, 1);

    let ledger = harness.ledger();
    assert!(ledger.due_deferred(10, 5).unwrap().is_empty());
    assert_eq!(ledger.count_deferred_recovered().unwrap(), 1);
    assert_eq!(publisher.batches().len(), 2);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("2"));
}

#[tokio::test]
async fn test_missing_and_empty_documents_do_not_trip_breaker() {
    let harness = Harness::new();
    let ids: Vec<String> = (1..=20).map(celex).collect();
    let documents = MapDocuments::default();
    // 1..=12 are unknown (404); then outages broken up by definitive failures
    documents.set_down(&celex(13), true);
    documents.set_down(&celex(14), true);
    documents.insert(&celex(15), "   ");
    documents.set_down(&celex(16), true);
    documents.set_down(&celex(17), true);
    documents.insert(&celex(19), "negentien");
    documents.insert(&celex(20), "twintig");
    let publisher = RecordingPublisher::default();

    let report = harness
        .coordinator(
            ListSearch::new(references(&ids)),
            documents,
            Box::new(publisher.clone()),
            RunSettings {
                max_consecutive_fetch_failures: 3,
                ..settings(100, 250)
            },
        )
        .run()
        .await
        .unwrap();

    assert_eq!(report.phase, RunPhase::Done);
    assert_eq!(report.examined, 20);
    assert_eq!(report.fetch_failures, 18);
    assert_eq!(report.published, 2);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("20"));

    let published: Vec<String> = publisher.batches()[0]
        .iter()
        .map(|e| e.identifier.to_string())
        .collect();
    assert_eq!(published, vec![celex(19), celex(20)]);
    assert_eq!(harness.ledger().count_deferred_pending().unwrap(), 18);
}

// ===== End to end over HTTP =====

const SRU_NS: &str = "http://docs.oasis-open.org/ns/search-ws/sruResponse";

fn sru_page(total: u64, identifiers: &[&str]) -> String {
    let records: String = identifiers
        .iter()
        .map(|id| {
            format!(
                "<sru:record><sru:recordData><dcterms:identifier>{}</dcterms:identifier>\
                 <dcterms:title>Richtlijn {}</dcterms:title></sru:recordData></sru:record>",
                id, id
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<sru:searchRetrieveResponse xmlns:sru="{}" xmlns:dcterms="http://purl.org/dc/terms/">
  <sru:version>2.0</sru:version>
  <sru:numberOfRecords>{}</sru:numberOfRecords>
  <sru:records>{}</sru:records>
</sru:searchRetrieveResponse>"#,
        SRU_NS, total, records
    )
}

fn document_page(body: &str) -> String {
    format!(
        r#"<html><head><title>EUR-Lex</title></head><body>
        <header>EUR-Lex</header>
        <div id="document1"><p>{}</p></div>
        </body></html>"#,
        body
    )
}

fn http_config(server: &MockServer, harness: &Harness) -> Config {
    let mut config = Config::default();
    config.search.endpoint = format!("{}/sru/Search", server.uri());
    config.search.request_delay_ms = 0;
    config.documents.base_url = server.uri();
    config.http.max_retries = 1;
    config.http.backoff_base_ms = 1;
    config.state.checkpoint_path = harness.checkpoint_path().display().to_string();
    config.state.ledger_path = harness.ledger_path().display().to_string();
    config.publish.target = PublishTarget::Local;
    config.publish.local_path = harness.dataset_path().display().to_string();
    config
}

async fn mount_document(server: &MockServer, id: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/legal-content/NL/TXT/HTML/"))
        .and(query_param("uri", format!("CELEX:{}", id).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(document_page(body)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_end_to_end_local_dataset() {
    let server = MockServer::start().await;
    let harness = Harness::new();

    Mock::given(method("GET"))
        .and(path("/sru/Search"))
        .and(query_param("startRecord", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sru_page(
            3,
            &["32019L0790", "geen celex", "32019L0771"],
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sru/Search"))
        .and(query_param("startRecord", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sru_page(3, &[])))
        .mount(&server)
        .await;
    mount_document(&server, "32019L0790", "Richtlijn inzake auteursrecht").await;
    mount_document(&server, "32019L0771", "Richtlijn inzake verkoop van goederen").await;

    let config = http_config(&server, &harness);

    let first = run_harvest(&config, "hash", false).await.unwrap();
    assert_eq!(first.examined, 3);
    assert_eq!(first.resolution_misses, 1);
    assert_eq!(first.published, 2);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("3"));

    let publisher = LocalPublisher::from_config(&config.publish);
    let rows = publisher.read_rows().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].identifier, "32019L0790");
    assert_eq!(rows[0].text, "Richtlijn inzake auteursrecht");
    assert_eq!(rows[0].source, "EU richtlijnen");

    let second = run_harvest(&config, "hash", false).await.unwrap();
    assert_eq!(second.start_offset, 3);
    assert_eq!(second.published, 0);
    assert!(second.exhausted);
    assert_eq!(publisher.read_rows().await.unwrap().len(), 2);
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("3"));
}

#[tokio::test]
async fn test_end_to_end_dry_run_writes_nothing() {
    let server = MockServer::start().await;
    let harness = Harness::new();

    Mock::given(method("GET"))
        .and(path("/sru/Search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sru_page(1, &["32019L0790"])))
        .mount(&server)
        .await;
    mount_document(&server, "32019L0790", "Artikel 1").await;

    let config = http_config(&server, &harness);
    let report = run_harvest(&config, "hash", true).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.published, 1);
    assert!(read_checkpoint(&harness.checkpoint_path()).is_none());
    assert!(!harness.dataset_path().exists());
    assert!(harness.ledger().recent_runs(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_end_to_end_search_outage_fails_run() {
    let server = MockServer::start().await;
    let harness = Harness::new();
    harness.set_checkpoint(7);

    Mock::given(method("GET"))
        .and(path("/sru/Search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let config = http_config(&server, &harness);
    let err = run_harvest(&config, "hash", false).await.unwrap_err();

    assert!(matches!(err, HarvestError::Search { offset: 7, .. }));
    assert_eq!(read_checkpoint(&harness.checkpoint_path()).as_deref(), Some("7"));
    assert!(!harness.dataset_path().exists());
}
