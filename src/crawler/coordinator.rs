//! Harvest coordinator - one run from checkpoint to published batch
//!
//! This module contains the run loop that ties the collaborators together:
//! - Loading the checkpoint and paging the search source from it
//! - Resolving records and fetching document texts into the batch
//! - Retrying documents deferred by earlier runs
//! - Publishing the batch and only then saving the checkpoint
//! - Recording the run and its deferred documents in the ledger

use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::config::{Config, PublishTarget};
use crate::crawler::{build_http_client, BatchAccumulator, ResolvedEntry, RetryPolicy};
use crate::documents::{resolve, CelexId, DocumentSource, EurLexFetcher, FetchError};
use crate::publish::{HubPublisher, LocalPublisher, PublishError, PublishReceipt, Publisher};
use crate::search::{Record, SearchSource, SruClient};
use crate::state::RunPhase;
use crate::storage::{DeferredFailure, Ledger, RunOutcome, SqliteLedger};
use crate::HarvestError;
use std::path::Path;
use std::time::Duration;

/// Knobs of a single run, taken from the configuration
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub page_size: u32,
    pub max_entries: usize,
    pub request_delay: Duration,
    /// Consecutive outage failures that abort the run; 0 disables the check
    pub max_consecutive_fetch_failures: u32,
    pub retry_deferred: bool,
    pub max_deferred_attempts: u32,
    pub config_hash: String,
    /// Page, resolve and fetch only; publish and persist nothing
    pub dry_run: bool,
}

impl RunSettings {
    pub fn from_config(config: &Config, config_hash: &str, dry_run: bool) -> Self {
        Self {
            page_size: config.search.page_size,
            max_entries: config.batch.max_entries,
            request_delay: Duration::from_millis(config.search.request_delay_ms),
            max_consecutive_fetch_failures: config.documents.max_consecutive_failures,
            retry_deferred: config.batch.retry_deferred,
            max_deferred_attempts: config.batch.max_deferred_attempts,
            config_hash: config_hash.to_string(),
            dry_run,
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), "", false)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub start_offset: u64,
    pub end_offset: u64,
    pub pages_fetched: u32,
    pub examined: u64,
    pub resolution_misses: u64,
    pub fetch_failures: u64,
    /// Deferred documents fetched successfully in this run
    pub recovered: u64,
    /// Entries handed to the publisher (or that would have been, in a dry run)
    pub published: usize,
    pub receipt: Option<PublishReceipt>,
    /// The search source had no records past the end offset
    pub exhausted: bool,
    pub dry_run: bool,
    pub phase: RunPhase,
}

/// Counters accumulated while a run is in progress
#[derive(Debug, Default)]
struct Progress {
    cursor: u64,
    pages_fetched: u32,
    examined: u64,
    resolution_misses: u64,
    fetch_failures: u64,
    recovered: u64,
    consecutive_failures: u32,
    exhausted: bool,
}

/// Ledger writes held back until the checkpoint is saved
#[derive(Debug, Default)]
struct PendingLedgerWrites {
    deferred: Vec<DeferredFailure>,
    bumps: Vec<(String, String)>,
}

/// Main harvest coordinator structure
pub struct Coordinator {
    checkpoint: Box<dyn CheckpointStore>,
    search: Box<dyn SearchSource>,
    documents: Box<dyn DocumentSource>,
    publisher: Box<dyn Publisher>,
    ledger: Box<dyn Ledger>,
    settings: RunSettings,
    phase: RunPhase,
}

impl Coordinator {
    pub fn new(
        checkpoint: Box<dyn CheckpointStore>,
        search: Box<dyn SearchSource>,
        documents: Box<dyn DocumentSource>,
        publisher: Box<dyn Publisher>,
        ledger: Box<dyn Ledger>,
        settings: RunSettings,
    ) -> Self {
        Self {
            checkpoint,
            search,
            documents,
            publisher,
            ledger,
            settings,
            phase: RunPhase::Start,
        }
    }

    /// Phase of the current (or last) run
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Executes one run
    ///
    /// The checkpoint is saved only after a successful publish, so a failed
    /// run leaves it untouched and the next run re-examines the same records.
    pub async fn run(&mut self) -> Result<RunReport, HarvestError> {
        self.phase = RunPhase::Start;
        let start_offset = self.checkpoint.load();
        tracing::info!(
            "Starting run at offset {}{}",
            start_offset,
            if self.settings.dry_run { " (dry run)" } else { "" }
        );

        let run_id = if self.settings.dry_run {
            None
        } else {
            match self
                .ledger
                .begin_run(&self.settings.config_hash, start_offset)
            {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!("Could not record run start in ledger: {}", e);
                    None
                }
            }
        };

        let mut progress = Progress {
            cursor: start_offset,
            ..Progress::default()
        };
        let mut batch = BatchAccumulator::new(self.settings.max_entries);
        let mut pending = PendingLedgerWrites::default();

        self.transition(RunPhase::Paging)?;
        if let Err(e) = self.page(&mut progress, &mut batch, &mut pending).await {
            return Err(self.fail(run_id, &progress, e));
        }

        if self.settings.retry_deferred && !batch.is_full() {
            self.retry_deferred(&mut progress, &mut batch, &mut pending)
                .await;
        }

        self.transition(RunPhase::Publishing)?;
        let entries = batch.drain();

        if self.settings.dry_run {
            tracing::info!(
                "Dry run: would publish {} entries and move the checkpoint to {}",
                entries.len(),
                progress.cursor
            );
            self.transition(RunPhase::Done)?;
            return Ok(self.report(start_offset, &progress, entries.len(), None));
        }

        let receipt = if entries.is_empty() {
            tracing::info!("Nothing to publish");
            None
        } else {
            tracing::info!("Publishing {} entries", entries.len());
            match self.publisher.publish(&entries).await {
                Ok(receipt) => Some(receipt),
                Err(e) => return Err(self.fail(run_id, &progress, e.into())),
            }
        };

        if progress.cursor != start_offset || receipt.is_some() {
            if let Err(e) = self.checkpoint.save(progress.cursor) {
                return Err(self.fail(run_id, &progress, e));
            }
            tracing::info!("Checkpoint saved at {}", progress.cursor);
        }

        self.commit_ledger(run_id, &progress, &entries, pending);
        self.transition(RunPhase::Done)?;

        Ok(self.report(start_offset, &progress, entries.len(), receipt))
    }

    async fn page(
        &mut self,
        progress: &mut Progress,
        batch: &mut BatchAccumulator,
        pending: &mut PendingLedgerWrites,
    ) -> Result<(), HarvestError> {
        let page_size = self.settings.page_size;
        let mut total_available: Option<u64> = None;

        loop {
            if let Some(total) = total_available {
                if progress.cursor >= total {
                    tracing::info!("Reached the end of the search results ({})", total);
                    progress.exhausted = true;
                    return Ok(());
                }
            }

            if progress.pages_fetched > 0 && !self.settings.request_delay.is_zero() {
                tokio::time::sleep(self.settings.request_delay).await;
            }

            let page = self.search.fetch_page(progress.cursor, page_size).await?;
            progress.pages_fetched += 1;
            if page.total_available.is_some() {
                total_available = page.total_available;
            }

            if page.is_exhausted() {
                tracing::info!("No records at offset {}", progress.cursor);
                progress.exhausted = true;
                return Ok(());
            }

            let short_page = page.records.len() < page_size as usize;
            for record in &page.records {
                if batch.is_full() {
                    break;
                }
                self.examine(record, progress, batch, pending).await?;
                progress.cursor += 1;
                progress.examined += 1;
            }

            tracing::info!(
                "Cursor {}: batch {}/{}, {} unresolved, {} fetch failures",
                progress.cursor,
                batch.len(),
                self.settings.max_entries,
                progress.resolution_misses,
                progress.fetch_failures
            );

            if batch.is_full() {
                tracing::info!("Batch is full");
                return Ok(());
            }
            if short_page {
                progress.exhausted = true;
                return Ok(());
            }
        }
    }

    async fn examine(
        &mut self,
        record: &Record,
        progress: &mut Progress,
        batch: &mut BatchAccumulator,
        pending: &mut PendingLedgerWrites,
    ) -> Result<(), HarvestError> {
        let Some(identifier) = resolve(record) else {
            tracing::debug!(
                "No document identifier in record {} ({:?})",
                record.position,
                record.reference
            );
            progress.resolution_misses += 1;
            return Ok(());
        };

        if batch.contains(&identifier) {
            tracing::debug!("{} already in batch", identifier);
            return Ok(());
        }

        match self.fetch_entry(&identifier).await {
            Ok(entry) => {
                progress.consecutive_failures = 0;
                batch.add(entry);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Fetching {} failed: {}", identifier, e);
                progress.fetch_failures += 1;
                if e.is_outage() {
                    progress.consecutive_failures += 1;
                } else {
                    // The source answered, so it is up.
                    progress.consecutive_failures = 0;
                }
                pending.deferred.push(DeferredFailure {
                    identifier: identifier.to_string(),
                    reference: record.reference.clone(),
                    record_offset: Some(record.position),
                    error: e.to_string(),
                });

                let limit = self.settings.max_consecutive_fetch_failures;
                if limit > 0 && progress.consecutive_failures >= limit {
                    return Err(HarvestError::DocumentSourceDown {
                        consecutive: progress.consecutive_failures,
                        identifier: identifier.into_string(),
                    });
                }
                Ok(())
            }
        }
    }

    async fn fetch_entry(&self, identifier: &CelexId) -> Result<ResolvedEntry, FetchError> {
        let text = self.documents.fetch_text(identifier).await?;
        ResolvedEntry::new(identifier.clone(), text).ok_or(FetchError::NoText)
    }

    async fn retry_deferred(
        &mut self,
        progress: &mut Progress,
        batch: &mut BatchAccumulator,
        pending: &mut PendingLedgerWrites,
    ) {
        let due = match self
            .ledger
            .due_deferred(batch.remaining(), self.settings.max_deferred_attempts)
        {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!("Could not read deferred documents: {}", e);
                return;
            }
        };
        if due.is_empty() {
            return;
        }

        tracing::info!("Retrying {} deferred documents", due.len());
        for deferred in due {
            if batch.is_full() {
                break;
            }
            let Some(identifier) = CelexId::find(&deferred.identifier) else {
                continue;
            };
            if batch.contains(&identifier) {
                continue;
            }

            match self.fetch_entry(&identifier).await {
                Ok(entry) => {
                    tracing::info!(
                        "Recovered {} after {} failed attempts",
                        identifier,
                        deferred.attempts
                    );
                    progress.recovered += 1;
                    batch.add(entry);
                }
                Err(e) => {
                    tracing::debug!("Deferred {} still failing: {}", identifier, e);
                    pending.bumps.push((deferred.identifier, e.to_string()));
                }
            }
        }
    }

    /// Applies the held-back ledger writes once the checkpoint is durable
    ///
    /// Ledger trouble here is logged and swallowed: the batch is already
    /// published and the checkpoint already moved.
    fn commit_ledger(
        &mut self,
        run_id: Option<i64>,
        progress: &Progress,
        entries: &[ResolvedEntry],
        pending: PendingLedgerWrites,
    ) {
        for failure in &pending.deferred {
            if let Err(e) = self.ledger.record_deferred(failure) {
                tracing::warn!("Could not defer {}: {}", failure.identifier, e);
            }
        }
        for (identifier, error) in &pending.bumps {
            if let Err(e) = self.ledger.bump_deferred_attempt(identifier, error) {
                tracing::warn!("Could not update deferred {}: {}", identifier, e);
            }
        }
        for entry in entries {
            if let Err(e) = self.ledger.mark_recovered(entry.identifier.as_str()) {
                tracing::warn!("Could not mark {} recovered: {}", entry.identifier, e);
            }
        }

        if let Some(run_id) = run_id {
            let outcome = self.outcome(progress, entries.len(), RunPhase::Done, None);
            if let Err(e) = self.ledger.finish_run(run_id, &outcome) {
                tracing::warn!("Could not record run completion: {}", e);
            }
        }
    }

    fn fail(&mut self, run_id: Option<i64>, progress: &Progress, error: HarvestError) -> HarvestError {
        tracing::error!("Run failed: {}", error);
        if self.phase.can_transition_to(RunPhase::Failed) {
            self.phase = RunPhase::Failed;
        }

        if let Some(run_id) = run_id {
            let outcome = self.outcome(progress, 0, RunPhase::Failed, Some(error.to_string()));
            if let Err(e) = self.ledger.finish_run(run_id, &outcome) {
                tracing::warn!("Could not record run failure: {}", e);
            }
        }
        error
    }

    fn transition(&mut self, next: RunPhase) -> Result<(), HarvestError> {
        if !self.phase.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!("Run phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    fn outcome(
        &self,
        progress: &Progress,
        published: usize,
        phase: RunPhase,
        error_message: Option<String>,
    ) -> RunOutcome {
        RunOutcome {
            end_offset: progress.cursor,
            examined: progress.examined,
            published: published as u64,
            resolution_misses: progress.resolution_misses,
            fetch_failures: progress.fetch_failures,
            recovered: progress.recovered,
            phase,
            error_message,
        }
    }

    fn report(
        &self,
        start_offset: u64,
        progress: &Progress,
        published: usize,
        receipt: Option<PublishReceipt>,
    ) -> RunReport {
        RunReport {
            start_offset,
            end_offset: progress.cursor,
            pages_fetched: progress.pages_fetched,
            examined: progress.examined,
            resolution_misses: progress.resolution_misses,
            fetch_failures: progress.fetch_failures,
            recovered: progress.recovered,
            published,
            receipt,
            exhausted: progress.exhausted,
            dry_run: self.settings.dry_run,
            phase: self.phase,
        }
    }
}

/// Assembles the production collaborators from `config` and executes one run
pub async fn run_harvest(
    config: &Config,
    config_hash: &str,
    dry_run: bool,
) -> Result<RunReport, HarvestError> {
    let client = build_http_client(&config.http)?;
    let policy = RetryPolicy::from_config(&config.http);

    let search = SruClient::new(client.clone(), &config.search, policy)?;
    let documents = EurLexFetcher::new(client.clone(), &config.documents, policy)?;

    let publisher: Box<dyn Publisher> = match config.publish.target {
        PublishTarget::Hub => {
            let hub = HubPublisher::new(client, &config.publish, HubPublisher::token_from_env())?;
            if !dry_run && !hub.has_token() {
                return Err(PublishError::MissingToken.into());
            }
            Box::new(hub)
        }
        PublishTarget::Local => Box::new(LocalPublisher::from_config(&config.publish)),
    };

    let ledger = SqliteLedger::open(Path::new(&config.state.ledger_path))?;
    let checkpoint = FileCheckpointStore::new(&config.state.checkpoint_path);

    let mut coordinator = Coordinator::new(
        Box::new(checkpoint),
        Box::new(search),
        Box::new(documents),
        publisher,
        Box::new(ledger),
        RunSettings::from_config(config, config_hash, dry_run),
    );
    coordinator.run().await
}
