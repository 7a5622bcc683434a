use crate::acquire::Acquirer;
use crate::analysis::Analyzer;
use crate::catalog::{is_excluded, Catalog, WorkItem};
use crate::error::{ItemError, RunError};
use crate::report::{CompletionLedger, CsvSink, ResultRow};
use crate::transcribe::{TranscriptStore, Transcriber};
use crate::trim::{AudioCodec, Trimmer};
use tracing::{debug, error, info};

/// What happened to one work item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// Full pipeline ran and a row was appended.
    Completed,
    /// The ledger already had this key; nothing was executed.
    AlreadyDone,
    /// Community-submitted, excluded by the business filter.
    Excluded,
    /// A stage failed; the item is abandoned for this run and will be
    /// retried on the next one.
    Failed(ItemError),
}

#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub key: String,
    pub title: String,
    pub stage: &'static str,
    pub message: String,
}

/// Aggregate of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: usize,
    pub already_done: usize,
    pub excluded: usize,
    pub failures: Vec<ItemFailure>,
}

/// Drives the per-item pipeline strictly in sequence. A failure in any stage
/// abandons that item and moves on; only catalog enumeration (and an
/// unreadable report) abort the run.
pub struct Pipeline<C, T, A> {
    catalog: Catalog,
    acquirer: Acquirer,
    trimmer: Trimmer<C>,
    store: TranscriptStore,
    transcriber: T,
    analyzer: A,
    sink: CsvSink,
}

impl<C: AudioCodec, T: Transcriber, A: Analyzer> Pipeline<C, T, A> {
    pub fn new(
        catalog: Catalog,
        acquirer: Acquirer,
        trimmer: Trimmer<C>,
        store: TranscriptStore,
        transcriber: T,
        analyzer: A,
        sink: CsvSink,
    ) -> Self {
        Self {
            catalog,
            acquirer,
            trimmer,
            store,
            transcriber,
            analyzer,
            sink,
        }
    }

    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let items = self.catalog.enumerate().await?;
        let mut ledger = CompletionLedger::load(&self.sink)?;
        info!(
            items = items.len(),
            completed = ledger.len(),
            "starting batch run"
        );

        let mut summary = RunSummary::default();
        for item in &items {
            match self.process(item, &mut ledger).await {
                ItemOutcome::Completed => {
                    info!(nid = %item.key, title = %item.title, "processed");
                    summary.completed += 1;
                }
                ItemOutcome::AlreadyDone => {
                    debug!(nid = %item.key, "already in report, skipping");
                    summary.already_done += 1;
                }
                ItemOutcome::Excluded => {
                    info!(nid = %item.key, "skipping community story");
                    summary.excluded += 1;
                }
                ItemOutcome::Failed(e) => {
                    error!(
                        nid = %item.key,
                        title = %item.title,
                        stage = e.stage(),
                        "failed to process story: {e}"
                    );
                    summary.failures.push(ItemFailure {
                        key: item.key.clone(),
                        title: item.title.clone(),
                        stage: e.stage(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            completed = summary.completed,
            already_done = summary.already_done,
            excluded = summary.excluded,
            failed = summary.failures.len(),
            "all non-community stories processed"
        );
        Ok(summary)
    }

    /// One item, isolated: every stage error is captured in the outcome.
    async fn process(&mut self, item: &WorkItem, ledger: &mut CompletionLedger) -> ItemOutcome {
        if is_excluded(item) {
            return ItemOutcome::Excluded;
        }
        // The ledger short-circuits the entire pipeline, download included.
        if ledger.contains(&item.key) {
            return ItemOutcome::AlreadyDone;
        }
        match self.process_inner(item).await {
            Ok(()) => {
                ledger.record(&item.key);
                ItemOutcome::Completed
            }
            Err(e) => ItemOutcome::Failed(e),
        }
    }

    async fn process_inner(&mut self, item: &WorkItem) -> Result<(), ItemError> {
        let audio = self.acquirer.resolve(item).await?;
        let trimmed = self.trimmer.transform(&audio).await?;
        let text = self
            .store
            .get_or_compute(&item.key, &trimmed, &self.transcriber)
            .await?;
        let analysis = self.analyzer.analyze(&text)?;
        self.sink.append(&ResultRow::from_item(item, analysis))?;
        Ok(())
    }
}
