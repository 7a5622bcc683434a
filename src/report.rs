use crate::analysis::{AnalysisResult, WORD_LENGTH_BUCKETS};
use crate::catalog::WorkItem;
use crate::error::SinkError;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::debug;

/// Column holding the item key; the completion ledger extracts this column
/// when it reloads the report at startup.
const KEY_COLUMN: &str = "nid";

/// One finished item, flattened for the report.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub title: String,
    pub key: String,
    pub duration: Option<f64>,
    pub analysis: AnalysisResult,
}

impl ResultRow {
    pub fn from_item(item: &WorkItem, analysis: AnalysisResult) -> Self {
        Self {
            title: item.title.clone(),
            key: item.key.clone(),
            duration: item.duration,
            analysis,
        }
    }

    fn to_record(&self) -> Vec<String> {
        let mut record = vec![
            self.title.clone(),
            self.key.clone(),
            self.duration.map(|d| d.to_string()).unwrap_or_default(),
            self.analysis.word_count.to_string(),
            self.analysis.sentence_count.to_string(),
            format!("{:.2}", self.analysis.avg_words_per_sentence),
            self.analysis.pos_counts.nouns.to_string(),
            self.analysis.pos_counts.verbs.to_string(),
            self.analysis.pos_counts.adjectives.to_string(),
        ];
        for len in WORD_LENGTH_BUCKETS {
            record.push(self.analysis.words_of_length(len).to_string());
        }
        record
    }
}

/// Fixed column set. Order and names must stay stable across runs: the
/// ledger's key extraction and plain file accumulation both depend on it.
fn header() -> Vec<String> {
    let mut cols: Vec<String> = [
        "title",
        KEY_COLUMN,
        "duration",
        "word_count",
        "sentence_count",
        "avg_words_per_sentence",
        "noun_count",
        "verb_count",
        "adj_count",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for len in WORD_LENGTH_BUCKETS {
        cols.push(format!("{len}_letter_words"));
    }
    cols
}

/// Append-only CSV report. One row per successfully processed item; the file
/// itself is the single source of truth for completion.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, row: &ResultRow) -> Result<(), SinkError> {
        let new_file = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if new_file {
            writer.write_record(header())?;
        }
        writer.write_record(row.to_record())?;
        writer.flush()?;
        Ok(())
    }

    /// Keys of every row already in the report. Missing file means an empty
    /// set, not an error: the first run starts from nothing.
    pub fn completed_keys(&self) -> Result<HashSet<String>, SinkError> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let key_idx = reader
            .headers()?
            .iter()
            .position(|h| h == KEY_COLUMN)
            .unwrap_or(1);
        let mut keys = HashSet::new();
        for record in reader.records() {
            let record = record?;
            if let Some(key) = record.get(key_idx) {
                keys.insert(key.to_string());
            }
        }
        Ok(keys)
    }
}

/// Item keys that already produced a report row. Reconstructed from the
/// report at startup; recording is implicit in a successful append, plus an
/// in-memory insert so a key duplicated within one catalog runs once.
pub struct CompletionLedger {
    keys: HashSet<String>,
}

impl CompletionLedger {
    pub fn load(sink: &CsvSink) -> Result<Self, SinkError> {
        let keys = sink.completed_keys()?;
        debug!(completed = keys.len(), "loaded completion ledger");
        Ok(Self { keys })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn record(&mut self, key: &str) {
        self.keys.insert(key.to_string());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
