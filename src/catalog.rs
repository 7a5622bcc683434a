use crate::error::{CatalogError, EnumerationError, FetchError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Audio file extensions recognized when scanning a local directory.
const AUDIO_EXTENSIONS: [&str; 3] = ["mp3", "wav", "m4a"];

/// Where an item's audio lives.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioRef {
    /// Fully resolved download URL.
    Remote(String),
    /// File already on disk.
    Local(PathBuf),
}

/// One unit of work: a single story to transcribe and analyze.
///
/// Immutable after enumeration; downstream stages only read it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Stable identifier, used as the ledger and transcript cache key.
    pub key: String,
    pub title: String,
    pub audio: AudioRef,
    pub duration: Option<f64>,
    /// Community-submitted stories are excluded from processing.
    pub community_submitted: bool,
}

/// Business filter applied between enumeration and the orchestrator.
pub fn is_excluded(item: &WorkItem) -> bool {
    item.community_submitted
}

/// Enumerates work items from the remote story API, caching the raw JSON
/// response on disk. The cache never expires on its own: once written, later
/// runs read it instead of re-hitting the API.
pub struct RemoteCatalog {
    client: reqwest::Client,
    api_url: String,
    base_audio_url: String,
    cache_path: PathBuf,
}

impl RemoteCatalog {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        base_audio_url: String,
        cache_path: PathBuf,
    ) -> Self {
        Self {
            client,
            api_url,
            base_audio_url,
            cache_path,
        }
    }

    pub async fn enumerate(&self) -> Result<Vec<WorkItem>, FetchError> {
        let raw = if self.cache_path.exists() {
            debug!(cache = %self.cache_path.display(), "using cached catalog");
            tokio::fs::read_to_string(&self.cache_path).await?
        } else {
            info!(url = %self.api_url, "fetching story catalog");
            let resp = self.client.get(&self.api_url).send().await?;
            if !resp.status().is_success() {
                return Err(FetchError::Status(resp.status()));
            }
            let body = resp.text().await?;
            // Validate before caching so a bad response is not persisted.
            serde_json::from_str::<Value>(&body)?;
            let tmp = self.cache_path.with_extension("json.part");
            tokio::fs::write(&tmp, &body).await?;
            tokio::fs::rename(&tmp, &self.cache_path).await?;
            body
        };

        let json: Value = serde_json::from_str(&raw)?;
        Ok(parse_entries(&json, &self.base_audio_url))
    }
}

/// Turn the raw catalog JSON into work items. Entries without a usable audio
/// reference are logged and dropped here, before the pipeline sees them.
fn parse_entries(json: &Value, base_audio_url: &str) -> Vec<WorkItem> {
    let entries = match json.as_array() {
        Some(a) => a,
        None => {
            warn!("catalog response is not a JSON array");
            return Vec::new();
        }
    };

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let key = match field_string(entry, "nid") {
            Some(k) => k,
            None => {
                warn!("catalog entry has no nid, skipping");
                continue;
            }
        };

        let title = field_string(entry, "title")
            .or_else(|| field_string(entry, "story_title"))
            .unwrap_or_else(|| format!("(Untitled {key})"));

        let relative = ["audio_story_url", "audio", "audio_url"]
            .iter()
            .find_map(|k| field_string(entry, k));
        let relative = match relative {
            Some(r) => r,
            None => {
                warn!(nid = %key, "no audio reference for story, skipping");
                continue;
            }
        };
        let url = format!(
            "{}/{}",
            base_audio_url.trim_end_matches('/'),
            relative.trim_start_matches('/')
        );

        let duration = entry
            .get("duration")
            .and_then(|v| v.as_f64().or_else(|| v.as_str()?.trim().parse().ok()));

        let community_submitted = field_string(entry, "field_is_it_by_community")
            .map(|v| v.trim() == "1")
            .unwrap_or(false);

        items.push(WorkItem {
            key,
            title,
            audio: AudioRef::Remote(url),
            duration,
            community_submitted,
        });
    }
    items
}

/// Read a field as a non-empty string, accepting JSON strings and numbers.
fn field_string(entry: &Value, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Enumerates work items from a local directory of audio files, sorted by
/// file name for deterministic ordering.
pub struct LocalCatalog {
    dir: PathBuf,
}

impl LocalCatalog {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn enumerate(&self) -> Result<Vec<WorkItem>, EnumerationError> {
        if !self.dir.is_dir() {
            return Err(EnumerationError::MissingDirectory(self.dir.clone()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_audio_extension(p) && !is_trimmed_artifact(p))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .filter_map(|path| {
                let stem = path.file_stem()?.to_string_lossy().to_string();
                Some(WorkItem {
                    key: stem.clone(),
                    title: stem,
                    audio: AudioRef::Local(path),
                    duration: None,
                    community_submitted: false,
                })
            })
            .collect())
    }
}

/// Trimmed derivatives live next to their source audio. They must never be
/// enumerated as work items of their own, or every run would mint fresh keys
/// from the previous run's output.
fn is_trimmed_artifact(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with("_trimmed"))
        .unwrap_or(false)
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Either enumeration variant; the orchestrator does not care which.
pub enum Catalog {
    Remote(RemoteCatalog),
    Local(LocalCatalog),
}

impl Catalog {
    pub async fn enumerate(&self) -> Result<Vec<WorkItem>, CatalogError> {
        match self {
            Catalog::Remote(c) => Ok(c.enumerate().await?),
            Catalog::Local(c) => Ok(c.enumerate()?),
        }
    }
}
