use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tool configuration, loadable from a YAML file. Every field has a default
/// so a missing config file or a partial one is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote catalog endpoint returning a JSON array of stories.
    pub api_url: String,
    /// Base URL that relative audio references are resolved against.
    pub base_audio_url: String,
    /// Per-request timeout for catalog and audio downloads, in seconds.
    pub request_timeout_secs: u64,
    /// Leading audio to remove before transcription, in seconds.
    pub trim_seconds: f64,
    /// Root directory for all durable state (caches and report).
    pub data_dir: PathBuf,
    /// `whisper-cli` binary, resolved from PATH when not absolute.
    pub whisper_cli: PathBuf,
    /// Whisper ggml model file.
    pub whisper_model: PathBuf,
    /// Spoken language hint passed to the transcription engine.
    pub language: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "https://idsp-dev.teacher-network.in/backend/stories/en/".to_string(),
            base_audio_url: "https://idsp-dev.teacher-network.in/".to_string(),
            request_timeout_secs: 120,
            trim_seconds: 20.0,
            data_dir: PathBuf::from("data"),
            whisper_cli: PathBuf::from("whisper-cli"),
            whisper_model: PathBuf::from("models/ggml-base.bin"),
            language: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Raw downloaded audio artifacts (and their trimmed derivatives).
    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    /// Cached transcripts, one text file per item key.
    pub fn transcript_dir(&self) -> PathBuf {
        self.data_dir.join("transcripts")
    }

    /// Cached raw catalog response.
    pub fn catalog_cache(&self) -> PathBuf {
        self.data_dir.join("stories_cache.json")
    }

    /// The append-only analysis report.
    pub fn output_csv(&self) -> PathBuf {
        self.data_dir.join("stories_analysis.csv")
    }

    /// Create the cache directories if they do not exist yet.
    pub fn prepare_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.audio_dir())?;
        std::fs::create_dir_all(self.transcript_dir())?;
        Ok(())
    }
}
