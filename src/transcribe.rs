use crate::error::TranscriptionError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Boundary to the external transcription engine.
#[allow(async_fn_in_trait)]
pub trait Transcriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError>;
}

/// Caches transcript text per item key on disk. A hit skips the engine call
/// entirely, and a cached transcript is reused forever: changing the engine
/// or its model does not invalidate it.
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }

    pub async fn get_or_compute<T: Transcriber>(
        &self,
        key: &str,
        audio: &Path,
        engine: &T,
    ) -> Result<String, TranscriptionError> {
        let path = self.record_path(key);
        if path.exists() {
            debug!(key, "transcript already cached");
            return Ok(tokio::fs::read_to_string(&path).await?);
        }

        info!(key, audio = %audio.display(), "transcribing");
        let text = engine.transcribe(audio).await?;

        let tmp = self.dir.join(format!("{key}.txt.part"));
        tokio::fs::write(&tmp, &text).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(text)
    }
}

/// whisper.cpp CLI implementation of [`Transcriber`]: spawns `whisper-cli`
/// and captures the transcript from stdout.
pub struct WhisperCliTranscriber {
    binary: PathBuf,
    model: PathBuf,
    language: Option<String>,
}

impl WhisperCliTranscriber {
    pub fn new(binary: PathBuf, model: PathBuf, language: Option<String>) -> Self {
        Self {
            binary,
            model,
            language,
        }
    }
}

impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError> {
        if !self.model.exists() {
            return Err(TranscriptionError::Engine(format!(
                "model not found: {}",
                self.model.display()
            )));
        }

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(audio)
            .args(["-nt", "-np"]);
        if let Some(lang) = &self.language {
            cmd.args(["-l", lang]);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| TranscriptionError::Engine(format!("failed to spawn whisper-cli: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscriptionError::Engine(format!(
                "whisper-cli failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MockEngine {
        text: String,
        calls: AtomicUsize,
    }

    impl MockEngine {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Transcriber for MockEngine {
        async fn transcribe(&self, _audio: &Path) -> Result<String, TranscriptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    #[tokio::test]
    async fn computes_once_then_serves_from_cache() {
        let dir = TempDir::new().unwrap();
        let store = TranscriptStore::new(dir.path().to_path_buf());
        let engine = MockEngine::new("the sun rose slowly");
        let audio = dir.path().join("a.mp3");

        let first = store.get_or_compute("42", &audio, &engine).await.unwrap();
        let second = store.get_or_compute("42", &audio, &engine).await.unwrap();

        assert_eq!(first, "the sun rose slowly");
        assert_eq!(second, first);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("42.txt").exists());
        assert!(!dir.path().join("42.txt.part").exists());
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share_records() {
        let dir = TempDir::new().unwrap();
        let store = TranscriptStore::new(dir.path().to_path_buf());
        let engine = MockEngine::new("words");
        let audio = dir.path().join("a.mp3");

        store.get_or_compute("1", &audio, &engine).await.unwrap();
        store.get_or_compute("2", &audio, &engine).await.unwrap();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn engine_failure_writes_nothing() {
        struct FailingEngine;
        impl Transcriber for FailingEngine {
            async fn transcribe(&self, _audio: &Path) -> Result<String, TranscriptionError> {
                Err(TranscriptionError::Engine("boom".to_string()))
            }
        }

        let dir = TempDir::new().unwrap();
        let store = TranscriptStore::new(dir.path().to_path_buf());
        let err = store
            .get_or_compute("9", &dir.path().join("a.mp3"), &FailingEngine)
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptionError::Engine(_)));
        // Failure is not cached; the next run will retry.
        assert!(!dir.path().join("9.txt").exists());
    }
}
