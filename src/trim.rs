use crate::error::DecodeError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Boundary to the audio decode/encode tooling. The pipeline only needs a
/// duration probe and a head-trim; everything else about codecs stays behind
/// this trait.
#[allow(async_fn_in_trait)]
pub trait AudioCodec {
    async fn duration_seconds(&self, path: &Path) -> Result<f64, DecodeError>;
    async fn trim_head(&self, src: &Path, dest: &Path, seconds: f64) -> Result<(), DecodeError>;
}

/// Derived path for a trimmed artifact: `<stem>_trimmed.<ext>` next to the
/// source. Its existence on disk is the cache hit signal.
pub fn trimmed_path(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = artifact
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = if ext.is_empty() {
        format!("{stem}_trimmed")
    } else {
        format!("{stem}_trimmed.{ext}")
    };
    artifact.with_file_name(name)
}

/// Removes the leading `trim_seconds` of audio from each artifact, caching
/// the result so the transform runs at most once per artifact.
pub struct Trimmer<C> {
    codec: C,
    trim_seconds: f64,
}

impl<C: AudioCodec> Trimmer<C> {
    pub fn new(codec: C, trim_seconds: f64) -> Self {
        Self { codec, trim_seconds }
    }

    /// An artifact no longer than the trim duration is copied untouched:
    /// never an empty or negative-duration result.
    pub async fn transform(&self, artifact: &Path) -> Result<PathBuf, DecodeError> {
        let dest = trimmed_path(artifact);
        if dest.exists() {
            debug!(path = %dest.display(), "trimmed audio already cached");
            return Ok(dest);
        }

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = dest.with_file_name(format!("{file_name}.part"));

        let result = self.transform_to(artifact, &tmp).await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, &dest).await?;
        Ok(dest)
    }

    async fn transform_to(&self, artifact: &Path, tmp: &Path) -> Result<(), DecodeError> {
        let duration = self.codec.duration_seconds(artifact).await?;
        if duration <= self.trim_seconds {
            info!(
                path = %artifact.display(),
                duration,
                "audio shorter than trim window, keeping it whole"
            );
            tokio::fs::copy(artifact, tmp).await?;
        } else {
            info!(path = %artifact.display(), seconds = self.trim_seconds, "trimming audio head");
            self.codec.trim_head(artifact, tmp, self.trim_seconds).await?;
        }
        Ok(())
    }
}

/// `ffmpeg`/`ffprobe` subprocess implementation of [`AudioCodec`].
pub struct FfmpegCodec {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegCodec {
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// ffmpeg muxer name for a source extension. The trim output keeps the
/// original container even though it is first written to a `.part` path.
fn muxer_for(src: &Path) -> &'static str {
    match src
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "wav",
        Some("m4a") => "mp4",
        _ => "mp3",
    }
}

impl AudioCodec for FfmpegCodec {
    async fn duration_seconds(&self, path: &Path) -> Result<f64, DecodeError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| DecodeError::Probe(format!("failed to run ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeError::Probe(format!(
                "ffprobe failed for {}: {}",
                path.display(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .trim()
            .parse::<f64>()
            .map_err(|_| DecodeError::Probe(format!("unparseable duration: {:?}", stdout.trim())))
    }

    async fn trim_head(&self, src: &Path, dest: &Path, seconds: f64) -> Result<(), DecodeError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-ss", &seconds.to_string(), "-i"])
            .arg(src)
            .args(["-f", muxer_for(src)])
            .arg(dest)
            .output()
            .await
            .map_err(|e| DecodeError::Trim(format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeError::Trim(format!(
                "ffmpeg failed for {}: {}",
                src.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Codec stub with a fixed duration and call counters.
    struct MockCodec {
        duration: f64,
        fail_probe: bool,
        trims: AtomicUsize,
        probes: AtomicUsize,
    }

    impl MockCodec {
        fn with_duration(duration: f64) -> Self {
            Self {
                duration,
                fail_probe: false,
                trims: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
            }
        }
    }

    impl AudioCodec for &MockCodec {
        async fn duration_seconds(&self, _path: &Path) -> Result<f64, DecodeError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.fail_probe {
                return Err(DecodeError::Probe("mock probe failure".to_string()));
            }
            Ok(self.duration)
        }

        async fn trim_head(
            &self,
            _src: &Path,
            dest: &Path,
            _seconds: f64,
        ) -> Result<(), DecodeError> {
            self.trims.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, b"trimmed").await?;
            Ok(())
        }
    }

    #[test]
    fn trimmed_path_keeps_container_extension() {
        assert_eq!(
            trimmed_path(Path::new("/audio/Sun.mp3")),
            PathBuf::from("/audio/Sun_trimmed.mp3")
        );
        assert_eq!(
            trimmed_path(Path::new("/audio/noext")),
            PathBuf::from("/audio/noext_trimmed")
        );
    }

    #[tokio::test]
    async fn short_audio_is_copied_whole() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("short.mp3");
        std::fs::write(&src, b"original-bytes").unwrap();

        let codec = MockCodec::with_duration(10.0);
        let trimmer = Trimmer::new(&codec, 20.0);
        let out = trimmer.transform(&src).await.unwrap();

        // No-op policy: full copy, never an empty artifact
        assert_eq!(std::fs::read(&out).unwrap(), b"original-bytes");
        assert_eq!(codec.trims.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn long_audio_goes_through_the_codec() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("long.mp3");
        std::fs::write(&src, b"original").unwrap();

        let codec = MockCodec::with_duration(60.0);
        let trimmer = Trimmer::new(&codec, 20.0);
        let out = trimmer.transform(&src).await.unwrap();

        assert_eq!(out, dir.path().join("long_trimmed.mp3"));
        assert_eq!(std::fs::read(&out).unwrap(), b"trimmed");
        assert_eq!(codec.trims.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_trim_skips_the_codec() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("story.mp3");
        std::fs::write(&src, b"src").unwrap();
        std::fs::write(dir.path().join("story_trimmed.mp3"), b"cached").unwrap();

        let codec = MockCodec::with_duration(60.0);
        let trimmer = Trimmer::new(&codec, 20.0);
        let out = trimmer.transform(&src).await.unwrap();

        assert_eq!(std::fs::read(&out).unwrap(), b"cached");
        assert_eq!(codec.probes.load(Ordering::SeqCst), 0);
        assert_eq!(codec.trims.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn probe_failure_leaves_no_artifact() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("bad.mp3");
        std::fs::write(&src, b"x").unwrap();

        let codec = MockCodec {
            fail_probe: true,
            ..MockCodec::with_duration(0.0)
        };
        let trimmer = Trimmer::new(&codec, 20.0);
        let err = trimmer.transform(&src).await.unwrap_err();

        assert!(matches!(err, DecodeError::Probe(_)));
        assert!(!dir.path().join("bad_trimmed.mp3").exists());
        assert!(!dir.path().join("bad_trimmed.mp3.part").exists());
    }

    #[test]
    fn muxer_follows_source_container() {
        assert_eq!(muxer_for(Path::new("a.mp3")), "mp3");
        assert_eq!(muxer_for(Path::new("a.WAV")), "wav");
        assert_eq!(muxer_for(Path::new("a.m4a")), "mp4");
        assert_eq!(muxer_for(Path::new("a")), "mp3");
    }
}
