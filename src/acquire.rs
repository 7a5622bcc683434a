use crate::catalog::{AudioRef, WorkItem};
use crate::error::DownloadError;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

static ILLEGAL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const MAX_NAME_LEN: usize = 150;

/// Derive a filesystem-safe cache name from an item title.
///
/// Deterministic: the same title always yields the same name, which is what
/// makes existence-based caching work across runs.
pub fn sanitize_title(title: &str) -> String {
    let s = ILLEGAL_CHARS.replace_all(title, "_");
    let s = WHITESPACE.replace_all(&s, "_");
    let s = s.trim_matches('_');
    s.chars().take(MAX_NAME_LEN).collect()
}

/// File extension for a remote audio URL: taken from the URL path with any
/// query string stripped; anything longer than 5 characters is treated as
/// not-an-extension and falls back to mp3.
fn audio_extension(url: &str) -> &str {
    let path = url.split('?').next().unwrap_or(url);
    match path.rsplit('.').next() {
        Some(ext) if !ext.is_empty() && ext.len() <= 5 && !ext.contains('/') => ext,
        _ => "mp3",
    }
}

/// Resolves each work item to a local audio file, downloading remote items
/// into the audio cache directory. A file already present at the target path
/// is the cache hit signal; no manifest is consulted.
pub struct Acquirer {
    client: reqwest::Client,
    audio_dir: PathBuf,
    /// Sanitized names seen this run, for collision detection only.
    seen_names: HashMap<String, String>,
}

impl Acquirer {
    pub fn new(client: reqwest::Client, audio_dir: PathBuf) -> Self {
        Self {
            client,
            audio_dir,
            seen_names: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, item: &WorkItem) -> Result<PathBuf, DownloadError> {
        match &item.audio {
            AudioRef::Local(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(DownloadError::NotFound(path.clone()))
                }
            }
            AudioRef::Remote(url) => {
                let name = sanitize_title(&item.title);
                if let Some(prev) = self.seen_names.insert(name.clone(), item.key.clone()) {
                    if prev != item.key {
                        warn!(
                            name = %name,
                            first = %prev,
                            second = %item.key,
                            "two items sanitize to the same artifact name; sharing one cache slot"
                        );
                    }
                }

                let filename = format!("{}.{}", name, audio_extension(url));
                let dest = self.audio_dir.join(filename);
                if dest.exists() {
                    info!(path = %dest.display(), "audio already cached");
                    return Ok(dest);
                }
                self.download(url, &dest).await?;
                Ok(dest)
            }
        }
    }

    /// Stream the audio into a `.part` file, then rename into place so a
    /// crash mid-stream never leaves a half-written file at the final path.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string());
        let tmp = dest.with_file_name(format!("{file_name}.part"));

        info!(url, path = %dest.display(), "downloading audio");
        match self.stream_to(url, &tmp).await {
            Ok(bytes) => {
                tokio::fs::rename(&tmp, dest).await?;
                info!(bytes, path = %dest.display(), "download complete");
                Ok(())
            }
            Err(e) => {
                // Clean up the partial file
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, url: &str, tmp: &Path) -> Result<u64, DownloadError> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(DownloadError::Status(resp.status()));
        }

        let expected = resp.content_length();
        let mut stream = resp.bytes_stream();
        let mut file = tokio::fs::File::create(tmp).await?;
        let mut downloaded: u64 = 0;
        let step = expected.map(|t| t / 5).filter(|s| *s > 0);
        let mut next_report = step.unwrap_or(u64::MAX);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if downloaded >= next_report {
                if let (Some(total), Some(step)) = (expected, step) {
                    debug!(
                        "download progress: {}%",
                        (downloaded * 100 / total).min(100)
                    );
                    next_report += step;
                }
            }
        }
        file.flush().await?;

        // Validate byte count against Content-Length when the server sent one
        if let Some(expected) = expected {
            if downloaded != expected {
                return Err(DownloadError::Truncated {
                    got: downloaded,
                    expected,
                });
            }
        }
        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn remote_item(key: &str, title: &str, url: &str) -> WorkItem {
        WorkItem {
            key: key.to_string(),
            title: title.to_string(),
            audio: AudioRef::Remote(url.to_string()),
            duration: None,
            community_submitted: false,
        }
    }

    #[test]
    fn sanitize_strips_illegal_and_collapses_whitespace() {
        // Each illegal character maps to its own underscore; only whitespace
        // runs are collapsed.
        assert_eq!(sanitize_title(r#"a/b:c*?"d"#), "a_b_c___d");
        assert_eq!(sanitize_title("a / b"), "a___b");
        assert_eq!(sanitize_title("  The  Sun\tand Moon "), "The_Sun_and_Moon");
        assert_eq!(sanitize_title("__x__"), "x");
    }

    #[test]
    fn sanitize_is_deterministic_and_bounded() {
        let long = "日本語 ".repeat(100);
        let a = sanitize_title(&long);
        let b = sanitize_title(&long);
        assert_eq!(a, b);
        assert!(a.chars().count() <= 150);
    }

    #[test]
    fn extension_from_url_with_fallback() {
        assert_eq!(audio_extension("https://x/a.mp3"), "mp3");
        assert_eq!(audio_extension("https://x/a.WAV?sig=abc"), "WAV");
        assert_eq!(audio_extension("https://x/a.longextension"), "mp3");
        assert_eq!(audio_extension("https://x/noext"), "mp3");
    }

    #[tokio::test]
    async fn existing_artifact_skips_network_entirely() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/a.mp3")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Sun.mp3"), b"cached").unwrap();

        let mut acquirer = Acquirer::new(reqwest::Client::new(), dir.path().to_path_buf());
        let item = remote_item("1", "Sun", &format!("{}/a.mp3", server.url()));
        let path = acquirer.resolve(&item).await.unwrap();

        assert_eq!(path, dir.path().join("Sun.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"cached");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn download_writes_final_file_only_on_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/a.mp3")
            .with_status(200)
            .with_body("audio-bytes")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut acquirer = Acquirer::new(reqwest::Client::new(), dir.path().to_path_buf());
        let item = remote_item("1", "Sun", &format!("{}/a.mp3", server.url()));
        let path = acquirer.resolve(&item).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"audio-bytes");
        assert!(!dir.path().join("Sun.mp3.part").exists());
    }

    #[tokio::test]
    async fn failed_download_leaves_no_artifact() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/a.mp3")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut acquirer = Acquirer::new(reqwest::Client::new(), dir.path().to_path_buf());
        let item = remote_item("1", "Sun", &format!("{}/a.mp3", server.url()));
        let err = acquirer.resolve(&item).await.unwrap_err();

        assert!(matches!(err, DownloadError::Status(s) if s.as_u16() == 404));
        assert!(!dir.path().join("Sun.mp3").exists());
        assert!(!dir.path().join("Sun.mp3.part").exists());
    }

    #[tokio::test]
    async fn colliding_titles_share_one_cache_slot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/a.mp3")
            .with_status(200)
            .with_body("first")
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let mut acquirer = Acquirer::new(reqwest::Client::new(), dir.path().to_path_buf());
        let url = format!("{}/a.mp3", server.url());

        let first = acquirer.resolve(&remote_item("1", "Sun", &url)).await.unwrap();
        // Different item, same sanitized title: resolves to the cached slot.
        let second = acquirer.resolve(&remote_item("2", "Sun", &url)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"first");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn local_items_pass_through() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("story.wav");
        std::fs::write(&path, b"w").unwrap();

        let mut acquirer = Acquirer::new(reqwest::Client::new(), dir.path().to_path_buf());
        let item = WorkItem {
            key: "story".to_string(),
            title: "story".to_string(),
            audio: AudioRef::Local(path.clone()),
            duration: None,
            community_submitted: false,
        };
        assert_eq!(acquirer.resolve(&item).await.unwrap(), path);

        let missing = WorkItem {
            audio: AudioRef::Local(dir.path().join("gone.mp3")),
            ..item
        };
        assert!(matches!(
            acquirer.resolve(&missing).await.unwrap_err(),
            DownloadError::NotFound(_)
        ));
    }
}
