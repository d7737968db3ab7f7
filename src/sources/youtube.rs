use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{MusicSource, SourceKind, StreamRef, TrackMetadata};

/// Client for YouTube through the `yt-dlp` binary.
pub struct YouTubeClient {
    ytdlp_path: String,
    // Limit concurrent yt-dlp processes
    rate_limiter: Semaphore,
    // Stream URL picked during search, taken by the following resolve
    streams: DashMap<String, String>,
}

/// Subset of the JSON `yt-dlp --dump-json` prints.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    webpage_url: Option<String>,
    formats: Option<Vec<Format>>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Format {
    format_id: String,
    url: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
}

impl Format {
    fn has_audio(&self) -> bool {
        self.url.is_some() && self.acodec.as_deref().is_some_and(|c| c != "none")
    }

    fn is_audio_only(&self) -> bool {
        self.has_audio() && self.vcodec.as_deref() == Some("none")
    }
}

impl YouTubeClient {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            rate_limiter: Semaphore::new(3),
            streams: DashMap::new(),
        }
    }

    async fn dump_json(&self, target: &str) -> Result<Option<YtDlpInfo>> {
        let _permit = self.rate_limiter.acquire().await?;

        debug!("📊 yt-dlp --dump-json {}", target);

        let output = Command::new(&self.ytdlp_path)
            .kill_on_drop(true)
            .args([
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                target,
            ])
            .output()
            .await
            .context("Failed to run yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(line) = stdout.lines().find(|line| !line.trim().is_empty()) else {
            return Ok(None);
        };

        let info = serde_json::from_str(line).context("Failed to parse yt-dlp output")?;
        Ok(Some(info))
    }

    /// Checks whether a URL points at YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };

        matches!(
            parsed.host_str(),
            Some("www.youtube.com" | "youtube.com" | "youtu.be" | "m.youtube.com" | "music.youtube.com")
        )
    }

    fn search_target(query: &str) -> String {
        if Self::is_youtube_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    fn remember_stream(&self, identifier: &str, formats: &[Format]) {
        if let Some(url) = stream_url(formats) {
            self.streams.insert(identifier.to_string(), url);
        }
    }

    fn info_to_metadata(info: YtDlpInfo) -> TrackMetadata {
        let page_url = info
            .webpage_url
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));

        let mut meta = TrackMetadata::new(info.title, page_url.clone()).with_page_url(page_url);
        if let Some(uploader) = info.uploader {
            meta = meta.with_artist(uploader);
        }
        if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d > 0.0) {
            meta = meta.with_duration(Duration::from_secs_f64(duration));
        }
        if info.is_live.unwrap_or(false) {
            info!("🔴 Live stream: {}", meta.title);
        }
        meta
    }
}

/// Picks the best audio-only format, falling back to any format that carries audio.
fn select_audio_format(formats: &[Format]) -> Option<&Format> {
    let by_bitrate = |a: &&Format, b: &&Format| {
        a.abr
            .unwrap_or(0.0)
            .partial_cmp(&b.abr.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    };

    formats
        .iter()
        .filter(|f| f.is_audio_only())
        .max_by(by_bitrate)
        .or_else(|| formats.iter().filter(|f| f.has_audio()).max_by(by_bitrate))
}

fn stream_url(formats: &[Format]) -> Option<String> {
    let format = select_audio_format(formats)?;
    debug!("🎵 Selected format {} ({:?} kbps)", format.format_id, format.abr);
    format.url.clone()
}

#[async_trait]
impl MusicSource for YouTubeClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Video
    }

    async fn search(&self, query: &str) -> Result<Option<TrackMetadata>> {
        info!("🔍 Searching YouTube: {}", query);
        let Some(mut info) = self.dump_json(&Self::search_target(query)).await? else {
            return Ok(None);
        };

        let formats = info.formats.take().unwrap_or_default();
        let meta = Self::info_to_metadata(info);
        self.remember_stream(&meta.identifier, &formats);
        Ok(Some(meta))
    }

    async fn resolve_stream_ref(&self, identifier: &str) -> Result<Option<StreamRef>> {
        if let Some((_, url)) = self.streams.remove(identifier) {
            debug!("♻️ Reusing stream picked during search for {}", identifier);
            return Ok(Some(StreamRef::Url(url)));
        }

        let Some(info) = self.dump_json(identifier).await? else {
            return Ok(None);
        };
        Ok(stream_url(&info.formats.unwrap_or_default()).map(StreamRef::Url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: &str, acodec: &str, vcodec: &str, abr: Option<f64>) -> Format {
        Format {
            format_id: id.to_string(),
            url: Some(format!("https://cdn.example/{}", id)),
            acodec: Some(acodec.to_string()),
            vcodec: Some(vcodec.to_string()),
            abr,
        }
    }

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(YouTubeClient::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeClient::is_youtube_url("https://music.youtube.com/watch?v=test"));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
        assert!(!YouTubeClient::is_youtube_url("rick astley"));
    }

    #[test]
    fn search_terms_use_ytsearch() {
        assert_eq!(YouTubeClient::search_target("rick astley"), "ytsearch1:rick astley");
        assert_eq!(
            YouTubeClient::search_target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn prefers_highest_bitrate_audio_only() {
        let formats = vec![
            format("18", "mp4a.40.2", "avc1", Some(96.0)),
            format("140", "mp4a.40.2", "none", Some(129.5)),
            format("251", "opus", "none", Some(160.0)),
            format("249", "opus", "none", Some(50.0)),
        ];
        assert_eq!(select_audio_format(&formats).unwrap().format_id, "251");
    }

    #[test]
    fn falls_back_to_muxed_format() {
        let formats = vec![
            format("137", "none", "avc1", None),
            format("18", "mp4a.40.2", "avc1", Some(96.0)),
        ];
        assert_eq!(select_audio_format(&formats).unwrap().format_id, "18");
    }

    #[test]
    fn no_audio_means_no_stream() {
        let formats = vec![format("137", "none", "avc1", None)];
        assert!(select_audio_format(&formats).is_none());

        let mut missing_url = format("140", "mp4a.40.2", "none", Some(128.0));
        missing_url.url = None;
        assert!(select_audio_format(&[missing_url]).is_none());
    }

    #[test]
    fn parses_dump_json_into_metadata() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "duration": 213.0,
            "uploader": "Rick Astley",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "is_live": false
        }"#;
        let info: YtDlpInfo = serde_json::from_str(json).unwrap();
        let meta = YouTubeClient::info_to_metadata(info);

        assert_eq!(meta.title, "Never Gonna Give You Up");
        assert_eq!(meta.identifier, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(meta.artist.as_deref(), Some("Rick Astley"));
        assert_eq!(meta.duration, Some(Duration::from_secs(213)));
    }

    #[tokio::test]
    async fn resolve_reuses_stream_from_search() {
        // Any spawn of this binary would fail
        let client = YouTubeClient::new("/nonexistent/yt-dlp");
        let page = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        client.remember_stream(page, &[format("251", "opus", "none", Some(160.0))]);

        let stream = client.resolve_stream_ref(page).await.unwrap();
        assert_eq!(stream, Some(StreamRef::Url("https://cdn.example/251".to_string())));

        // Taken once; the next resolve has to ask yt-dlp again
        assert!(client.resolve_stream_ref(page).await.is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn abandoned_lookup_kills_ytdlp() {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("melody-ytdlp-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let pid_file = dir.join("pid");
        let script = dir.join("yt-dlp");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let client = YouTubeClient::new(script.to_string_lossy());
        let lookup = tokio::time::timeout(Duration::from_secs(2), client.search("slow"));
        assert!(lookup.await.is_err());

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let stat = format!("/proc/{}/stat", pid);
        let mut gone = false;
        for _ in 0..50 {
            // A reaped or zombie process no longer runs
            gone = match std::fs::read_to_string(&stat) {
                Err(_) => true,
                Ok(line) => line.rsplit(')').next().is_some_and(|rest| rest.trim_start().starts_with('Z')),
            };
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        std::fs::remove_dir_all(&dir).ok();

        assert!(gone, "yt-dlp process {} outlived the lookup", pid);
    }
}
