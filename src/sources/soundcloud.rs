use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{MusicSource, SourceKind, StreamRef, TrackMetadata};

const API_BASE: &str = "https://api-v2.soundcloud.com";

/// SoundCloud API v2 client.
pub struct SoundCloudClient {
    client: reqwest::Client,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct ScTrack {
    id: u64,
    #[serde(default)]
    kind: String,
    title: String,
    duration: Option<u64>,
    permalink_url: Option<String>,
    user: Option<ScUser>,
    media: Option<ScMedia>,
}

#[derive(Debug, Deserialize)]
struct ScUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ScMedia {
    #[serde(default)]
    transcodings: Vec<Transcoding>,
}

#[derive(Debug, Deserialize)]
struct Transcoding {
    url: String,
    format: TranscodingFormat,
}

#[derive(Debug, Deserialize)]
struct TranscodingFormat {
    protocol: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    collection: Vec<ScTrack>,
}

#[derive(Debug, Deserialize)]
struct StreamLocation {
    url: String,
}

impl SoundCloudClient {
    pub fn new(client_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
        }
    }

    fn is_url(query: &str) -> bool {
        url::Url::parse(query).is_ok_and(|u| {
            u.host_str()
                .is_some_and(|host| host == "soundcloud.com" || host.ends_with(".soundcloud.com"))
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let response = self
            .client
            .get(url)
            .query(&[("client_id", self.client_id.as_str())])
            .query(params)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .error_for_status()
            .with_context(|| format!("SoundCloud request failed: {}", url))?
            .json()
            .await?;
        Ok(Some(body))
    }

    async fn resolve_url(&self, url: &str) -> Result<Option<ScTrack>> {
        let track: Option<ScTrack> = self
            .get_json(&format!("{}/resolve", API_BASE), &[("url", url)])
            .await?;

        // /resolve also answers for playlists and users
        Ok(track.filter(|t| t.kind == "track"))
    }

    async fn search_track(&self, query: &str) -> Result<Option<ScTrack>> {
        info!("🔍 Searching SoundCloud: {}", query);
        let response: Option<SearchResponse> = self
            .get_json(
                &format!("{}/search/tracks", API_BASE),
                &[("q", query), ("limit", "1")],
            )
            .await?;

        Ok(response.and_then(|r| r.collection.into_iter().next()))
    }
}

/// Picks a progressive (plain HTTP) transcoding, preferring MP3.
fn select_transcoding(transcodings: &[Transcoding]) -> Option<&Transcoding> {
    let progressive = || transcodings.iter().filter(|t| t.format.protocol == "progressive");

    progressive()
        .find(|t| t.format.mime_type.starts_with("audio/mpeg"))
        .or_else(|| progressive().next())
}

impl From<ScTrack> for TrackMetadata {
    fn from(track: ScTrack) -> Self {
        let mut meta = TrackMetadata::new(track.title, track.id.to_string());
        if let Some(user) = track.user {
            meta = meta.with_artist(user.username);
        }
        if let Some(ms) = track.duration {
            meta = meta.with_duration(Duration::from_millis(ms));
        }
        if let Some(url) = track.permalink_url {
            meta = meta.with_page_url(url);
        }
        meta
    }
}

#[async_trait]
impl MusicSource for SoundCloudClient {
    fn kind(&self) -> SourceKind {
        SourceKind::SocialAudio
    }

    async fn search(&self, query: &str) -> Result<Option<TrackMetadata>> {
        let track = if Self::is_url(query) {
            self.resolve_url(query).await?
        } else {
            self.search_track(query).await?
        };

        Ok(track.map(TrackMetadata::from))
    }

    async fn resolve_stream_ref(&self, identifier: &str) -> Result<Option<StreamRef>> {
        let track: Option<ScTrack> = self
            .get_json(&format!("{}/tracks/{}", API_BASE, identifier), &[])
            .await?;

        let transcodings = track
            .and_then(|t| t.media)
            .map(|m| m.transcodings)
            .unwrap_or_default();

        let Some(transcoding) = select_transcoding(&transcodings) else {
            debug!("🚫 No progressive transcoding for track {}", identifier);
            return Ok(None);
        };

        let location: Option<StreamLocation> = self.get_json(&transcoding.url, &[]).await?;
        Ok(location.map(|l| StreamRef::Url(l.url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoding(protocol: &str, mime: &str) -> Transcoding {
        Transcoding {
            url: format!("https://api-v2.soundcloud.com/media/{}/{}", protocol, mime),
            format: TranscodingFormat {
                protocol: protocol.to_string(),
                mime_type: mime.to_string(),
            },
        }
    }

    #[test]
    fn prefers_progressive_mp3() {
        let transcodings = vec![
            transcoding("hls", "audio/mpeg"),
            transcoding("progressive", "audio/ogg; codecs=\"opus\""),
            transcoding("progressive", "audio/mpeg"),
        ];
        let selected = select_transcoding(&transcodings).unwrap();
        assert_eq!(selected.format.protocol, "progressive");
        assert_eq!(selected.format.mime_type, "audio/mpeg");
    }

    #[test]
    fn hls_only_has_no_playable_stream() {
        let transcodings = vec![transcoding("hls", "audio/mpeg"), transcoding("hls", "audio/ogg")];
        assert!(select_transcoding(&transcodings).is_none());
    }

    #[test]
    fn recognizes_soundcloud_urls() {
        assert!(SoundCloudClient::is_url("https://soundcloud.com/artist/song"));
        assert!(SoundCloudClient::is_url("https://m.soundcloud.com/artist/song"));
        assert!(!SoundCloudClient::is_url("artist song"));
        assert!(!SoundCloudClient::is_url("https://example.com/soundcloud"));
    }

    #[test]
    fn parses_resolved_track() {
        let json = r#"{
            "id": 123456,
            "kind": "track",
            "title": "Demo",
            "duration": 180000,
            "permalink_url": "https://soundcloud.com/artist/demo",
            "user": {"username": "artist"},
            "media": {"transcodings": [
                {"url": "https://api-v2.soundcloud.com/media/x/progressive", "format": {"protocol": "progressive", "mime_type": "audio/mpeg"}}
            ]}
        }"#;
        let track: ScTrack = serde_json::from_str(json).unwrap();
        assert_eq!(track.media.as_ref().map(|m| m.transcodings.len()), Some(1));

        let meta = TrackMetadata::from(track);
        assert_eq!(meta.identifier, "123456");
        assert_eq!(meta.artist.as_deref(), Some("artist"));
        assert_eq!(meta.page_url.as_deref(), Some("https://soundcloud.com/artist/demo"));
    }
}
