use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64_ENGINE, Engine};
use regex::Regex;
use serde::Deserialize;
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{MusicSource, SourceKind, StreamRef, TrackMetadata};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static TRACK_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[a-zA-Z-]+/)?track/([A-Za-z0-9]+)")
        .expect("track id pattern is valid")
});

/// Spotify Web API client using the client-credentials flow.
///
/// Spotify does not hand out full audio, so the playable stream is the
/// 30 second `preview_url`. Tracks without one have no playable stream.
pub struct SpotifyClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    duration_ms: Option<u64>,
    preview_url: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Extracts the track id from an `open.spotify.com/track/...` URL
    pub fn extract_track_id(url: &str) -> Option<String> {
        TRACK_ID
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if current.expires_at > Instant::now() {
                return Ok(current.value.clone());
            }
        }

        debug!("🔑 Requesting Spotify access token");
        let credentials = B64_ENGINE.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()
            .context("Spotify token request rejected")?
            .json()
            .await?;

        // Refresh a little early so a token never expires mid-request
        let lifetime = Duration::from_secs(response.expires_in.saturating_sub(30));
        let value = response.access_token.clone();
        *token = Some(AccessToken {
            value: response.access_token,
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }

    async fn fetch_track(&self, id: &str) -> Result<Option<SpotifyTrack>> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/tracks/{}", API_BASE, id))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let track = response
            .error_for_status()
            .context("Spotify track request failed")?
            .json()
            .await?;
        Ok(Some(track))
    }

    async fn search_track(&self, query: &str) -> Result<Option<SpotifyTrack>> {
        let token = self.access_token().await?;
        let response: SearchResponse = self
            .client
            .get(format!("{}/search", API_BASE))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()
            .context("Spotify search failed")?
            .json()
            .await?;

        Ok(response.tracks.items.into_iter().next())
    }
}

impl From<SpotifyTrack> for TrackMetadata {
    fn from(track: SpotifyTrack) -> Self {
        let mut meta = TrackMetadata::new(track.name, track.id);

        let artists = track
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if !artists.is_empty() {
            meta = meta.with_artist(artists);
        }
        if let Some(ms) = track.duration_ms {
            meta = meta.with_duration(Duration::from_millis(ms));
        }
        if let Some(url) = track.external_urls.and_then(|u| u.spotify) {
            meta = meta.with_page_url(url);
        }
        meta
    }
}

#[async_trait]
impl MusicSource for SpotifyClient {
    fn kind(&self) -> SourceKind {
        SourceKind::TrackStream
    }

    async fn search(&self, query: &str) -> Result<Option<TrackMetadata>> {
        let track = match Self::extract_track_id(query) {
            Some(id) => self.fetch_track(&id).await?,
            None => {
                info!("🔍 Searching Spotify: {}", query);
                self.search_track(query).await?
            }
        };

        Ok(track.map(TrackMetadata::from))
    }

    async fn resolve_stream_ref(&self, identifier: &str) -> Result<Option<StreamRef>> {
        let preview = self
            .fetch_track(identifier)
            .await?
            .and_then(|track| track.preview_url);

        Ok(preview.map(StreamRef::Url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_track_ids() {
        assert_eq!(
            SpotifyClient::extract_track_id("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            SpotifyClient::extract_track_id("https://open.spotify.com/intl-es/track/4uLU6hMCjMI75M1A2tKUQC"),
            Some("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            SpotifyClient::extract_track_id("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3"),
            None
        );
        assert_eq!(SpotifyClient::extract_track_id("daft punk"), None);
    }

    #[test]
    fn converts_track_payload() {
        let json = r#"{
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "duration_ms": 213573,
            "preview_url": null,
            "artists": [{"name": "Rick Astley"}],
            "external_urls": {"spotify": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"}
        }"#;
        let track: SpotifyTrack = serde_json::from_str(json).unwrap();
        assert!(track.preview_url.is_none());

        let meta = TrackMetadata::from(track);
        assert_eq!(meta.identifier, "4uLU6hMCjMI75M1A2tKUQC");
        assert_eq!(meta.artist.as_deref(), Some("Rick Astley"));
        assert_eq!(meta.duration, Some(Duration::from_millis(213573)));
    }
}
