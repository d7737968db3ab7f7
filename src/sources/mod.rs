pub mod soundcloud;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, path::PathBuf, str::FromStr, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use soundcloud::SoundCloudClient;
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Provider family a query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Video platform (YouTube)
    Video,
    /// Track-streaming platform (Spotify)
    TrackStream,
    /// Social-audio platform (SoundCloud)
    SocialAudio,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Video => "youtube",
            SourceKind::TrackStream => "spotify",
            SourceKind::SocialAudio => "soundcloud",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" | "video" => Ok(SourceKind::Video),
            "spotify" | "trackstream" => Ok(SourceKind::TrackStream),
            "soundcloud" | "socialaudio" => Ok(SourceKind::SocialAudio),
            _ => Err(ResolutionError::UnrecognizedSource(s.to_string())),
        }
    }
}

/// Classifies a raw query by the domain it mentions.
///
/// Pure substring match, no network access. `None` means the query names no
/// known provider: either a search term or a foreign URL.
pub fn classify(query: &str) -> Option<SourceKind> {
    let query = query.to_lowercase();

    if query.contains("youtube.com") || query.contains("youtu.be") {
        Some(SourceKind::Video)
    } else if query.contains("open.spotify.com") {
        Some(SourceKind::TrackStream)
    } else if query.contains("soundcloud.com") {
        Some(SourceKind::SocialAudio)
    } else {
        None
    }
}

fn looks_like_url(query: &str) -> bool {
    let query = query.trim_start().to_lowercase();
    query.starts_with("http://") || query.starts_with("https://") || query.starts_with("www.")
}

/// Something the audio sink can open directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRef {
    Url(String),
    File(PathBuf),
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRef::Url(url) => f.write_str(url),
            StreamRef::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Metadata a provider returns for a search hit or a URL lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    /// Provider-specific handle passed back to `resolve_stream_ref`.
    pub identifier: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
    pub page_url: Option<String>,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            identifier: identifier.into(),
            artist: None,
            duration: None,
            page_url: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_page_url(mut self, url: impl Into<String>) -> Self {
        self.page_url = Some(url.into());
        self
    }
}

/// A resolved, directly playable track.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayableTrack {
    title: String,
    source_kind: SourceKind,
    original_query: String,
    stream_ref: StreamRef,
    artist: Option<String>,
    duration: Option<Duration>,
    page_url: Option<String>,
}

impl PlayableTrack {
    pub fn new(
        title: impl Into<String>,
        source_kind: SourceKind,
        original_query: impl Into<String>,
        stream_ref: StreamRef,
    ) -> Self {
        Self {
            title: title.into(),
            source_kind,
            original_query: original_query.into(),
            stream_ref,
            artist: None,
            duration: None,
            page_url: None,
        }
    }

    fn from_metadata(meta: TrackMetadata, kind: SourceKind, query: &str, stream_ref: StreamRef) -> Self {
        Self {
            title: meta.title,
            source_kind: kind,
            original_query: query.to_string(),
            stream_ref,
            artist: meta.artist,
            duration: meta.duration,
            page_url: meta.page_url,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }
    pub fn original_query(&self) -> &str {
        &self.original_query
    }
    pub fn stream_ref(&self) -> &StreamRef {
        &self.stream_ref
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unrecognized source: {0}")]
    UnrecognizedSource(String),
    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable { provider: SourceKind, reason: String },
    #[error("no playable stream for {0}")]
    NoPlayableStream(String),
}

/// Common contract for the three provider clients.
///
/// Any `Err` returned here is a transport or auth problem; the resolver
/// collapses it into [`ResolutionError::ProviderUnavailable`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Which provider family this client serves
    fn kind(&self) -> SourceKind;

    /// Looks up a URL or a search term, returning the best single match
    async fn search(&self, query: &str) -> anyhow::Result<Option<TrackMetadata>>;

    /// Picks a directly playable stream for a previously found track
    async fn resolve_stream_ref(&self, identifier: &str) -> anyhow::Result<Option<StreamRef>>;
}

/// Turns raw user queries into [`PlayableTrack`]s.
pub struct TrackResolver {
    sources: HashMap<SourceKind, Arc<dyn MusicSource>>,
    fallback: Option<SourceKind>,
    timeout: Option<Duration>,
}

impl TrackResolver {
    pub fn new(fallback: Option<SourceKind>) -> Self {
        Self {
            sources: HashMap::new(),
            fallback,
            timeout: None,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MusicSource>) -> Self {
        info!("🔌 Provider registered: {}", source.kind());
        self.sources.insert(source.kind(), source);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Decides which provider a query goes to.
    pub fn route(&self, query: &str) -> Result<SourceKind, ResolutionError> {
        if let Some(kind) = classify(query) {
            return Ok(kind);
        }

        if looks_like_url(query) {
            return Err(ResolutionError::UnrecognizedSource(query.to_string()));
        }

        self.fallback
            .ok_or_else(|| ResolutionError::UnrecognizedSource(query.to_string()))
    }

    pub async fn resolve(&self, query: &str) -> Result<PlayableTrack, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::UnrecognizedSource(String::new()));
        }

        let kind = self.route(query)?;
        let source = self.sources.get(&kind).cloned().ok_or_else(|| {
            ResolutionError::ProviderUnavailable {
                provider: kind,
                reason: "provider not configured".to_string(),
            }
        })?;

        debug!("🔍 Resolving '{}' through {}", query, kind);

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, resolve_with(source.as_ref(), kind, query))
                .await
                .map_err(|_| {
                    warn!("⏰ Resolution timed out after {:?}: {}", limit, query);
                    ResolutionError::ProviderUnavailable {
                        provider: kind,
                        reason: format!("timed out after {}", humantime::format_duration(limit)),
                    }
                })?,
            None => resolve_with(source.as_ref(), kind, query).await,
        }
    }
}

async fn resolve_with(
    source: &dyn MusicSource,
    kind: SourceKind,
    query: &str,
) -> Result<PlayableTrack, ResolutionError> {
    let unavailable = |e: anyhow::Error| {
        warn!("❌ {} failed: {:#}", kind, e);
        ResolutionError::ProviderUnavailable {
            provider: kind,
            reason: e.to_string(),
        }
    };

    let meta = source
        .search(query)
        .await
        .map_err(unavailable)?
        .ok_or_else(|| ResolutionError::NoPlayableStream(query.to_string()))?;

    let stream_ref = source
        .resolve_stream_ref(&meta.identifier)
        .await
        .map_err(unavailable)?
        .ok_or_else(|| ResolutionError::NoPlayableStream(meta.title.clone()))?;

    info!("✅ Resolved '{}' -> {}", query, meta.title);
    Ok(PlayableTrack::from_metadata(meta, kind, query, stream_ref))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn cdn_stream(title: &str) -> StreamRef {
        StreamRef::Url(format!("https://cdn.example/{}", title))
    }

    /// Resolves any search term to a track titled after it
    pub fn echo_resolver() -> Arc<TrackResolver> {
        let mut source = MockMusicSource::new();
        source.expect_kind().return_const(SourceKind::Video);
        source
            .expect_search()
            .returning(|query| Ok(Some(TrackMetadata::new(query, query))));
        source
            .expect_resolve_stream_ref()
            .returning(|id| Ok(Some(cdn_stream(id))));

        Arc::new(TrackResolver::new(Some(SourceKind::Video)).with_source(Arc::new(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mock_source(kind: SourceKind) -> MockMusicSource {
        let mut source = MockMusicSource::new();
        source.expect_kind().return_const(kind);
        source
    }

    #[test]
    fn classifies_known_domains() {
        assert_eq!(classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), Some(SourceKind::Video));
        assert_eq!(classify("https://youtu.be/dQw4w9WgXcQ"), Some(SourceKind::Video));
        assert_eq!(
            classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"),
            Some(SourceKind::TrackStream)
        );
        assert_eq!(classify("https://soundcloud.com/artist/song"), Some(SourceKind::SocialAudio));
        assert_eq!(classify("never gonna give you up"), None);
        assert_eq!(classify("https://example.com/song.mp3"), None);
    }

    #[test]
    fn routes_unmatched_queries() {
        let resolver = TrackResolver::new(Some(SourceKind::Video));
        assert_eq!(resolver.route("lofi beats").unwrap(), SourceKind::Video);
        assert!(matches!(
            resolver.route("https://example.com/song.mp3"),
            Err(ResolutionError::UnrecognizedSource(_))
        ));

        let strict = TrackResolver::new(None);
        assert!(matches!(
            strict.route("lofi beats"),
            Err(ResolutionError::UnrecognizedSource(_))
        ));
    }

    #[tokio::test]
    async fn resolves_through_matching_provider() {
        let mut source = mock_source(SourceKind::SocialAudio);
        source.expect_search().returning(|_| {
            Ok(Some(
                TrackMetadata::new("Song", "https://soundcloud.com/artist/song").with_artist("Artist"),
            ))
        });
        source
            .expect_resolve_stream_ref()
            .returning(|_| Ok(Some(StreamRef::Url("https://cdn.example/song.mp3".to_string()))));

        let resolver = TrackResolver::new(None).with_source(Arc::new(source));
        let track = resolver.resolve("https://soundcloud.com/artist/song").await.unwrap();

        assert_eq!(track.title(), "Song");
        assert_eq!(track.source_kind(), SourceKind::SocialAudio);
        assert_eq!(track.artist(), Some("Artist"));
        assert_eq!(track.original_query(), "https://soundcloud.com/artist/song");
        assert_eq!(
            track.stream_ref(),
            &StreamRef::Url("https://cdn.example/song.mp3".to_string())
        );
    }

    #[tokio::test]
    async fn missing_provider_is_unavailable() {
        let resolver = TrackResolver::new(Some(SourceKind::Video));
        let err = resolver.resolve("https://open.spotify.com/track/abc").await.unwrap_err();
        assert!(matches!(
            err,
            ResolutionError::ProviderUnavailable { provider: SourceKind::TrackStream, .. }
        ));
    }

    #[tokio::test]
    async fn provider_errors_collapse_to_unavailable() {
        let mut source = mock_source(SourceKind::Video);
        source
            .expect_search()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let resolver = TrackResolver::new(Some(SourceKind::Video)).with_source(Arc::new(source));
        let err = resolver.resolve("some song").await.unwrap_err();
        assert!(matches!(err, ResolutionError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_stream_is_distinct_from_network_failure() {
        let mut source = mock_source(SourceKind::TrackStream);
        source
            .expect_search()
            .returning(|_| Ok(Some(TrackMetadata::new("Preview-less", "abc"))));
        source.expect_resolve_stream_ref().returning(|_| Ok(None));

        let resolver = TrackResolver::new(None).with_source(Arc::new(source));
        let err = resolver
            .resolve("https://open.spotify.com/track/abc")
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::NoPlayableStream("Preview-less".to_string()));
    }

    #[tokio::test]
    async fn no_search_hit_is_no_playable_stream() {
        let mut source = mock_source(SourceKind::Video);
        source.expect_search().returning(|_| Ok(None));
        source.expect_resolve_stream_ref().never();

        let resolver = TrackResolver::new(Some(SourceKind::Video)).with_source(Arc::new(source));
        let err = resolver.resolve("zzzz no match").await.unwrap_err();
        assert!(matches!(err, ResolutionError::NoPlayableStream(_)));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let resolver = TrackResolver::new(Some(SourceKind::Video));
        assert!(matches!(
            resolver.resolve("   ").await,
            Err(ResolutionError::UnrecognizedSource(_))
        ));
    }
}
