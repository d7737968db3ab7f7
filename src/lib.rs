//! # Melody
//!
//! A Discord music bot: per-guild playback sessions fed by YouTube, Spotify
//! and SoundCloud, played through songbird.

pub mod audio;
pub mod bot;
pub mod config;
pub mod sources;
pub mod ui;
