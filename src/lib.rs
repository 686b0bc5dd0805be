// Melodeon Library - scrape, catalog, and play streaming audio tracks
// The playback controller is the interesting part; the rest is plumbing

pub mod catalog;   // series/track records and the SQLite store
pub mod config;    // settings and preferences
pub mod player;    // decoder subprocess control and the playback session
pub mod scrape;    // harvests the remote site into the catalog
pub mod translate; // guesses localized series titles via Wikipedia

// Export the stuff other modules actually use
pub use catalog::{Catalog, Series, TrackRecord};
pub use config::Config;
pub use player::{DecoderSettings, PlaybackOutcome, PlaybackSession, PlaybackState, PlayerError};
pub use scrape::SiteClient;
pub use translate::Translator;
