// Playback controller - drives an external decoder process
// The decoder does the actual audio work; we speak its remote-control
// protocol, relay keystrokes, and keep the terminal and process clean.

pub mod decoder;
pub mod protocol;
pub mod session;
pub mod terminal;

pub use decoder::DecoderProcess;
pub use protocol::{DecoderCommand, DecoderEvent};
pub use session::{PlaybackOutcome, PlaybackSession};
pub use terminal::TerminalGuard;

use crate::catalog::TrackRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("decoder '{binary}' cannot be run: {source}")]
    DecoderUnavailable {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decoder process stopped accepting commands")]
    DecoderCrashed,

    #[error("no controlling terminal; raw keystroke control unavailable")]
    TerminalUnavailable,

    #[error("no playable location for '{0}'")]
    TrackResolutionFailure(String),
}

/// Where a playback session currently stands. Transitions are monotonic
/// except for the Playing/Paused oscillation; Failed is reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Finished,
    Failed,
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Finished | PlaybackState::Failed)
    }
}

/// Resolves a catalog track to something the decoder can load.
/// The catalog is the production implementation; tests stub it.
pub trait TrackSource {
    fn resolve(&self, track: &TrackRecord) -> Result<String, PlayerError>;
}

/// How to launch the decoder subprocess.
#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub binary: String,
    /// Arguments that put the decoder into remote-control mode.
    pub args: Vec<String>,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            binary: "mpg123".to_string(),
            args: vec!["-R".to_string()],
        }
    }
}

impl From<&crate::config::Config> for DecoderSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            binary: config.decoder.binary.clone(),
            args: config.decoder.args.clone(),
        }
    }
}
