use super::decoder::DecoderProcess;
use super::protocol::{DecoderCommand, DecoderEvent};
use super::terminal::{InputReader, TerminalGuard};
use super::{DecoderSettings, PlaybackState, PlayerError, TrackSource};
use crate::catalog::TrackRecord;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Final state of a playback session plus the last elapsed time the
/// decoder reported before it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackOutcome {
    pub state: PlaybackState,
    pub elapsed: f64,
}

/// Orchestrates one playback request end-to-end. Owns the decoder process
/// and the terminal guard for the session's duration; both are torn down
/// exactly once on every exit path.
pub struct PlaybackSession {
    settings: DecoderSettings,
}

impl PlaybackSession {
    pub fn new(settings: DecoderSettings) -> Self {
        Self { settings }
    }

    /// Play one track to completion, failure, or user quit.
    ///
    /// Resolution and decoder spawn failures return immediately as errors,
    /// before any terminal state is touched. Once the decoder is up, every
    /// ending - clean finish, quit, crash - comes back as an outcome.
    pub async fn play(
        &mut self,
        source: &dyn TrackSource,
        track: &TrackRecord,
    ) -> Result<PlaybackOutcome, PlayerError> {
        let location = source.resolve(track)?;
        let mut decoder = DecoderProcess::spawn(&self.settings)?;

        // Raw keystroke control is optional: with no controlling terminal
        // the session degrades to playing straight through.
        let mut guard = match TerminalGuard::acquire() {
            Ok(guard) => Some(guard),
            Err(PlayerError::TerminalUnavailable) => {
                info!("no tty; running non-interactive");
                None
            }
            Err(e) => return Err(e),
        };

        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let term = Arc::new(watch::channel(false).0);
        let reader = guard
            .as_ref()
            .map(|_| InputReader::spawn(cmd_tx.clone(), Arc::clone(&term)));
        drop(cmd_tx);

        let interactive = guard.is_some();
        let (state, elapsed) = run_event_loop(
            &mut decoder,
            &location,
            &mut cmd_rx,
            &term,
            interactive,
        )
        .await;

        // Teardown, exactly once, no matter which side ended the session.
        let _ = term.send(true);
        decoder.terminate().await;
        if let Some(guard) = guard.as_mut() {
            guard.release();
        }
        if let Some(reader) = reader {
            reader.stop().await;
        }
        if interactive {
            println!();
        }

        debug!("session over: {:?} at {:.1}s", state, elapsed);
        Ok(PlaybackOutcome { state, elapsed })
    }
}

/// The session's half of the two concurrent workers: consume decoder
/// status events and forwarded keystrokes until a terminal state.
async fn run_event_loop(
    decoder: &mut DecoderProcess,
    location: &str,
    cmd_rx: &mut mpsc::UnboundedReceiver<DecoderCommand>,
    term: &Arc<watch::Sender<bool>>,
    interactive: bool,
) -> (PlaybackState, f64) {
    let mut term_rx = term.subscribe();
    let mut state = PlaybackState::Loading;
    let mut elapsed = 0.0_f64;
    let mut input_open = true;

    if decoder
        .send(&DecoderCommand::Load(location.to_string()))
        .await
        .is_err()
    {
        return (PlaybackState::Failed, elapsed);
    }

    loop {
        tokio::select! {
            event = decoder.next_event() => {
                match event {
                    Some(event) => {
                        let was = state;
                        state = apply_event(state, &event, &mut elapsed);
                        if interactive {
                            if let DecoderEvent::Frame { .. } = event {
                                show_progress(elapsed);
                            }
                        }
                        if state != was {
                            debug!("playback {:?} -> {:?}", was, state);
                        }
                        if state.is_terminal() {
                            break;
                        }
                    }
                    // Output stream closed without a stop status: the
                    // decoder died under us.
                    None => {
                        warn!("decoder output closed mid-session");
                        state = PlaybackState::Failed;
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv(), if input_open => {
                match cmd {
                    Some(DecoderCommand::Quit) => {
                        // Best effort; the quit is authoritative locally.
                        let _ = decoder.send(&DecoderCommand::Quit).await;
                        state = PlaybackState::Finished;
                        break;
                    }
                    Some(cmd) => {
                        if decoder.send(&cmd).await.is_err() {
                            state = PlaybackState::Failed;
                            break;
                        }
                    }
                    None => input_open = false,
                }
            }
            _ = term_rx.changed() => {
                // Quit signal from the input worker; do not wait for the
                // decoder to acknowledge anything.
                state = PlaybackState::Finished;
                break;
            }
        }
    }

    (state, elapsed)
}

/// Pure state-machine step: one decoder event against the current state.
fn apply_event(state: PlaybackState, event: &DecoderEvent, elapsed: &mut f64) -> PlaybackState {
    match event {
        DecoderEvent::Frame { elapsed: t } => {
            *elapsed = *t;
            match state {
                PlaybackState::Idle | PlaybackState::Loading => PlaybackState::Playing,
                other => other,
            }
        }
        // Code 0 is the authoritative end-of-track signal; 1 and 2 are the
        // decoder's paused/playing convention, other codes stay opaque.
        DecoderEvent::Pause { code: 0 } => PlaybackState::Finished,
        DecoderEvent::Pause { code: 1 } => PlaybackState::Paused,
        DecoderEvent::Pause { code: 2 } => PlaybackState::Playing,
        DecoderEvent::Pause { .. } => match state {
            PlaybackState::Idle | PlaybackState::Loading => PlaybackState::Playing,
            other => other,
        },
        DecoderEvent::Error { message } => {
            warn!("decoder: {}", message);
            state
        }
        DecoderEvent::Unrecognized { raw } => {
            debug!("unrecognized decoder line: {}", raw);
            state
        }
    }
}

/// Overwrite the current line with the elapsed time.
fn show_progress(elapsed: f64) {
    print!("\r{:>8.1}s  ", elapsed);
    let _ = io::stdout().flush();
}
