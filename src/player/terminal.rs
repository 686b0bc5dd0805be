use super::protocol::DecoderCommand;
use super::PlayerError;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::tty::IsTty;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Scoped raw-mode acquisition. The previous terminal mode is restored on
/// release, and Drop releases too, so raw mode cannot leak past a session
/// no matter how it ends.
pub struct TerminalGuard {
    released: bool,
}

impl TerminalGuard {
    pub fn acquire() -> Result<Self, PlayerError> {
        if !io::stdin().is_tty() {
            return Err(PlayerError::TerminalUnavailable);
        }
        enable_raw_mode().map_err(|e| {
            warn!("could not enter raw mode: {}", e);
            PlayerError::TerminalUnavailable
        })?;
        Ok(Self { released: false })
    }

    /// Restore the previous terminal mode. Idempotent; a failed restore is
    /// logged rather than raised so it never masks the session outcome.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = disable_raw_mode() {
            warn!("failed to restore terminal mode: {}", e);
        }
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Concurrent keystroke worker. Every key becomes a decoder command on the
/// command channel; the quit key additionally flips the shared termination
/// signal so the session loop unblocks without decoder cooperation.
pub struct InputReader {
    handle: tokio::task::JoinHandle<()>,
}

impl InputReader {
    pub fn spawn(
        cmd_tx: mpsc::UnboundedSender<DecoderCommand>,
        term: Arc<watch::Sender<bool>>,
    ) -> Self {
        let mut stop_rx = term.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                if *stop_rx.borrow_and_update() {
                    break;
                }

                // Short poll so the stop signal stays responsive.
                match event::poll(Duration::from_millis(50)) {
                    Ok(true) => match event::read() {
                        Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                            match key.code {
                                KeyCode::Char('q') | KeyCode::Esc => {
                                    let _ = cmd_tx.send(DecoderCommand::Quit);
                                    let _ = term.send(true);
                                    break;
                                }
                                KeyCode::Char(c) => {
                                    let _ = cmd_tx.send(DecoderCommand::Raw(c));
                                }
                                _ => {}
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!("terminal read failed: {}", e);
                            break;
                        }
                    },
                    Ok(false) => {}
                    Err(e) => {
                        debug!("terminal input closed: {}", e);
                        break;
                    }
                }

                // Yield so the blocking poll cannot starve the runtime.
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        Self { handle }
    }

    /// Wait for the worker to exit. Callers flip the termination signal
    /// first; the poll loop notices it within one poll interval.
    pub async fn stop(self) {
        let _ = self.handle.await;
    }
}
