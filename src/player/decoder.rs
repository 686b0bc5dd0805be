use super::protocol::{self, DecoderCommand, DecoderEvent};
use super::{DecoderSettings, PlayerError};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// The spawned decoder subprocess. Owns the OS process handle and both
/// piped streams for the session's lifetime; nothing else touches them.
pub struct DecoderProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl DecoderProcess {
    /// Launch the decoder in remote-control mode. Fails before any terminal
    /// state has been touched, so a missing binary surfaces cleanly.
    pub fn spawn(settings: &DecoderSettings) -> Result<Self, PlayerError> {
        let mut child = Command::new(&settings.binary)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlayerError::DecoderUnavailable {
                binary: settings.binary.clone(),
                source,
            })?;

        let stdin = child.stdin.take().expect("decoder stdin is piped");
        let stdout = child.stdout.take().expect("decoder stdout is piped");
        debug!("spawned decoder: {} {:?}", settings.binary, settings.args);

        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Write one encoded command line to the decoder.
    pub async fn send(&mut self, cmd: &DecoderCommand) -> Result<(), PlayerError> {
        let line = protocol::encode(cmd);
        debug!("decoder <- {}", line);

        let write = async {
            self.stdin.write_all(line.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await
        };
        write.await.map_err(|e| {
            warn!("decoder rejected command '{}': {}", line, e);
            PlayerError::DecoderCrashed
        })
    }

    /// Next status event from the decoder, in emission order.
    /// Returns None once the output stream closes - that is how the death
    /// of the process is detected; there is no separate heartbeat.
    pub async fn next_event(&mut self) -> Option<DecoderEvent> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Some(protocol::decode(&line)),
            Ok(None) => None,
            Err(e) => {
                warn!("decoder output unreadable: {}", e);
                None
            }
        }
    }

    /// Kill the subprocess and reap it. Safe to call repeatedly and after
    /// natural exit; a dead process is left alone.
    pub async fn terminate(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("decoder already exited: {}", status);
            }
            _ => {
                if let Err(e) = self.child.start_kill() {
                    debug!("decoder kill failed (already gone?): {}", e);
                }
            }
        }
        // wait() is a no-op once the child has been reaped.
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(script: &str) -> DecoderSettings {
        DecoderSettings {
            binary: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let settings = DecoderSettings {
            binary: "definitely-not-a-decoder".to_string(),
            args: vec![],
        };
        match DecoderProcess::spawn(&settings) {
            Err(PlayerError::DecoderUnavailable { binary, .. }) => {
                assert_eq!(binary, "definitely-not-a-decoder");
            }
            other => panic!("expected DecoderUnavailable, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn test_scripted_events_then_eof() {
        let settings = scripted("printf '@F 1 2 3 42\\n@P 0\\n'");
        let mut decoder = DecoderProcess::spawn(&settings).unwrap();

        assert_eq!(
            decoder.next_event().await,
            Some(DecoderEvent::Frame { elapsed: 42.0 })
        );
        assert_eq!(decoder.next_event().await, Some(DecoderEvent::Pause { code: 0 }));
        // Script exits; stream close terminates the event sequence.
        assert_eq!(decoder.next_event().await, None);

        decoder.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let settings = scripted("sleep 30");
        let mut decoder = DecoderProcess::spawn(&settings).unwrap();

        decoder.terminate().await;
        // Second call must be a no-op, not a panic or a hang.
        decoder.terminate().await;
        assert_eq!(decoder.next_event().await, None);
    }

    #[tokio::test]
    async fn test_send_to_dead_decoder() {
        let settings = scripted("exit 0");
        let mut decoder = DecoderProcess::spawn(&settings).unwrap();

        // Drain to EOF so we know the process is gone.
        while decoder.next_event().await.is_some() {}
        decoder.terminate().await;

        let err = decoder
            .send(&DecoderCommand::Raw('p'))
            .await
            .expect_err("write to a dead process must fail");
        assert!(matches!(err, PlayerError::DecoderCrashed));
    }
}
