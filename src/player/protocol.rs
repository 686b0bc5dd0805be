// Remote-control protocol of the decoder subprocess.
// Commands go down as single lines; status comes back as @-prefixed lines.

/// A command for the decoder's remote-control mode.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderCommand {
    /// Start playing the given URL or local path.
    Load(String),
    /// A single keystroke forwarded verbatim.
    Raw(char),
    /// Ask the decoder to quit.
    Quit,
}

/// One decoded line of decoder status output.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// `@F` frame status; carries the elapsed playback time in seconds.
    Frame { elapsed: f64 },
    /// `@P` playback status. Code 0 means the decoder has stopped;
    /// nonzero codes are decoder convention (1 paused, 2 playing).
    Pause { code: i32 },
    /// `@E` error report. Surfaced to the user, never fatal to the session.
    Error { message: String },
    /// Anything the codec doesn't understand, kept verbatim.
    Unrecognized { raw: String },
}

pub fn encode(cmd: &DecoderCommand) -> String {
    match cmd {
        DecoderCommand::Load(path) => format!("load {}", path),
        DecoderCommand::Raw(c) => c.to_string(),
        DecoderCommand::Quit => "q".to_string(),
    }
}

/// Decode one newline-stripped line of decoder output.
///
/// Malformed status lines come back as `Unrecognized`, never an error:
/// a chatty or out-of-spec decoder must not be able to kill the session.
pub fn decode(line: &str) -> DecoderEvent {
    if line.starts_with("@F") {
        // Frame status: the elapsed time is the 4th field after the tag.
        let fields: Vec<&str> = line.split_whitespace().skip(1).collect();
        if let Some(elapsed) = fields.get(3).and_then(|f| f.parse::<f64>().ok()) {
            return DecoderEvent::Frame { elapsed };
        }
        return DecoderEvent::Unrecognized { raw: line.to_string() };
    }

    if line.starts_with("@P") {
        // Playback status: the code is the trailing field.
        if let Some(code) = line
            .split_whitespace()
            .last()
            .and_then(|f| f.parse::<i32>().ok())
        {
            return DecoderEvent::Pause { code };
        }
        return DecoderEvent::Unrecognized { raw: line.to_string() };
    }

    if let Some(rest) = line.strip_prefix("@E") {
        return DecoderEvent::Error {
            message: rest.trim().to_string(),
        };
    }

    DecoderEvent::Unrecognized { raw: line.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        let cmd = DecoderCommand::Load("http://example.com/song.mp3".to_string());
        assert_eq!(encode(&cmd), "load http://example.com/song.mp3");

        assert_eq!(encode(&DecoderCommand::Raw('p')), "p");
        assert_eq!(encode(&DecoderCommand::Quit), "q");
    }

    #[test]
    fn test_decode_frame_status() {
        assert_eq!(
            decode("@F 1 2 3 42"),
            DecoderEvent::Frame { elapsed: 42.0 }
        );
        assert_eq!(
            decode("@F 120 4880 3.13 127.48"),
            DecoderEvent::Frame { elapsed: 127.48 }
        );
    }

    #[test]
    fn test_decode_frame_malformed() {
        // Too few fields
        assert_eq!(
            decode("@F 1 2"),
            DecoderEvent::Unrecognized {
                raw: "@F 1 2".to_string()
            }
        );
        // Non-numeric elapsed field
        assert_eq!(
            decode("@F a b c nope"),
            DecoderEvent::Unrecognized {
                raw: "@F a b c nope".to_string()
            }
        );
    }

    #[test]
    fn test_decode_pause_status() {
        assert_eq!(decode("@P 0"), DecoderEvent::Pause { code: 0 });
        assert_eq!(decode("@P 1"), DecoderEvent::Pause { code: 1 });
        assert_eq!(decode("@P 2"), DecoderEvent::Pause { code: 2 });
        // Bare tag has no trailing code
        assert_eq!(
            decode("@P"),
            DecoderEvent::Unrecognized {
                raw: "@P".to_string()
            }
        );
    }

    #[test]
    fn test_decode_error_line() {
        assert_eq!(
            decode("@E connection reset by peer"),
            DecoderEvent::Error {
                message: "connection reset by peer".to_string()
            }
        );
    }

    #[test]
    fn test_decode_unknown_lines() {
        for line in ["@R MPG123", "version 1.26.4", ""] {
            assert_eq!(
                decode(line),
                DecoderEvent::Unrecognized {
                    raw: line.to_string()
                }
            );
        }
    }
}
