//! Error taxonomy for song dispatch, plus the process-wide last-error slot.

use std::fmt::{Display, Formatter};
use std::sync::{Mutex, OnceLock};

/// Why a byte stream could not be turned into a playback session.
#[derive(Debug)]
pub enum OpenError {
    /// The leading bytes could not be read or the stream could not seek.
    HeaderRead,
    /// The stream carried a gzip envelope that failed to decompress.
    Decompression(String),
    /// A MIDI-family signature matched but the payload failed validation.
    InvalidMidiData,
    /// No backend claimed the stream, or the claiming backend produced an
    /// invalid session.
    Unidentified,
    /// A backend reported an unexpected failure while opening.
    Backend(String),
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HeaderRead => write!(f, "unable to read file header"),
            Self::Decompression(err) => write!(f, "gzip decompression failed: {}", err),
            Self::InvalidMidiData => write!(f, "invalid data in MIDI file"),
            Self::Unidentified => write!(f, "unable to identify as music"),
            Self::Backend(err) => write!(f, "backend error: {}", err),
        }
    }
}

impl std::error::Error for OpenError {}

fn slot() -> &'static Mutex<String> {
    static LAST_ERROR: OnceLock<Mutex<String>> = OnceLock::new();
    LAST_ERROR.get_or_init(|| Mutex::new(String::new()))
}

/// Overwrite the last-error slot with the most recent failure message.
///
/// The slot is a single value, not a log; only the latest message survives.
pub(crate) fn set_last_error(message: &str) {
    *slot().lock().unwrap() = message.to_string();
}

/// The most recent failure message, or an empty string if none was recorded.
pub fn last_error() -> String {
    slot().lock().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_keeps_only_latest_message() {
        set_last_error("first failure");
        set_last_error("second failure");
        assert_eq!(last_error(), "second failure");
    }

    #[test]
    fn open_error_messages_are_human_readable() {
        assert_eq!(
            OpenError::Unidentified.to_string(),
            "unable to identify as music"
        );
        assert!(OpenError::Decompression("short stream".to_string())
            .to_string()
            .contains("short stream"));
    }
}
