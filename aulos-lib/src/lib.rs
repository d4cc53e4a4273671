//! # Aulos
//!
//! Aulos identifies an opaque byte stream as one of several music formats
//! and hands it to the matching playback backend: MIDI family files are
//! validated and bound to a synth device, CD images, register dumps,
//! chip-music rips, tracker modules, and plain sample files become
//! streaming sessions. A gzip envelope around any of them is unwrapped
//! transparently.
//!
//! The other half of the crate is the configuration switchboard: typed,
//! integer-keyed settings that are clamped, stored, live-pushed into the
//! active session where possible, and reported back with a restart-required
//! flag where not.

pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod io;
pub mod messages;
pub mod midi;
pub mod session;
pub mod stream;

pub use config::{settings_table, ConfigContext, Setting, SettingKind};
pub use decoder::{create_decoder, DecoderInfo, SoundDecoder};
pub use dispatch::error::{last_error, OpenError};
pub use dispatch::{open_song, open_song_file, open_song_mem};
pub use session::{ChannelLayout, MidiDevice, SampleFormat, SongHandle, StreamInfo};
