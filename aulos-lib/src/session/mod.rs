//! The uniform playback session surface.
//!
//! Every backend, MIDI or streaming, ends up behind the [`Session`] trait.
//! Hosts hold a [`SongHandle`], which serializes control-plane calls and the
//! audio-callback path through one per-session lock.

pub mod cdda;

use std::fmt::{Display, Formatter};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::dispatch::error::set_last_error;

/// Which synthesis backend a MIDI session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiDevice {
    Default,
    /// Native system MIDI output.
    Standard,
    /// OPL FM synthesis.
    FmSynth,
    /// The host's own software mixer path.
    SoftSynth,
    /// Patch-based wavetable synth.
    Wavetable,
    /// SoundFont renderer.
    SoundFont,
}

impl MidiDevice {
    /// Stable integer id used by host configuration stores.
    pub fn id(self) -> i32 {
        match self {
            Self::Default => -1,
            Self::Standard => 0,
            Self::FmSynth => 1,
            Self::SoftSynth => 2,
            Self::Wavetable => 3,
            Self::SoundFont => 4,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            -1 => Some(Self::Default),
            0 => Some(Self::Standard),
            1 => Some(Self::FmSynth),
            2 => Some(Self::SoftSynth),
            3 => Some(Self::Wavetable),
            4 => Some(Self::SoundFont),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    UInt8,
    Int16,
    Float32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            Self::UInt8 => 1,
            Self::Int16 => 2,
            Self::Float32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channel_count(self) -> u32 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }
}

/// Serializable stream-format descriptor for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub buffer_size: u32,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channel_layout: ChannelLayout,
}

/// Failure reported by a session operation, typically `play`.
#[derive(Debug)]
pub struct SessionError {
    message: String,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SessionError {}

/// A live playback instance produced by a backend.
pub trait Session: Send {
    fn play(&mut self, looping: bool, subsong: i32) -> Result<(), SessionError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn update(&mut self) {}
    /// Fill `buffer` with rendered audio; `false` once the stream has ended.
    fn service_stream(&mut self, buffer: &mut [u8]) -> bool;
    fn is_playing(&self) -> bool;
    fn set_subsong(&mut self, _subsong: i32) -> bool {
        false
    }
    fn is_looping(&self) -> bool;
    fn device_type(&self) -> MidiDevice {
        MidiDevice::Default
    }
    fn is_midi(&self) -> bool {
        false
    }
    fn stream_info(&self) -> StreamInfo;
    fn change_setting_int(&mut self, _name: &str, _value: i32) {}
    fn change_setting_num(&mut self, _name: &str, _value: f64) {}
    fn change_setting_string(&mut self, _name: &str, _value: &str) {}
    fn stats(&self) -> String {
        String::new()
    }
    fn is_valid(&self) -> bool;
}

/// Owning handle over a session.
///
/// A host audio callback may call [`fill_stream`](SongHandle::fill_stream)
/// concurrently with control-plane calls from another thread; every entry
/// point takes the per-session lock for the duration of the call.
pub struct SongHandle {
    inner: Mutex<Box<dyn Session>>,
}

impl SongHandle {
    pub(crate) fn new(session: Box<dyn Session>) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    /// Start playback. Returns `false` and records the last error on failure.
    pub fn start(&self, looping: bool, subsong: i32) -> bool {
        let mut session = self.inner.lock().unwrap();
        match session.play(looping, subsong) {
            Ok(()) => true,
            Err(err) => {
                set_last_error(&err.to_string());
                false
            }
        }
    }

    pub fn pause(&self) {
        self.inner.lock().unwrap().pause();
    }

    pub fn resume(&self) {
        self.inner.lock().unwrap().resume();
    }

    pub fn stop(&self) {
        self.inner.lock().unwrap().stop();
    }

    pub fn update(&self) {
        self.inner.lock().unwrap().update();
    }

    /// Render the next chunk of audio into `buffer`.
    pub fn fill_stream(&self, buffer: &mut [u8]) -> bool {
        self.inner.lock().unwrap().service_stream(buffer)
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().is_playing()
    }

    pub fn set_subsong(&self, subsong: i32) -> bool {
        self.inner.lock().unwrap().set_subsong(subsong)
    }

    pub fn is_looping(&self) -> bool {
        self.inner.lock().unwrap().is_looping()
    }

    pub fn device_type(&self) -> MidiDevice {
        self.inner.lock().unwrap().device_type()
    }

    pub fn is_midi(&self) -> bool {
        self.inner.lock().unwrap().is_midi()
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.inner.lock().unwrap().stream_info()
    }

    /// Best-effort live push of a named setting into the session.
    pub fn change_setting_int(&self, name: &str, value: i32) {
        self.inner.lock().unwrap().change_setting_int(name, value);
    }

    pub fn change_setting_num(&self, name: &str, value: f64) {
        self.inner.lock().unwrap().change_setting_num(name, value);
    }

    pub fn change_setting_string(&self, name: &str, value: &str) {
        self.inner
            .lock()
            .unwrap()
            .change_setting_string(name, value);
    }

    pub fn stats(&self) -> String {
        self.inner.lock().unwrap().stats()
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.inner.lock().unwrap().is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_round_trip() {
        for device in [
            MidiDevice::Default,
            MidiDevice::Standard,
            MidiDevice::FmSynth,
            MidiDevice::SoftSynth,
            MidiDevice::Wavetable,
            MidiDevice::SoundFont,
        ] {
            assert_eq!(MidiDevice::from_id(device.id()), Some(device));
        }
        assert_eq!(MidiDevice::from_id(99), None);
    }

    #[test]
    fn stream_info_serializes() {
        let info = StreamInfo {
            buffer_size: 16384,
            sample_rate: 44_100,
            sample_format: SampleFormat::Int16,
            channel_layout: ChannelLayout::Stereo,
        };
        let json = serde_json::to_string(&info).expect("serialize");
        let back: StreamInfo = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, info);
    }
}
