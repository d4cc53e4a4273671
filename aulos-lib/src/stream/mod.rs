//! Streaming sources and the uniform session adapter around them.
//!
//! Everything that renders raw wave data for the host mixer — register
//! dumps, CD-XA audio, chip-music rips, tracker modules, plain sample
//! files — implements [`StreamSource`]. [`StreamSong`] adapts a source to
//! the [`Session`] surface.

pub mod gme;
#[cfg(feature = "opl")]
pub mod opl;
pub mod sample;
pub mod tracker;
pub mod xa;

use crate::session::{MidiDevice, Session, SessionError, StreamInfo};

/// Anything streamed to the host as raw wave data, except MIDI.
pub trait StreamSource: Send {
    fn format(&self) -> StreamInfo;
    /// Fill `buffer` with rendered audio; `false` once the stream has ended.
    fn get_data(&mut self, buffer: &mut [u8]) -> bool;
    fn start(&mut self) -> bool {
        true
    }
    fn set_play_mode(&mut self, _looping: bool) {}
    fn set_subsong(&mut self, _subsong: i32) -> bool {
        false
    }
    fn stats(&self) -> String {
        String::new()
    }
    fn change_setting_int(&mut self, _name: &str, _value: i32) {}
    fn change_setting_num(&mut self, _name: &str, _value: f64) {}
    fn change_setting_string(&mut self, _name: &str, _value: &str) {}
}

/// Uniform session adapter over a [`StreamSource`].
pub struct StreamSong {
    source: Box<dyn StreamSource>,
    looping: bool,
    playing: bool,
    paused: bool,
}

impl StreamSong {
    pub fn new(source: Box<dyn StreamSource>) -> Self {
        Self {
            source,
            looping: false,
            playing: false,
            paused: false,
        }
    }
}

impl Session for StreamSong {
    fn play(&mut self, looping: bool, subsong: i32) -> Result<(), SessionError> {
        self.looping = looping;
        self.source.set_play_mode(looping);
        if subsong > 0 && !self.source.set_subsong(subsong) {
            return Err(SessionError::new(format!(
                "stream source rejected subsong {}",
                subsong
            )));
        }
        if !self.source.start() {
            return Err(SessionError::new("stream source failed to start"));
        }
        self.playing = true;
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        if self.playing {
            self.paused = true;
        }
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.paused = false;
    }

    fn service_stream(&mut self, buffer: &mut [u8]) -> bool {
        if !self.playing || self.paused {
            buffer.fill(0);
            return self.playing;
        }
        let more = self.source.get_data(buffer);
        if !more {
            self.playing = false;
        }
        more
    }

    fn is_playing(&self) -> bool {
        self.playing && !self.paused
    }

    fn set_subsong(&mut self, subsong: i32) -> bool {
        self.source.set_subsong(subsong)
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn device_type(&self) -> MidiDevice {
        MidiDevice::Default
    }

    fn stream_info(&self) -> StreamInfo {
        self.source.format()
    }

    fn change_setting_int(&mut self, name: &str, value: i32) {
        self.source.change_setting_int(name, value);
    }

    fn change_setting_num(&mut self, name: &str, value: f64) {
        self.source.change_setting_num(name, value);
    }

    fn change_setting_string(&mut self, name: &str, value: &str) {
        self.source.change_setting_string(name, value);
    }

    fn stats(&self) -> String {
        self.source.stats()
    }

    fn is_valid(&self) -> bool {
        self.source.format().sample_rate > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChannelLayout, SampleFormat};

    struct ToneSource {
        frames_left: usize,
    }

    impl StreamSource for ToneSource {
        fn format(&self) -> StreamInfo {
            StreamInfo {
                buffer_size: 1024,
                sample_rate: 8_000,
                sample_format: SampleFormat::Int16,
                channel_layout: ChannelLayout::Mono,
            }
        }

        fn get_data(&mut self, buffer: &mut [u8]) -> bool {
            buffer.fill(0x10);
            let frames = buffer.len() / 2;
            if frames >= self.frames_left {
                self.frames_left = 0;
                return false;
            }
            self.frames_left -= frames;
            true
        }
    }

    #[test]
    fn adapter_tracks_playback_until_source_ends() {
        let mut song = StreamSong::new(Box::new(ToneSource { frames_left: 96 }));
        song.play(false, 0).expect("play");
        assert!(song.is_playing());

        let mut buffer = [0_u8; 128]; // 64 frames
        assert!(song.service_stream(&mut buffer));
        assert_eq!(buffer[0], 0x10);
        assert!(!song.service_stream(&mut buffer));
        assert!(!song.is_playing());
    }

    #[test]
    fn paused_adapter_emits_silence() {
        let mut song = StreamSong::new(Box::new(ToneSource { frames_left: 1000 }));
        song.play(false, 0).expect("play");
        song.pause();

        let mut buffer = [0xFF_u8; 64];
        assert!(song.service_stream(&mut buffer));
        assert!(buffer.iter().all(|byte| *byte == 0));
    }
}
