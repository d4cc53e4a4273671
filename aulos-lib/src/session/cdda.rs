//! CD-audio container session.
//!
//! A RIFF/CDDA file is a tiny pointer into a Red Book disc: version, track
//! number, disc serial, and the track's position and length in frames.
//! Actual disc access is platform glue outside this crate; the session
//! carries the classification, format, and transport state.

use serde_json::json;

use crate::io::MusicReader;
use crate::session::{
    ChannelLayout, MidiDevice, SampleFormat, Session, SessionError, StreamInfo,
};

/// Red Book audio: 75 frames per second.
const CD_FRAMES_PER_SECOND: u32 = 75;
const CD_SAMPLE_RATE: u32 = 44_100;

/// Check for the RIFF/CDDA container signature.
pub fn matches_signature(signature: &[u8]) -> bool {
    signature.len() >= 12 && &signature[0..4] == b"RIFF" && &signature[8..12] == b"CDDA"
}

pub struct CddaSong {
    track: u16,
    serial: u32,
    length_frames: u32,
    position_frames: u64,
    looping: bool,
    playing: bool,
    paused: bool,
}

impl CddaSong {
    /// Parse the CDDA fmt chunk. The reader stays with the caller.
    pub fn open(reader: &mut dyn MusicReader) -> Result<CddaSong, String> {
        let mut header = [0_u8; 44];
        let got = reader.read_fully(&mut header).map_err(|err| err.to_string())?;
        if got < 36 || &header[0..4] != b"RIFF" || &header[8..12] != b"CDDA" {
            return Err("not a RIFF/CDDA container".to_string());
        }
        if &header[12..16] != b"fmt " {
            return Err("CDDA container is missing its fmt chunk".to_string());
        }
        let chunk_len = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
        if chunk_len < 24 {
            return Err("CDDA fmt chunk is too short".to_string());
        }

        let version = u16::from_le_bytes([header[20], header[21]]);
        if version != 1 {
            return Err(format!("unsupported CDDA version {}", version));
        }
        let track = u16::from_le_bytes([header[22], header[23]]);
        if track == 0 {
            return Err("CDDA track number is zero".to_string());
        }
        let serial = u32::from_le_bytes([header[24], header[25], header[26], header[27]]);
        let length_frames = u32::from_le_bytes([header[32], header[33], header[34], header[35]]);

        Ok(CddaSong {
            track,
            serial,
            length_frames,
            position_frames: 0,
            looping: false,
            playing: false,
            paused: false,
        })
    }

    fn length_samples(&self) -> u64 {
        self.length_frames as u64 * (CD_SAMPLE_RATE / CD_FRAMES_PER_SECOND) as u64
    }
}

impl Session for CddaSong {
    fn play(&mut self, looping: bool, _subsong: i32) -> Result<(), SessionError> {
        self.looping = looping;
        self.playing = true;
        self.paused = false;
        self.position_frames = 0;
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
        // Disc audio arrives through the platform's CD interface; the
        // stream slot stays silent while tracking position.
        buffer.fill(0);
        if !self.playing || self.paused {
            return self.playing;
        }
        self.position_frames += buffer.len() as u64 / 4;
        if self.position_frames >= self.length_samples() {
            if !self.looping {
                self.playing = false;
                return false;
            }
            self.position_frames = 0;
        }
        true
    }

    fn is_playing(&self) -> bool {
        self.playing && !self.paused
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn device_type(&self) -> MidiDevice {
        MidiDevice::Default
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            buffer_size: 16 * 1024,
            sample_rate: CD_SAMPLE_RATE,
            sample_format: SampleFormat::Int16,
            channel_layout: ChannelLayout::Stereo,
        }
    }

    fn stats(&self) -> String {
        json!({
            "format": "CDDA",
            "track": self.track,
            "serial": self.serial,
            "frames": self.length_frames,
        })
        .to_string()
    }

    fn is_valid(&self) -> bool {
        self.track > 0
    }
}
