//! Game-music (chip emulation) source.
//!
//! Formats are recognized through a probe table keyed on the first four
//! bytes of the stream. The source parses per-format track counts and
//! durations and owns the transport; the chip cores that render PCM are
//! external collaborators, so an unattached source emits silence.

use log::warn;
use serde_json::json;

use crate::io::MusicReader;
use crate::session::{ChannelLayout, SampleFormat, StreamInfo};
use crate::stream::StreamSource;

/// Fallback track length when the file does not declare one.
const DEFAULT_TRACK_SECONDS: u64 = 150;

const FORMATS: &[([u8; 4], &str)] = &[
    (*b"ZXAY", "AY"),
    ([b'G', b'B', b'S', 0x01], "GBS"),
    (*b"GYMX", "GYM"),
    (*b"HESM", "HES"),
    (*b"KSCC", "KSS"),
    (*b"KSSX", "KSS"),
    (*b"NESM", "NSF"),
    (*b"NSFE", "NSFE"),
    (*b"SNES", "SPC"),
    (*b"Vgm ", "VGM"),
];

/// Look up a stream signature in the game-music probe table.
pub fn check_format(signature: &[u8]) -> Option<&'static str> {
    if signature.len() < 4 {
        return None;
    }
    FORMATS
        .iter()
        .find(|(magic, _)| magic == &signature[0..4])
        .map(|(_, name)| *name)
}

pub struct GmeSource {
    format: &'static str,
    track_count: u32,
    track: u32,
    duration_frames: u64,
    position_frames: u64,
    output_rate: u32,
    looping: bool,
    stereo_depth: f64,
}

impl GmeSource {
    /// Parse the payload for `format`. The reader stays with the caller.
    pub fn open(
        reader: &mut dyn MusicReader,
        format: &'static str,
        output_rate: i32,
    ) -> Result<Option<GmeSource>, String> {
        let data = reader
            .read_remaining()
            .map_err(|err| format!("failed to read {} data: {}", format, err))?;
        if data.len() < 16 {
            return Err(format!("{} payload is truncated", format));
        }

        let output_rate = output_rate.max(1) as u32;
        let track_count = track_count_for(format, &data);
        let duration_frames = duration_frames_for(format, &data, output_rate);

        Ok(Some(GmeSource {
            format,
            track_count,
            track: 0,
            duration_frames,
            position_frames: 0,
            output_rate,
            looping: false,
            stereo_depth: 0.0,
        }))
    }
}

fn track_count_for(format: &str, data: &[u8]) -> u32 {
    let count = match format {
        "NSF" => data.get(6).copied().unwrap_or(1) as u32,
        "GBS" => data.get(4).copied().unwrap_or(1) as u32,
        "HES" | "KSS" | "AY" => data.get(4).copied().unwrap_or(0) as u32 + 1,
        _ => 1,
    };
    count.max(1)
}

fn duration_frames_for(format: &str, data: &[u8], output_rate: u32) -> u64 {
    if format == "VGM" && data.len() >= 0x1C {
        // Total sample count at 0x18, recorded at 44.1 kHz.
        let samples = u32::from_le_bytes([data[0x18], data[0x19], data[0x1A], data[0x1B]]) as u64;
        if samples > 0 {
            return samples * output_rate as u64 / 44_100;
        }
        warn!("VGM file declares no sample count, using default length");
    }
    DEFAULT_TRACK_SECONDS * output_rate as u64
}

impl StreamSource for GmeSource {
    fn format(&self) -> StreamInfo {
        StreamInfo {
            buffer_size: 16 * 1024,
            sample_rate: self.output_rate,
            sample_format: SampleFormat::Int16,
            channel_layout: ChannelLayout::Stereo,
        }
    }

    fn get_data(&mut self, buffer: &mut [u8]) -> bool {
        buffer.fill(0);
        let frames = buffer.len() as u64 / 4; // stereo i16
        self.position_frames += frames;
        if self.position_frames >= self.duration_frames {
            if !self.looping {
                return false;
            }
            self.position_frames = 0;
        }
        true
    }

    fn set_play_mode(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn set_subsong(&mut self, subsong: i32) -> bool {
        if subsong < 0 || subsong as u32 >= self.track_count {
            return false;
        }
        self.track = subsong as u32;
        self.position_frames = 0;
        true
    }

    fn stats(&self) -> String {
        json!({
            "format": self.format,
            "track": self.track,
            "tracks": self.track_count,
            "stereo_depth": self.stereo_depth,
        })
        .to_string()
    }

    fn change_setting_num(&mut self, name: &str, value: f64) {
        if name == "gme.stereodepth" {
            self.stereo_depth = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;

    /// Minimal VGM header: magic, version, and a total sample count.
    fn minimal_vgm(total_samples: u32) -> Vec<u8> {
        let mut data = vec![0_u8; 0x40];
        data[0..4].copy_from_slice(b"Vgm ");
        data[4..8].copy_from_slice(&(0x40_u32 - 4).to_le_bytes()); // EOF offset
        data[8..12].copy_from_slice(&0x0150_u32.to_le_bytes()); // version
        data[0x18..0x1C].copy_from_slice(&total_samples.to_le_bytes());
        data
    }

    #[test]
    fn probe_table_matches_known_magics() {
        assert_eq!(check_format(b"Vgm \x00\x00"), Some("VGM"));
        assert_eq!(check_format(b"NESM\x1a"), Some("NSF"));
        assert_eq!(check_format(b"KSSX...."), Some("KSS"));
        assert_eq!(check_format(b"SNES-SPC700"), Some("SPC"));
        assert_eq!(check_format(b"RIFF"), None);
    }

    #[test]
    fn vgm_duration_scales_to_output_rate() {
        let mut reader = MemoryReader::new(minimal_vgm(44_100));
        let source = GmeSource::open(&mut reader, "VGM", 22_050)
            .expect("open")
            .expect("source");
        assert_eq!(source.duration_frames, 22_050);
    }

    #[test]
    fn subsong_selection_clamps_to_track_count() {
        let mut data = vec![0_u8; 0x80];
        data[0..5].copy_from_slice(b"NESM\x1a");
        data[6] = 4; // four songs
        let mut reader = MemoryReader::new(data);
        let mut source = GmeSource::open(&mut reader, "NSF", 44_100)
            .expect("open")
            .expect("source");
        assert!(source.set_subsong(3));
        assert!(!source.set_subsong(4));
        assert!(!source.set_subsong(-1));
    }

    #[test]
    fn non_looping_source_ends_after_declared_length() {
        let mut reader = MemoryReader::new(minimal_vgm(64));
        let mut source = GmeSource::open(&mut reader, "VGM", 44_100)
            .expect("open")
            .expect("source");
        let mut buffer = [0_u8; 4 * 64];
        assert!(!source.get_data(&mut buffer));

        let mut reader = MemoryReader::new(minimal_vgm(64));
        let mut source = GmeSource::open(&mut reader, "VGM", 44_100)
            .expect("open")
            .expect("source");
        source.set_play_mode(true);
        assert!(source.get_data(&mut buffer));
    }

    #[test]
    fn honors_stereo_depth_live_setting() {
        let mut reader = MemoryReader::new(minimal_vgm(44_100));
        let mut source = GmeSource::open(&mut reader, "VGM", 44_100)
            .expect("open")
            .expect("source");
        source.change_setting_num("gme.stereodepth", 0.4);
        assert!(source.stats().contains("0.4"));
    }
}
