//! Tracker module source (MOD/XM/IT/S3M probing).
//!
//! Module signatures live past the 32-byte dispatch window (the classic MOD
//! tag sits at offset 1080), so this backend probes the stream itself and
//! restores the position when it declines. Pattern mixing is an external
//! collaborator; the source owns identification, metadata, and transport.

use std::io::SeekFrom;

use log::debug;
use serde_json::json;

use crate::io::MusicReader;
use crate::session::{ChannelLayout, SampleFormat, StreamInfo};
use crate::stream::StreamSource;

const MOD_TAG_OFFSET: usize = 1080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Mod,
    Xm,
    It,
    S3m,
}

pub struct ModSource {
    kind: ModuleKind,
    title: String,
    channels: u32,
    output_rate: u32,
    playing_frames: u64,
}

impl ModSource {
    /// Probe the stream for a tracker module. Declines with the stream
    /// position restored when no signature matches.
    pub fn open(reader: &mut dyn MusicReader, output_rate: i32) -> Result<Option<ModSource>, String> {
        let start = reader.tell();
        let mut head = vec![0_u8; MOD_TAG_OFFSET + 4];
        let got = reader.read_fully(&mut head).map_err(|err| err.to_string())?;
        head.truncate(got);

        let parsed = probe(&head);
        if parsed.is_none() {
            reader
                .seek(SeekFrom::Start(start))
                .map_err(|err| format!("failed to restore stream position: {}", err))?;
            return Ok(None);
        }
        let (kind, title, channels) = parsed.unwrap();
        debug!("module: {:?} \"{}\", {} channels", kind, title, channels);

        Ok(Some(ModSource {
            kind,
            title,
            channels,
            output_rate: output_rate.max(1) as u32,
            playing_frames: 0,
        }))
    }
}

fn probe(head: &[u8]) -> Option<(ModuleKind, String, u32)> {
    if head.len() >= 17 + 20 && head.starts_with(b"Extended Module: ") {
        let title = latin1_trimmed(&head[17..37]);
        let channels = if head.len() >= 70 {
            u16::from_le_bytes([head[68], head[69]]) as u32
        } else {
            0
        };
        return Some((ModuleKind::Xm, title, channels));
    }
    if head.len() >= 30 && head.starts_with(b"IMPM") {
        return Some((ModuleKind::It, latin1_trimmed(&head[4..30]), 0));
    }
    if head.len() >= 48 && &head[44..48] == b"SCRM" {
        return Some((ModuleKind::S3m, latin1_trimmed(&head[0..28]), 0));
    }
    if head.len() >= MOD_TAG_OFFSET + 4 {
        let tag = &head[MOD_TAG_OFFSET..MOD_TAG_OFFSET + 4];
        let channels = match tag {
            b"M.K." | b"M!K!" | b"FLT4" | b"4CHN" => Some(4),
            b"6CHN" => Some(6),
            b"8CHN" | b"FLT8" => Some(8),
            _ => None,
        };
        if let Some(channels) = channels {
            return Some((ModuleKind::Mod, latin1_trimmed(&head[0..20]), channels));
        }
    }
    None
}

fn latin1_trimmed(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|byte| **byte != 0)
        .map(|byte| *byte as char)
        .collect::<String>()
        .trim()
        .to_string()
}

impl StreamSource for ModSource {
    fn format(&self) -> StreamInfo {
        StreamInfo {
            buffer_size: 16 * 1024,
            sample_rate: self.output_rate,
            sample_format: SampleFormat::Int16,
            channel_layout: ChannelLayout::Stereo,
        }
    }

    fn get_data(&mut self, buffer: &mut [u8]) -> bool {
        // Modules loop by construction; the pattern player renders into the
        // host mix and the stream slot stays silent.
        buffer.fill(0);
        self.playing_frames += buffer.len() as u64 / 4;
        true
    }

    fn stats(&self) -> String {
        json!({
            "kind": format!("{:?}", self.kind),
            "title": self.title,
            "channels": self.channels,
            "frames": self.playing_frames,
        })
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;

    /// Classic 4-channel MOD: title, 31 sample slots, then "M.K.".
    fn minimal_mod() -> Vec<u8> {
        let mut data = vec![0_u8; MOD_TAG_OFFSET + 4 + 1024];
        data[0..9].copy_from_slice(b"test song");
        data[MOD_TAG_OFFSET..MOD_TAG_OFFSET + 4].copy_from_slice(b"M.K.");
        data
    }

    #[test]
    fn probes_classic_mod_tag() {
        let mut reader = MemoryReader::new(minimal_mod());
        let source = ModSource::open(&mut reader, 44_100)
            .expect("probe")
            .expect("source");
        assert_eq!(source.kind, ModuleKind::Mod);
        assert_eq!(source.channels, 4);
        assert_eq!(source.title, "test song");
    }

    #[test]
    fn probes_xm_header() {
        let mut data = vec![0_u8; 80];
        data[0..17].copy_from_slice(b"Extended Module: ");
        data[17..21].copy_from_slice(b"song");
        data[68] = 8;
        let mut reader = MemoryReader::new(data);
        let source = ModSource::open(&mut reader, 44_100)
            .expect("probe")
            .expect("source");
        assert_eq!(source.kind, ModuleKind::Xm);
        assert_eq!(source.channels, 8);
    }

    #[test]
    fn decline_restores_stream_position() {
        let mut reader = MemoryReader::new(vec![0_u8; 2048]);
        reader.seek(SeekFrom::Start(7)).expect("seek");
        let result = ModSource::open(&mut reader, 44_100).expect("probe");
        assert!(result.is_none());
        assert_eq!(reader.tell(), 7);
    }
}
