//! CD-XA audio source.
//!
//! Streams mode-2 sectors out of a RIFF/CDXA container and decodes the
//! 4-bit XA ADPCM sound groups to interleaved 16-bit PCM. This backend takes
//! ownership of the reader unconditionally — success or failure — which
//! callers of the dispatcher rely on; do not "fix" the asymmetry.

use std::io::SeekFrom;

use log::warn;
use serde_json::json;

use crate::io::MusicReader;
use crate::session::{ChannelLayout, SampleFormat, StreamInfo};
use crate::stream::StreamSource;

const SECTOR_SIZE: usize = 2336;
const SUBHEADER_LEN: usize = 8;
const GROUPS_PER_SECTOR: usize = 18;
const GROUP_SIZE: usize = 128;
const SAMPLES_PER_UNIT: usize = 28;

/// Submode bit flagging an audio sector.
const SUBMODE_AUDIO: u8 = 0x04;

/// Prediction filter coefficients, in 1/64 units.
const FILTER_K0: [i32; 4] = [0, 60, 115, 98];
const FILTER_K1: [i32; 4] = [0, 0, -52, -55];

/// Check for the RIFF/CDXA container signature.
pub fn matches_signature(signature: &[u8]) -> bool {
    signature.len() >= 12 && &signature[0..4] == b"RIFF" && &signature[8..12] == b"CDXA"
}

pub struct XaSource {
    reader: Option<Box<dyn MusicReader>>,
    data_start: u64,
    data_end: u64,
    next_sector: u64,
    info: StreamInfo,
    history: [(i32, i32); 2],
    pending: Vec<i16>,
    pending_pos: usize,
    looping: bool,
    sectors_decoded: u64,
}

impl XaSource {
    /// Open a RIFF/CDXA stream. Takes the reader over unconditionally; on
    /// failure the reader is closed here and an error is reported.
    pub fn open(mut reader: Box<dyn MusicReader>) -> Result<XaSource, String> {
        match Self::parse(reader.as_mut()) {
            Ok((data_start, data_end, info)) => Ok(XaSource {
                reader: Some(reader),
                data_start,
                data_end,
                next_sector: data_start,
                info,
                history: [(0, 0); 2],
                pending: Vec::new(),
                pending_pos: 0,
                looping: false,
                sectors_decoded: 0,
            }),
            Err(err) => {
                reader.close();
                Err(err)
            }
        }
    }

    /// Walk the RIFF chunks to the data region and read the stream format
    /// from the first audio sector's coding byte.
    fn parse(reader: &mut dyn MusicReader) -> Result<(u64, u64, StreamInfo), String> {
        let mut header = [0_u8; 12];
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|err| format!("CDXA seek failed: {}", err))?;
        if reader.read_fully(&mut header).map_err(stringify)? != 12
            || &header[0..4] != b"RIFF"
            || &header[8..12] != b"CDXA"
        {
            return Err("not a RIFF/CDXA container".to_string());
        }

        // Chunk walk: skip everything up to the data chunk.
        let (data_start, data_len) = loop {
            let mut chunk = [0_u8; 8];
            if reader.read_fully(&mut chunk).map_err(stringify)? != 8 {
                return Err("CDXA container has no data chunk".to_string());
            }
            let chunk_len = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
            if &chunk[0..4] == b"data" {
                break (reader.tell(), chunk_len);
            }
            // Chunks are word-aligned.
            let skip = chunk_len + (chunk_len & 1);
            reader.seek(SeekFrom::Current(skip as i64)).map_err(stringify)?;
        };

        if data_len < SECTOR_SIZE as u64 {
            return Err("CDXA data chunk holds no complete sector".to_string());
        }

        let mut subheader = [0_u8; SUBHEADER_LEN];
        if reader.read_fully(&mut subheader).map_err(stringify)? != SUBHEADER_LEN {
            return Err("CDXA sector subheader is truncated".to_string());
        }
        reader.seek(SeekFrom::Start(data_start)).map_err(stringify)?;

        let coding = subheader[3];
        let channel_layout = if coding & 0x03 != 0 {
            ChannelLayout::Stereo
        } else {
            ChannelLayout::Mono
        };
        let sample_rate = if coding & 0x0C != 0 { 18_900 } else { 37_800 };

        let info = StreamInfo {
            buffer_size: 16 * 1024,
            sample_rate,
            sample_format: SampleFormat::Int16,
            channel_layout,
        };
        Ok((data_start, data_start + data_len, info))
    }

    /// Decode the next audio sector into the pending sample queue.
    /// Returns `false` when the data region is exhausted.
    fn decode_next_sector(&mut self) -> bool {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return false,
        };
        loop {
            if self.next_sector + SECTOR_SIZE as u64 > self.data_end {
                return false;
            }
            let mut sector = vec![0_u8; SECTOR_SIZE];
            if reader.seek(SeekFrom::Start(self.next_sector)).is_err() {
                return false;
            }
            match reader.read_fully(&mut sector) {
                Ok(got) if got == SECTOR_SIZE => {}
                _ => return false,
            }
            self.next_sector += SECTOR_SIZE as u64;

            let submode = sector[2];
            if submode & SUBMODE_AUDIO == 0 {
                continue; // interleaved non-audio sector
            }

            let stereo = self.info.channel_layout == ChannelLayout::Stereo;
            self.pending.clear();
            self.pending_pos = 0;
            for group in 0..GROUPS_PER_SECTOR {
                let start = SUBHEADER_LEN + group * GROUP_SIZE;
                decode_group(
                    &sector[start..start + GROUP_SIZE],
                    stereo,
                    &mut self.history,
                    &mut self.pending,
                );
            }
            self.sectors_decoded += 1;
            return true;
        }
    }
}

fn stringify(err: std::io::Error) -> String {
    err.to_string()
}

/// Decode one 128-byte sound group of 4-bit units.
fn decode_group(group: &[u8], stereo: bool, history: &mut [(i32, i32); 2], out: &mut Vec<i16>) {
    for unit in 0..8 {
        let param = group[4 + unit];
        let shift = (param & 0x0F).min(12) as i32;
        let filter = ((param >> 4) & 0x03) as usize;
        let channel = if stereo { unit & 1 } else { 0 };
        let (mut h0, mut h1) = history[channel];

        for sample_index in 0..SAMPLES_PER_UNIT {
            let byte = group[16 + sample_index * 4 + (unit >> 1)];
            let nibble = if unit & 1 != 0 { byte >> 4 } else { byte & 0x0F };
            // Sign-extend the nibble into the top of an i16 and apply the
            // range shift and prediction filter.
            let raw = ((nibble as i32) << 12) << 16 >> 16;
            let mut sample = raw >> shift;
            sample += (h0 * FILTER_K0[filter] + h1 * FILTER_K1[filter]) >> 6;
            let sample = sample.clamp(i16::MIN as i32, i16::MAX as i32);
            h1 = h0;
            h0 = sample;

            if stereo {
                if unit & 1 == 0 {
                    // Left unit: stage the frame, right fills in next unit.
                    out.push(sample as i16);
                    out.push(0);
                } else {
                    let frame = out.len() - 2 * (SAMPLES_PER_UNIT - sample_index) + 1;
                    out[frame] = sample as i16;
                }
            } else {
                out.push(sample as i16);
            }
        }
        history[channel] = (h0, h1);
    }
}

impl StreamSource for XaSource {
    fn format(&self) -> StreamInfo {
        self.info
    }

    fn get_data(&mut self, buffer: &mut [u8]) -> bool {
        let mut written = 0;
        while written + 2 <= buffer.len() {
            if self.pending_pos >= self.pending.len() {
                if !self.decode_next_sector() {
                    if self.looping && self.sectors_decoded > 0 {
                        self.next_sector = self.data_start;
                        self.history = [(0, 0); 2];
                        continue;
                    }
                    break;
                }
            }
            let sample = self.pending[self.pending_pos];
            self.pending_pos += 1;
            buffer[written..written + 2].copy_from_slice(&sample.to_le_bytes());
            written += 2;
        }
        if written < buffer.len() {
            buffer[written..].fill(0);
        }
        written > 0
    }

    fn set_play_mode(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn stats(&self) -> String {
        json!({
            "format": "CD-XA",
            "sample_rate": self.info.sample_rate,
            "sectors": self.sectors_decoded,
        })
        .to_string()
    }
}

impl Drop for XaSource {
    fn drop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        } else {
            warn!("XA source dropped without a reader");
        }
    }
}
