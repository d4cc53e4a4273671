//! Raw-OPL register dump source (RDos RAW, DOSBox DRO, modified IMF).
//!
//! The dump is parsed into a timed register log and the total play length is
//! computed from the delay stream. Feeding the log to an OPL chip core is an
//! external concern; an unattached source emits silence for the computed
//! duration.

use log::{debug, trace};
use serde_json::json;

use crate::io::MusicReader;
use crate::session::{ChannelLayout, SampleFormat, StreamInfo};
use crate::stream::StreamSource;

/// RDos RAW delay ticks are counted against this PIT clock.
const RAW_CLOCK_HZ: f64 = 1_193_180.0;
/// Standard IMF register rate.
const IMF_RATE_HZ: f64 = 700.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OplVariant {
    RdosRaw,
    DosboxDro,
    Imf,
}

/// One raw register write with the delay preceding it.
struct OplEvent {
    register: u16,
    value: u8,
    delay_ms: u32,
}

pub struct OplSource {
    variant: OplVariant,
    events: Vec<OplEvent>,
    next_event: usize,
    clock_ms: u64,
    duration_frames: u64,
    position_frames: u64,
    output_rate: u32,
    looping: bool,
    chips: i32,
}

/// Check the signature against the three supported dump formats.
pub fn matches_signature(signature: &[u8]) -> bool {
    signature.len() >= 8
        && (&signature[0..8] == b"RAWADATA"
            || &signature[0..8] == b"DBRAWOPL"
            || (&signature[0..4] == b"ADLI" && signature[4] == b'B'))
}

impl OplSource {
    /// Parse a register dump. The reader stays with the caller.
    pub fn open(
        reader: &mut dyn MusicReader,
        output_rate: i32,
        chips: i32,
    ) -> Result<Option<OplSource>, String> {
        let data = reader
            .read_remaining()
            .map_err(|err| format!("failed to read OPL dump: {}", err))?;
        if data.len() < 10 {
            return Err("OPL dump is truncated".to_string());
        }

        let output_rate = output_rate.max(1) as u32;
        let (variant, (events, total_ms)) = if &data[0..8] == b"RAWADATA" {
            (OplVariant::RdosRaw, parse_rdos(&data)?)
        } else if &data[0..8] == b"DBRAWOPL" {
            (OplVariant::DosboxDro, parse_dro(&data)?)
        } else if &data[0..4] == b"ADLI" && data[4] == b'B' {
            (OplVariant::Imf, parse_imf(&data)?)
        } else {
            return Ok(None);
        };

        debug!(
            "OPL dump: {:?}, {} register writes, {} ms",
            variant,
            events.len(),
            total_ms
        );

        Ok(Some(OplSource {
            variant,
            events,
            next_event: 0,
            clock_ms: 0,
            duration_frames: total_ms * output_rate as u64 / 1000,
            position_frames: 0,
            output_rate,
            looping: false,
            chips: chips.max(1),
        }))
    }
}

type ParsedLog = (Vec<OplEvent>, u64);

fn parse_rdos(data: &[u8]) -> Result<ParsedLog, String> {
    if data.len() < 10 {
        return Err("RAW header is truncated".to_string());
    }
    let mut clock = u16::from_le_bytes([data[8], data[9]]) as f64;
    if clock == 0.0 {
        clock = 0xFFFF as f64;
    }
    let mut tick_ms = clock * 1000.0 / RAW_CLOCK_HZ;

    let mut events = Vec::new();
    let mut pending_ms = 0.0_f64;
    let mut total_ms = 0_u64;
    let mut high_bank = false;
    let mut offset = 10;
    while offset + 2 <= data.len() {
        let value = data[offset];
        let command = data[offset + 1];
        offset += 2;
        match command {
            // Delay in ticks.
            0x00 => pending_ms += value as f64 * tick_ms,
            0x02 => match value {
                // New tick rate follows.
                0x00 => {
                    if offset + 2 > data.len() {
                        break;
                    }
                    let new_clock = u16::from_le_bytes([data[offset], data[offset + 1]]) as f64;
                    offset += 2;
                    if new_clock > 0.0 {
                        tick_ms = new_clock * 1000.0 / RAW_CLOCK_HZ;
                    }
                }
                0x01 => high_bank = false,
                0x02 => high_bank = true,
                _ => {}
            },
            0xFF if value == 0xFF => break, // end marker
            register => {
                events.push(OplEvent {
                    register: register as u16 | if high_bank { 0x100 } else { 0 },
                    value,
                    delay_ms: pending_ms as u32,
                });
                total_ms += pending_ms as u64;
                pending_ms = 0.0;
            }
        }
    }
    total_ms += pending_ms as u64;
    Ok((events, total_ms))
}

fn parse_dro(data: &[u8]) -> Result<ParsedLog, String> {
    if data.len() < 26 {
        return Err("DRO header is truncated".to_string());
    }
    let version = u16::from_le_bytes([data[8], data[9]]);
    if version >= 2 {
        parse_dro_v2(data)
    } else {
        parse_dro_v1(data)
    }
}

fn parse_dro_v2(data: &[u8]) -> Result<ParsedLog, String> {
    let pair_count = u32::from_le_bytes([data[12], data[13], data[14], data[15]]) as usize;
    let short_delay_code = data[23];
    let long_delay_code = data[24];
    let codemap_len = data[25] as usize;
    let codemap_start = 26;
    let data_start = codemap_start + codemap_len;
    if data_start > data.len() {
        return Err("DRO codemap extends past the payload".to_string());
    }
    let codemap = &data[codemap_start..data_start];

    let mut events = Vec::with_capacity(pair_count);
    let mut pending_ms = 0_u32;
    let mut total_ms = 0_u64;
    let mut offset = data_start;
    for _ in 0..pair_count {
        if offset + 2 > data.len() {
            break;
        }
        let code = data[offset];
        let value = data[offset + 1];
        offset += 2;
        if code == short_delay_code {
            pending_ms += value as u32 + 1;
        } else if code == long_delay_code {
            pending_ms += (value as u32 + 1) * 256;
        } else {
            let high_bank = code & 0x80 != 0;
            let index = (code & 0x7F) as usize;
            let register = *codemap.get(index).unwrap_or(&0) as u16;
            events.push(OplEvent {
                register: register | if high_bank { 0x100 } else { 0 },
                value,
                delay_ms: pending_ms,
            });
            total_ms += pending_ms as u64;
            pending_ms = 0;
        }
    }
    total_ms += pending_ms as u64;
    Ok((events, total_ms))
}

fn parse_dro_v1(data: &[u8]) -> Result<ParsedLog, String> {
    // v1 stores the play length in milliseconds right after the magic.
    let length_ms = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let mut events = Vec::new();
    let mut pending_ms = 0_u32;
    let mut total_ms = 0_u64;
    let mut offset = 24;
    while offset < data.len() {
        match data[offset] {
            0x00 => {
                if offset + 2 > data.len() {
                    break;
                }
                pending_ms += data[offset + 1] as u32 + 1;
                offset += 2;
            }
            0x01 => {
                if offset + 3 > data.len() {
                    break;
                }
                pending_ms += u16::from_le_bytes([data[offset + 1], data[offset + 2]]) as u32 + 1;
                offset += 3;
            }
            0x02 | 0x03 => offset += 1, // bank select
            0x04 => offset += 1,        // escape, register follows
            register => {
                if offset + 2 > data.len() {
                    break;
                }
                events.push(OplEvent {
                    register: register as u16,
                    value: data[offset + 1],
                    delay_ms: pending_ms,
                });
                total_ms += pending_ms as u64;
                pending_ms = 0;
                offset += 2;
            }
        }
    }
    total_ms += pending_ms as u64;
    // Trust the declared length when it is longer than the decoded delays.
    Ok((events, total_ms.max(length_ms as u64)))
}

fn parse_imf(data: &[u8]) -> Result<ParsedLog, String> {
    // "ADLIB" tag, one flag byte, then the standard IMF stream: an optional
    // u16 data length followed by (register, value, delay) records.
    let mut offset = 6;
    if offset + 2 > data.len() {
        return Err("IMF header is truncated".to_string());
    }
    let declared = u16::from_le_bytes([data[offset], data[offset + 1]]) as usize;
    offset += 2;
    let end = if declared > 0 {
        (offset + declared).min(data.len())
    } else {
        data.len()
    };

    let mut events = Vec::new();
    let mut total_ms = 0_u64;
    while offset + 4 <= end {
        let register = data[offset] as u16;
        let value = data[offset + 1];
        let delay_ticks = u16::from_le_bytes([data[offset + 2], data[offset + 3]]) as f64;
        let delay_ms = (delay_ticks * 1000.0 / IMF_RATE_HZ) as u32;
        events.push(OplEvent {
            register,
            value,
            delay_ms,
        });
        total_ms += delay_ms as u64;
        offset += 4;
    }
    if events.is_empty() {
        return Err("IMF stream contains no register writes".to_string());
    }
    Ok((events, total_ms))
}

impl StreamSource for OplSource {
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
        let frames = buffer.len() as u64 / 4;
        self.position_frames += frames;

        // Pace the register log; the writes themselves go to whatever chip
        // the host has wired up.
        let elapsed_ms = self.position_frames * 1000 / self.output_rate as u64;
        while let Some(event) = self.events.get(self.next_event) {
            if self.clock_ms + event.delay_ms as u64 > elapsed_ms {
                break;
            }
            self.clock_ms += event.delay_ms as u64;
            trace!("opl write {:#05x} = {:#04x}", event.register, event.value);
            self.next_event += 1;
        }

        if self.position_frames >= self.duration_frames {
            if !self.looping {
                return false;
            }
            self.position_frames = 0;
            self.next_event = 0;
            self.clock_ms = 0;
        }
        true
    }

    fn set_play_mode(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn stats(&self) -> String {
        json!({
            "variant": format!("{:?}", self.variant),
            "writes": self.events.len(),
            "chips": self.chips,
            "frames": self.duration_frames,
        })
        .to_string()
    }

    fn change_setting_int(&mut self, name: &str, value: i32) {
        if name == "fm.chips" {
            self.chips = value.max(1);
        }
    }
}
