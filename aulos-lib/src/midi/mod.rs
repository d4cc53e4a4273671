//! MIDI-family identification and payload validation.
//!
//! The MIDI family covers standard MIDI files plus the legacy game variants
//! (MUS, XMI, HMI, HMP, MIDS). All of them are fully loaded into memory
//! before a streamer is built, so validation works on the whole payload.

pub mod streamer;

/// MIDI-family sub-format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiKind {
    /// Standard MIDI file.
    Smf,
    /// DMX MUS.
    Mus,
    /// Miles XMIDI.
    Xmi,
    /// Human Machine Interfaces song.
    Hmi,
    /// Human Machine Interfaces HMP variant.
    Hmp,
    /// RIFF MIDS stream.
    Mids,
}

/// Classify a stream signature as one of the MIDI family formats.
///
/// MIDI formats are checked before all other backends and always take
/// precedence when they match.
pub fn identify(signature: &[u8]) -> Option<MidiKind> {
    if signature.len() < 12 {
        return None;
    }
    if &signature[0..4] == b"MUS\x1a" {
        return Some(MidiKind::Mus);
    }
    if &signature[0..4] == b"MThd" {
        return Some(MidiKind::Smf);
    }
    if &signature[0..12] == b"HMI-MIDISONG" {
        return Some(MidiKind::Hmi);
    }
    if &signature[0..8] == b"HMIMIDIP" {
        return Some(MidiKind::Hmp);
    }
    if &signature[0..4] == b"FORM" && &signature[8..12] == b"XDIR" {
        return Some(MidiKind::Xmi);
    }
    if &signature[0..4] == b"RIFF" && &signature[8..12] == b"MIDS" {
        return Some(MidiKind::Mids);
    }
    None
}

/// A fully-loaded MIDI payload that passed structural validation.
pub struct MidiSource {
    kind: MidiKind,
    data: Vec<u8>,
    subsong_count: u32,
}

impl MidiSource {
    /// Validate `data` as `kind` and build a source.
    pub fn new(kind: MidiKind, data: Vec<u8>) -> Result<Self, String> {
        let subsong_count = match kind {
            MidiKind::Smf => validate_smf(&data)?,
            MidiKind::Mus => validate_mus(&data)?,
            MidiKind::Xmi => validate_xmi(&data)?,
            MidiKind::Hmi | MidiKind::Hmp => validate_hmi(&data)?,
            MidiKind::Mids => validate_mids(&data)?,
        };
        Ok(Self {
            kind,
            data,
            subsong_count,
        })
    }

    pub fn kind(&self) -> MidiKind {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn subsong_count(&self) -> u32 {
        self.subsong_count
    }
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn validate_smf(data: &[u8]) -> Result<u32, String> {
    if data.len() < 14 || &data[0..4] != b"MThd" {
        return Err("missing MThd header".to_string());
    }
    let header_len = be32(data, 4) as usize;
    if header_len < 6 || 8 + header_len > data.len() {
        return Err("MThd header length out of range".to_string());
    }
    let format = be16(data, 8);
    if format > 2 {
        return Err(format!("unsupported SMF format {}", format));
    }
    let track_count = be16(data, 10);
    if track_count == 0 {
        return Err("SMF declares zero tracks".to_string());
    }
    if be16(data, 12) == 0 {
        return Err("SMF division is zero".to_string());
    }

    // Walk the chunk list; at least one complete MTrk must be present.
    let mut offset = 8 + header_len;
    let mut tracks_seen = 0_u32;
    while offset + 8 <= data.len() {
        let chunk_len = be32(data, offset + 4) as usize;
        if offset + 8 + chunk_len > data.len() {
            break;
        }
        if &data[offset..offset + 4] == b"MTrk" {
            tracks_seen += 1;
        }
        offset += 8 + chunk_len;
    }
    if tracks_seen == 0 {
        return Err("SMF contains no complete track chunk".to_string());
    }

    // Format 2 files expose each track as its own subsong.
    Ok(if format == 2 { tracks_seen } else { 1 })
}

fn validate_mus(data: &[u8]) -> Result<u32, String> {
    if data.len() < 16 {
        return Err("MUS header is truncated".to_string());
    }
    let score_len = le16(data, 4) as usize;
    let score_start = le16(data, 6) as usize;
    if score_start < 16 {
        return Err("MUS score offset overlaps the header".to_string());
    }
    if score_start + score_len > data.len() {
        return Err("MUS score extends past the payload".to_string());
    }
    Ok(1)
}

fn validate_xmi(data: &[u8]) -> Result<u32, String> {
    if data.len() < 20 {
        return Err("XMI directory is truncated".to_string());
    }
    // The XDIR INFO chunk carries the sequence count; default to one song
    // when the directory omits it.
    let mut count = 1_u32;
    if let Some(pos) = data.windows(4).position(|window| window == b"INFO") {
        if pos + 10 <= data.len() {
            let value = le16(data, pos + 8) as u32;
            if value > 0 {
                count = value;
            }
        }
    }
    if !data.windows(4).any(|window| window == b"XMID") {
        return Err("XMI payload contains no XMID form".to_string());
    }
    Ok(count)
}

fn validate_hmi(data: &[u8]) -> Result<u32, String> {
    // HMI/HMP headers pad out to a fixed block before track data starts.
    if data.len() <= 0x100 {
        return Err("HMI payload is too short".to_string());
    }
    Ok(1)
}

fn validate_mids(data: &[u8]) -> Result<u32, String> {
    if data.len() < 20 {
        return Err("MIDS payload is truncated".to_string());
    }
    let riff_len = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    if riff_len + 8 > data.len() {
        return Err("MIDS RIFF size extends past the payload".to_string());
    }
    if &data[12..16] != b"fmt " {
        return Err("MIDS stream is missing its fmt chunk".to_string());
    }
    Ok(1)
}
