//! Format identification and backend dispatch.
//!
//! Turns an owned [`MusicReader`] into a live [`SongHandle`]: reads a
//! 32-byte signature without consuming it, unwraps a gzip envelope if one is
//! present, and walks the ordered backend list until exactly one claims the
//! stream. The reader has one owner at every instant and is closed exactly
//! once per dispatch attempt, whatever the outcome.

pub mod error;

use std::io::SeekFrom;
use std::path::Path;

use log::debug;

use crate::config::ConfigContext;
use crate::io::{gzip, FileReader, MemoryReader, MusicReader};
use crate::midi::streamer::MidiStreamer;
use crate::midi::{self, MidiSource};
use crate::session::cdda::{self, CddaSong};
use crate::session::{MidiDevice, Session, SongHandle};
#[cfg(feature = "opl")]
use crate::stream::opl::{self, OplSource};
use crate::stream::sample::SampleSource;
use crate::stream::tracker::ModSource;
use crate::stream::xa::{self, XaSource};
use crate::stream::{gme, StreamSong, StreamSource};

use error::{set_last_error, OpenError};

const SIGNATURE_LEN: usize = 32;

/// Open a song from a file path.
pub fn open_song_file(
    path: impl AsRef<Path>,
    device: MidiDevice,
    config: &ConfigContext,
) -> Result<SongHandle, OpenError> {
    let reader = match FileReader::open(path) {
        Ok(reader) => reader,
        Err(err) => {
            set_last_error(&format!("unable to open file: {}", err));
            return Err(OpenError::HeaderRead);
        }
    };
    open_song(Box::new(reader), device, config)
}

/// Open a song from an in-memory buffer.
///
/// The bytes are copied: the stream may be consumed long after this call and
/// the caller's buffer cannot be pinned for that long.
pub fn open_song_mem(
    data: &[u8],
    device: MidiDevice,
    config: &ConfigContext,
) -> Result<SongHandle, OpenError> {
    if data.is_empty() {
        set_last_error("no data supplied");
        return Err(OpenError::HeaderRead);
    }
    open_song(Box::new(MemoryReader::new(data.to_vec())), device, config)
}

/// Identify a music stream and set up a session for it.
///
/// Ownership of `reader` transfers here; it is closed on every path.
pub fn open_song(
    reader: Box<dyn MusicReader>,
    device: MidiDevice,
    config: &ConfigContext,
) -> Result<SongHandle, OpenError> {
    match open_song_internal(reader, device, config) {
        Ok(handle) => Ok(handle),
        Err(err) => {
            set_last_error(&err.to_string());
            Err(err)
        }
    }
}

fn open_song_internal(
    reader: Box<dyn MusicReader>,
    device: MidiDevice,
    config: &ConfigContext,
) -> Result<SongHandle, OpenError> {
    let mut reader = Some(reader);
    let mut signature = [0_u8; SIGNATURE_LEN];

    if !read_signature(reader.as_mut().unwrap().as_mut(), &mut signature) {
        close_reader(&mut reader);
        return Err(OpenError::HeaderRead);
    }

    // Check for a gzip envelope first. Several of these formats are commonly
    // shipped compressed, so all of them are treated as gzippable: swap in a
    // reader over the decompressed payload and identify that instead.
    if gzip::is_envelope(&signature) {
        let mut compressed = reader.take().unwrap();
        let payload = compressed.read_remaining();
        compressed.close();
        let payload = match payload {
            Ok(payload) => payload,
            Err(_) => return Err(OpenError::HeaderRead),
        };
        let inflated = gzip::decompress(&payload)
            .map_err(|err| OpenError::Decompression(err.to_string()))?;
        reader = Some(Box::new(MemoryReader::new(inflated)));
        if !read_signature(reader.as_mut().unwrap().as_mut(), &mut signature) {
            close_reader(&mut reader);
            return Err(OpenError::HeaderRead);
        }
    }

    let mut session: Option<Box<dyn Session>> = None;

    if let Some(kind) = midi::identify(&signature) {
        // MIDI family always takes precedence. The payload is loaded whole;
        // the reader stays here and is closed at the common exit.
        let data = match reader.as_mut().unwrap().read_remaining() {
            Ok(data) => data,
            Err(_) => {
                close_reader(&mut reader);
                return Err(OpenError::HeaderRead);
            }
        };
        let source = match MidiSource::new(kind, data) {
            Ok(source) => source,
            Err(reason) => {
                debug!("rejected {:?} payload: {}", kind, reason);
                close_reader(&mut reader);
                return Err(OpenError::InvalidMidiData);
            }
        };
        let device = substitute_device(device);
        session = Some(Box::new(MidiStreamer::new(source, device, config)));
    } else if cdda::matches_signature(&signature) {
        match CddaSong::open(reader.as_mut().unwrap().as_mut()) {
            Ok(song) => session = Some(Box::new(song)),
            Err(err) => {
                close_reader(&mut reader);
                return Err(OpenError::Backend(err));
            }
        }
    } else {
        let mut source: Option<Box<dyn StreamSource>> = None;

        #[cfg(feature = "opl")]
        if opl::matches_signature(&signature) {
            match OplSource::open(
                reader.as_mut().unwrap().as_mut(),
                config.misc.output_rate,
                config.fmsynth.chips,
            ) {
                Ok(opened) => source = opened.map(|s| Box::new(s) as Box<dyn StreamSource>),
                Err(err) => {
                    close_reader(&mut reader);
                    return Err(OpenError::Backend(err));
                }
            }
        }

        if source.is_none() {
            if xa::matches_signature(&signature) {
                // The XA backend takes the reader over unconditionally,
                // success or failure.
                let taken = reader.take().unwrap();
                match XaSource::open(taken) {
                    Ok(opened) => source = Some(Box::new(opened)),
                    Err(err) => return Err(OpenError::Backend(err)),
                }
            } else if let Some(format) = gme::check_format(&signature) {
                match gme::GmeSource::open(
                    reader.as_mut().unwrap().as_mut(),
                    format,
                    config.misc.output_rate,
                ) {
                    Ok(opened) => source = opened.map(|s| Box::new(s) as Box<dyn StreamSource>),
                    Err(err) => {
                        close_reader(&mut reader);
                        return Err(OpenError::Backend(err));
                    }
                }
            } else {
                match ModSource::open(
                    reader.as_mut().unwrap().as_mut(),
                    module_rate(config),
                ) {
                    Ok(opened) => source = opened.map(|s| Box::new(s) as Box<dyn StreamSource>),
                    Err(err) => {
                        close_reader(&mut reader);
                        return Err(OpenError::Backend(err));
                    }
                }
            }
        }

        if source.is_none() {
            // Generic sample files are the last resort. This backend takes
            // the reader only on success and hands it back on decline.
            if let Some(taken) = reader.take() {
                match SampleSource::try_open(taken) {
                    Ok(opened) => source = Some(Box::new(opened)),
                    Err(returned) => reader = Some(returned),
                }
            }
        }

        if let Some(source) = source {
            session = Some(Box::new(StreamSong::new(source)));
        }
    }

    let session = match session {
        Some(session) => session,
        None => {
            close_reader(&mut reader);
            return Err(OpenError::Unidentified);
        }
    };

    if !session.is_valid() {
        close_reader(&mut reader);
        return Err(OpenError::Unidentified);
    }

    close_reader(&mut reader);
    Ok(SongHandle::new(session))
}

/// Read the leading signature without consuming it.
fn read_signature(reader: &mut dyn MusicReader, signature: &mut [u8; SIGNATURE_LEN]) -> bool {
    match reader.read_fully(signature) {
        Ok(got) if got == SIGNATURE_LEN => {}
        _ => return false,
    }
    reader.seek(SeekFrom::Current(-(SIGNATURE_LEN as i64))).is_ok()
}

fn close_reader(reader: &mut Option<Box<dyn MusicReader>>) {
    if let Some(mut reader) = reader.take() {
        reader.close();
    }
}

fn module_rate(config: &ConfigContext) -> i32 {
    if config.modplay.samplerate > 0 {
        config.modplay.samplerate
    } else {
        config.misc.output_rate
    }
}

/// Map the requested device to one the platform can actually drive.
#[cfg(not(feature = "system-midi"))]
fn substitute_device(device: MidiDevice) -> MidiDevice {
    // No native system-MIDI output: route standard-device requests to the
    // software synth.
    if device == MidiDevice::Standard {
        MidiDevice::SoftSynth
    } else {
        device
    }
}

#[cfg(feature = "system-midi")]
fn substitute_device(device: MidiDevice) -> MidiDevice {
    device
}
