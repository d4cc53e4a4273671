//! Generic sample-file source backed by Symphonia.
//!
//! Final fallback of the dispatch chain: the remaining payload is pulled
//! into memory, probed, and decoded packet by packet into an f32 staging
//! ring. The backend takes reader ownership only on success; a decline
//! hands the reader back at its original position.

use std::io::SeekFrom;

use dasp_ring_buffer::Bounded;
use log::{debug, warn};
use serde_json::json;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::io::{BufferSource, MusicReader, SharedBuf};
use crate::session::{ChannelLayout, SampleFormat, StreamInfo};
use crate::stream::StreamSource;

/// Staging capacity in samples; comfortably above any single packet.
const STAGE_SAMPLES: usize = 1 << 18;

pub struct SampleSource {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    stage: Bounded<Vec<f32>>,
    frames_total: Option<u64>,
    frames_read: u64,
    finished: bool,
    looping: bool,
}

impl SampleSource {
    /// Try to open the payload as a sample file.
    ///
    /// On decline the reader is returned, positioned where it was when the
    /// call was made.
    pub fn try_open(mut reader: Box<dyn MusicReader>) -> Result<SampleSource, Box<dyn MusicReader>> {
        let start = reader.tell();
        let data = match reader.read_remaining() {
            Ok(data) => data,
            Err(_) => {
                let _ = reader.seek(SeekFrom::Start(start));
                return Err(reader);
            }
        };

        match Self::probe(data) {
            Some(source) => {
                // The payload is fully buffered; the claimed reader can go.
                reader.close();
                Ok(source)
            }
            None => {
                let _ = reader.seek(SeekFrom::Start(start));
                Err(reader)
            }
        }
    }

    fn probe(data: Vec<u8>) -> Option<SampleSource> {
        let source = BufferSource::new(SharedBuf::new(data));
        let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());
        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .ok()?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let channels = params.channels.map(|channels| channels.count())?;
        let channel_layout = match channels {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            other => {
                debug!("sample file has {} channels, declining", other);
                return None;
            }
        };
        let sample_rate = params.sample_rate.unwrap_or(44_100);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .ok()?;

        Some(SampleSource {
            format,
            decoder,
            track_id,
            info: StreamInfo {
                buffer_size: 16 * 1024,
                sample_rate,
                sample_format: SampleFormat::Float32,
                channel_layout,
            },
            stage: Bounded::from(vec![0.0_f32; STAGE_SAMPLES]),
            frames_total: params.n_frames,
            frames_read: 0,
            finished: false,
            looping: false,
        })
    }

    /// Decode packets until the stage holds samples again.
    fn refill(&mut self) -> bool {
        loop {
            if self.finished {
                return false;
            }
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    if self.looping && self.rewind() {
                        continue;
                    }
                    self.finished = true;
                    return false;
                }
                Err(err) => {
                    warn!("sample stream ended early: {}", err);
                    self.finished = true;
                    return false;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);
                    let count = samples.samples().len();
                    for sample in samples.samples() {
                        if self.stage.push(*sample).is_some() {
                            warn!("sample stage overflow, dropping audio");
                            break;
                        }
                    }
                    self.frames_read += (count / spec.channels.count().max(1)) as u64;
                    if count > 0 {
                        return true;
                    }
                }
                Err(Error::DecodeError(err)) => {
                    // Recoverable; skip the packet and keep going.
                    warn!("decode error: {}", err);
                }
                Err(err) => {
                    warn!("decoder failed: {}", err);
                    self.finished = true;
                    return false;
                }
            }
        }
    }

    fn rewind(&mut self) -> bool {
        let seek = self.format.seek(
            SeekMode::Coarse,
            SeekTo::Time {
                time: Time::new(0, 0.0),
                track_id: Some(self.track_id),
            },
        );
        if seek.is_err() {
            return false;
        }
        self.decoder.reset();
        self.frames_read = 0;
        true
    }
}

impl StreamSource for SampleSource {
    fn format(&self) -> StreamInfo {
        self.info
    }

    fn get_data(&mut self, buffer: &mut [u8]) -> bool {
        let mut written = 0;
        while written + 4 <= buffer.len() {
            let sample = match self.stage.pop() {
                Some(sample) => sample,
                None => {
                    if !self.refill() {
                        break;
                    }
                    continue;
                }
            };
            buffer[written..written + 4].copy_from_slice(&sample.to_le_bytes());
            written += 4;
        }
        buffer[written..].fill(0);
        written > 0
    }

    fn set_play_mode(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn stats(&self) -> String {
        json!({
            "format": "sample",
            "sample_rate": self.info.sample_rate,
            "frames_read": self.frames_read,
            "frames_total": self.frames_total,
        })
        .to_string()
    }
}
