//! Symphonia codec backend for the decoder facade.

use log::warn;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::decoder::{DecoderInfo, SoundDecoder};
use crate::io::{BufferSource, SharedBuf};
use crate::session::{ChannelLayout, SampleFormat};

pub struct MediaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: DecoderInfo,
    carry: Vec<u8>,
    carry_pos: usize,
    finished: bool,
}

impl MediaDecoder {
    /// Probe the buffer; `None` declines and leaves no state behind.
    pub fn open(buffer: SharedBuf) -> Option<MediaDecoder> {
        let stream = MediaSourceStream::new(
            Box::new(BufferSource::new(buffer)),
            MediaSourceStreamOptions::default(),
        );
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
            _ => return None,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .ok()?;

        Some(MediaDecoder {
            format,
            decoder,
            track_id,
            info: DecoderInfo {
                sample_rate: params.sample_rate.unwrap_or(44_100),
                channel_layout,
                sample_format: SampleFormat::Float32,
            },
            carry: Vec::new(),
            carry_pos: 0,
            finished: false,
        })
    }

    /// Decode the next packet into the carry buffer.
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
                    self.finished = true;
                    return false;
                }
                Err(err) => {
                    warn!("media stream ended early: {}", err);
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
                    if samples.samples().is_empty() {
                        continue;
                    }
                    self.carry.clear();
                    self.carry_pos = 0;
                    for sample in samples.samples() {
                        self.carry.extend_from_slice(&sample.to_le_bytes());
                    }
                    return true;
                }
                Err(Error::DecodeError(err)) => {
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
}

impl SoundDecoder for MediaDecoder {
    fn info(&self) -> DecoderInfo {
        self.info
    }

    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let mut written = 0;
        while written < buffer.len() {
            if self.carry_pos >= self.carry.len() {
                if !self.refill() {
                    break;
                }
            }
            let available = self.carry.len() - self.carry_pos;
            let count = available.min(buffer.len() - written);
            buffer[written..written + count]
                .copy_from_slice(&self.carry[self.carry_pos..self.carry_pos + count]);
            self.carry_pos += count;
            written += count;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    #[test]
    fn declines_non_media_buffer() {
        assert!(MediaDecoder::open(SharedBuf::new(vec![0_u8; 64])).is_none());
    }

    #[test]
    fn reads_flac_style_partial_requests() {
        // A WAV buffer exercised through deliberately small reads.
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = IoCursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for _ in 0..50 {
                writer.write_sample(-2048_i16).expect("sample");
            }
            writer.finalize().expect("finalize");
        }

        let mut decoder =
            MediaDecoder::open(SharedBuf::new(cursor.into_inner())).expect("accepted");
        let mut total = 0;
        let mut chunk = [0_u8; 12];
        loop {
            let got = decoder.read(&mut chunk);
            if got == 0 {
                break;
            }
            total += got;
        }
        assert_eq!(total, 50 * 4);
    }
}
