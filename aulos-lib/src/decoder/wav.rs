//! WAV fallback backend for the decoder facade.
//!
//! Second in the probe order: a plain RIFF/WAVE parser that reports the
//! source's own sample format instead of normalizing to float.

use std::io::Cursor;

use hound::WavReader;

use crate::decoder::{DecoderInfo, SoundDecoder};
use crate::io::SharedBuf;
use crate::session::{ChannelLayout, SampleFormat};

enum SampleWidth {
    Int16 { shift: u32 },
    Float32,
    UInt8,
}

pub struct WavDecoder {
    reader: WavReader<Cursor<SharedBuf>>,
    width: SampleWidth,
    info: DecoderInfo,
}

impl WavDecoder {
    /// Probe the buffer; `None` declines and leaves no state behind.
    pub fn open(buffer: SharedBuf) -> Option<WavDecoder> {
        let reader = WavReader::new(Cursor::new(buffer)).ok()?;
        let spec = reader.spec();

        let channel_layout = match spec.channels {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            _ => return None,
        };
        let (width, sample_format) = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => (SampleWidth::Float32, SampleFormat::Float32),
            (hound::SampleFormat::Int, 8) => (SampleWidth::UInt8, SampleFormat::UInt8),
            (hound::SampleFormat::Int, bits) if bits <= 16 => {
                (SampleWidth::Int16 { shift: 0 }, SampleFormat::Int16)
            }
            (hound::SampleFormat::Int, bits) if bits <= 32 => (
                SampleWidth::Int16 {
                    shift: bits as u32 - 16,
                },
                SampleFormat::Int16,
            ),
            _ => return None,
        };

        Some(WavDecoder {
            info: DecoderInfo {
                sample_rate: spec.sample_rate,
                channel_layout,
                sample_format,
            },
            width,
            reader,
        })
    }
}

impl SoundDecoder for WavDecoder {
    fn info(&self) -> DecoderInfo {
        self.info
    }

    fn read(&mut self, buffer: &mut [u8]) -> usize {
        let mut written = 0;
        match &self.width {
            SampleWidth::Int16 { shift } => {
                let shift = *shift;
                let mut samples = self.reader.samples::<i32>();
                while written + 2 <= buffer.len() {
                    let sample = match samples.next() {
                        Some(Ok(sample)) => (sample >> shift) as i16,
                        _ => break,
                    };
                    buffer[written..written + 2].copy_from_slice(&sample.to_le_bytes());
                    written += 2;
                }
            }
            SampleWidth::Float32 => {
                let mut samples = self.reader.samples::<f32>();
                while written + 4 <= buffer.len() {
                    let sample = match samples.next() {
                        Some(Ok(sample)) => sample,
                        _ => break,
                    };
                    buffer[written..written + 4].copy_from_slice(&sample.to_le_bytes());
                    written += 4;
                }
            }
            SampleWidth::UInt8 => {
                let mut samples = self.reader.samples::<i16>();
                while written < buffer.len() {
                    let sample = match samples.next() {
                        Some(Ok(sample)) => (sample as i32 + 128).clamp(0, 255) as u8,
                        _ => break,
                    };
                    buffer[written] = sample;
                    written += 1;
                }
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_with_spec(spec: hound::WavSpec, samples: &[i32]) -> SharedBuf {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for sample in samples {
                match spec.sample_format {
                    hound::SampleFormat::Int if spec.bits_per_sample <= 16 => {
                        writer.write_sample(*sample as i16).expect("sample")
                    }
                    hound::SampleFormat::Int => writer.write_sample(*sample).expect("sample"),
                    hound::SampleFormat::Float => {
                        writer.write_sample(*sample as f32).expect("sample")
                    }
                }
            }
            writer.finalize().expect("finalize");
        }
        SharedBuf::new(cursor.into_inner())
    }

    #[test]
    fn reports_int16_wav_natively() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 11_025,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut decoder = WavDecoder::open(wav_with_spec(spec, &[100, -100, 0])).expect("open");
        assert_eq!(decoder.info().sample_format, SampleFormat::Int16);

        let mut buffer = [0_u8; 6];
        assert_eq!(decoder.read(&mut buffer), 6);
        assert_eq!(i16::from_le_bytes([buffer[0], buffer[1]]), 100);
        assert_eq!(i16::from_le_bytes([buffer[2], buffer[3]]), -100);
        assert_eq!(decoder.read(&mut buffer), 0);
    }

    #[test]
    fn widens_24_bit_samples_down_to_16() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut decoder =
            WavDecoder::open(wav_with_spec(spec, &[0x0100_00, -0x0100_00])).expect("open");
        let mut buffer = [0_u8; 4];
        assert_eq!(decoder.read(&mut buffer), 4);
        assert_eq!(i16::from_le_bytes([buffer[0], buffer[1]]), 0x100);
        assert_eq!(i16::from_le_bytes([buffer[2], buffer[3]]), -0x100);
    }

    #[test]
    fn declines_garbage() {
        assert!(WavDecoder::open(SharedBuf::new(b"not a wav".to_vec())).is_none());
    }
}
