//! Static sample decoding behind a uniform open/read contract.
//!
//! [`create_decoder`] probes a fixed, ordered set of codec backends against
//! an in-memory buffer; every attempt starts from the same recorded
//! position, so a declining backend leaves nothing behind. The first backend
//! that accepts the buffer wins.

pub mod media;
pub mod wav;

use crate::io::SharedBuf;
use crate::session::{ChannelLayout, SampleFormat};

/// Initial allocation for [`SoundDecoder::read_all`].
const READ_ALL_CHUNK: usize = 32 * 1024;

/// Decoded-stream properties reported by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderInfo {
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,
}

/// A decoder over a static sample buffer.
///
/// Resources are released on drop; the ownership system rules out any call
/// after that.
pub trait SoundDecoder: Send {
    fn info(&self) -> DecoderInfo;

    /// Decode up to `buffer.len()` bytes; `0` signals exhaustion.
    fn read(&mut self, buffer: &mut [u8]) -> usize;

    /// Decode the remainder of the stream into one buffer.
    ///
    /// Fallback for backends that cannot report their total length up
    /// front: reads into a doubling buffer until the stream is exhausted.
    fn read_all(&mut self) -> Vec<u8> {
        let mut output = vec![0_u8; READ_ALL_CHUNK];
        let mut total = 0;
        loop {
            let got = self.read(&mut output[total..]);
            if got == 0 {
                break;
            }
            total += got;
            if total == output.len() {
                output.resize(total * 2, 0);
            }
        }
        output.truncate(total);
        output
    }
}

/// Probe the codec backends in order and return the first that accepts.
pub fn create_decoder(data: Vec<u8>) -> Option<Box<dyn SoundDecoder>> {
    let buffer = SharedBuf::new(data);
    if let Some(decoder) = media::MediaDecoder::open(buffer.clone()) {
        return Some(Box::new(decoder));
    }
    if let Some(decoder) = wav::WavDecoder::open(buffer) {
        return Some(Box::new(decoder));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(frames: usize, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for index in 0..frames * channels as usize {
                writer.write_sample((index as i16) << 4).expect("sample");
            }
            writer.finalize().expect("finalize");
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_wav_buffer_through_the_facade() {
        let decoder = create_decoder(wav_bytes(100, 2));
        let mut decoder = decoder.expect("wav buffer is accepted");
        let info = decoder.info();
        assert_eq!(info.sample_rate, 22_050);
        assert_eq!(info.channel_layout, ChannelLayout::Stereo);

        let bytes_per_sample = info.sample_format.bytes_per_sample() as usize;
        let all = decoder.read_all();
        assert_eq!(all.len(), 100 * 2 * bytes_per_sample);
        assert!(decoder.read(&mut [0_u8; 16]) == 0);
    }

    #[test]
    fn read_all_grows_past_its_initial_chunk() {
        // More than 32 KiB of decoded output forces at least one resize.
        let frames = 3 * READ_ALL_CHUNK / 4;
        let mut decoder = create_decoder(wav_bytes(frames, 1)).expect("accepted");
        let bytes_per_sample = decoder.info().sample_format.bytes_per_sample() as usize;
        assert_eq!(decoder.read_all().len(), frames * bytes_per_sample);
    }

    #[test]
    fn unknown_buffer_is_declined_by_every_backend() {
        assert!(create_decoder(vec![0x42_u8; 512]).is_none());
        assert!(create_decoder(Vec::new()).is_none());
    }
}
