//! End-to-end dispatch tests over synthetic minimal files.

use std::io::{Cursor, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aulos_lib::io::{MemoryReader, MusicReader};
use aulos_lib::{open_song, open_song_mem, ConfigContext, MidiDevice, OpenError};

/// Reader wrapper counting `close` calls, for ownership verification.
struct CountingReader {
    inner: MemoryReader,
    closes: Arc<AtomicUsize>,
}

impl CountingReader {
    fn new(data: Vec<u8>) -> (Box<dyn MusicReader>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let reader = CountingReader {
            inner: MemoryReader::new(data),
            closes: closes.clone(),
        };
        (Box::new(reader), closes)
    }
}

impl MusicReader for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }

    fn tell(&mut self) -> u64 {
        self.inner.tell()
    }

    fn byte_len(&mut self) -> std::io::Result<u64> {
        self.inner.byte_len()
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}

fn minimal_smf() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"MThd");
    data.extend_from_slice(&6_u32.to_be_bytes());
    data.extend_from_slice(&0_u16.to_be_bytes());
    data.extend_from_slice(&1_u16.to_be_bytes());
    data.extend_from_slice(&96_u16.to_be_bytes());
    data.extend_from_slice(b"MTrk");
    data.extend_from_slice(&4_u32.to_be_bytes());
    data.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
    data
}

fn minimal_mus() -> Vec<u8> {
    let mut data = b"MUS\x1a".to_vec();
    data.extend_from_slice(&2_u16.to_le_bytes()); // score length
    data.extend_from_slice(&16_u16.to_le_bytes()); // score start
    data.extend_from_slice(&[0_u8; 8]);
    data.extend_from_slice(&[0x60, 0x00]); // score
    data.extend_from_slice(&[0_u8; 24]); // padding past the signature window
    data
}

fn minimal_cdda() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"RIFF");
    data.extend_from_slice(&36_u32.to_le_bytes());
    data.extend_from_slice(b"CDDA");
    data.extend_from_slice(b"fmt ");
    data.extend_from_slice(&24_u32.to_le_bytes());
    data.extend_from_slice(&1_u16.to_le_bytes());
    data.extend_from_slice(&2_u16.to_le_bytes()); // track
    data.extend_from_slice(&0x1234_5678_u32.to_le_bytes());
    data.extend_from_slice(&150_u32.to_le_bytes());
    data.extend_from_slice(&750_u32.to_le_bytes());
    data.extend_from_slice(&[0_u8; 8]);
    data
}

fn minimal_vgm(total_samples: u32) -> Vec<u8> {
    let mut data = vec![0_u8; 0x40];
    data[0..4].copy_from_slice(b"Vgm ");
    data[4..8].copy_from_slice(&0x3C_u32.to_le_bytes());
    data[8..12].copy_from_slice(&0x0150_u32.to_le_bytes());
    data[0x18..0x1C].copy_from_slice(&total_samples.to_le_bytes());
    data
}

fn minimal_mod() -> Vec<u8> {
    let mut data = vec![0_u8; 1084 + 1024];
    data[0..8].copy_from_slice(b"dispatch");
    data[1080..1084].copy_from_slice(b"M.K.");
    data
}

fn minimal_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 22_050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
        for index in 0..256 {
            writer.write_sample((index * 16) as i16).expect("sample");
            writer.write_sample((index * -16) as i16).expect("sample");
        }
        writer.finalize().expect("finalize");
    }
    cursor.into_inner()
}

fn minimal_cdxa(sectors: usize) -> Vec<u8> {
    const SECTOR: usize = 2336;
    let data_len = sectors * SECTOR;
    let mut file = Vec::new();
    file.extend_from_slice(b"RIFF");
    file.extend_from_slice(&((4 + 8 + data_len) as u32).to_le_bytes());
    file.extend_from_slice(b"CDXA");
    file.extend_from_slice(b"data");
    file.extend_from_slice(&(data_len as u32).to_le_bytes());
    for _ in 0..sectors {
        let mut sector = vec![0_u8; SECTOR];
        sector[2] = 0x04; // audio submode
        sector[3] = 0x01; // stereo, 37.8 kHz
        sector[6] = sector[2];
        sector[7] = sector[3];
        file.extend_from_slice(&sector);
    }
    file
}

fn gzipped(payload: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(payload).expect("compress");
    encoder.finish().expect("finish")
}

#[test]
fn smf_dispatches_to_a_midi_session() {
    let config = ConfigContext::new();
    let song = open_song_mem(&minimal_smf(), MidiDevice::Standard, &config).expect("open");
    assert!(song.is_midi());
    // No system-MIDI output in this build: the standard device request is
    // substituted with the software synth.
    assert_eq!(song.device_type(), MidiDevice::SoftSynth);
    assert!(song.start(false, 0));
    assert!(song.is_playing());
}

#[test]
fn mus_dispatches_to_a_midi_session() {
    let config = ConfigContext::new();
    let song = open_song_mem(&minimal_mus(), MidiDevice::SoundFont, &config).expect("open");
    assert!(song.is_midi());
    assert_eq!(song.device_type(), MidiDevice::SoundFont);
}

#[test]
fn truncated_midi_payload_is_invalid() {
    let config = ConfigContext::new();
    let mut data = minimal_smf();
    data.truncate(16); // cuts into the MTrk chunk tag
    data.resize(32, 0); // keep the signature readable
    let result = open_song_mem(&data, MidiDevice::Default, &config);
    assert!(matches!(result, Err(OpenError::InvalidMidiData)));
    assert!(!aulos_lib::last_error().is_empty());
}

#[test]
fn cdda_dispatches_to_a_cd_session() {
    let config = ConfigContext::new();
    let song = open_song_mem(&minimal_cdda(), MidiDevice::Default, &config).expect("open");
    assert!(!song.is_midi());
    assert_eq!(song.device_type(), MidiDevice::Default);
    assert!(song.stats().contains("CDDA"));
}

#[test]
fn vgm_dispatches_to_the_game_music_backend() {
    let config = ConfigContext::new();
    let song = open_song_mem(&minimal_vgm(44_100), MidiDevice::Default, &config).expect("open");
    assert!(!song.is_midi());
    assert!(song.stats().contains("VGM"));
    let info = song.stream_info();
    assert_eq!(info.sample_rate, 44_100);
}

#[test]
fn gzipped_vgm_classifies_like_the_plain_file() {
    let config = ConfigContext::new();
    let plain = open_song_mem(&minimal_vgm(44_100), MidiDevice::Default, &config).expect("plain");
    let zipped = gzipped(&minimal_vgm(44_100));
    let unpacked = open_song_mem(&zipped, MidiDevice::Default, &config).expect("gzipped");

    assert_eq!(plain.is_midi(), unpacked.is_midi());
    assert_eq!(plain.device_type(), unpacked.device_type());
    assert_eq!(plain.stream_info(), unpacked.stream_info());
    assert_eq!(plain.stats(), unpacked.stats());
}

#[test]
fn corrupt_gzip_member_reports_decompression_error() {
    let config = ConfigContext::new();
    let mut member = gzipped(&minimal_vgm(44_100));
    let mid = member.len() / 2;
    member[mid] ^= 0xFF;
    member[mid + 1] ^= 0xFF;
    let result = open_song_mem(&member, MidiDevice::Default, &config);
    assert!(matches!(result, Err(OpenError::Decompression(_))));
}

#[cfg(feature = "opl")]
#[test]
fn dro_dispatches_to_the_opl_backend() {
    let mut data = Vec::new();
    data.extend_from_slice(b"DBRAWOPL");
    data.extend_from_slice(&2_u16.to_le_bytes());
    data.extend_from_slice(&0_u16.to_le_bytes());
    data.extend_from_slice(&2_u32.to_le_bytes()); // pairs
    data.extend_from_slice(&10_u32.to_le_bytes()); // ms
    data.extend_from_slice(&[0, 0, 0, 0xFE, 0xFF, 1, 0xB0]); // codemap
    data.extend_from_slice(&[0x00, 0x42, 0xFE, 9]);

    let config = ConfigContext::new();
    let song = open_song_mem(&data, MidiDevice::Default, &config).expect("open");
    assert!(!song.is_midi());
    assert!(song.stats().contains("DosboxDro"));
}

#[test]
fn tracker_module_dispatches_to_the_module_backend() {
    let config = ConfigContext::new();
    let song = open_song_mem(&minimal_mod(), MidiDevice::Default, &config).expect("open");
    assert!(!song.is_midi());
    assert!(song.stats().contains("dispatch")); // module title
}

#[test]
fn wav_falls_through_to_the_sample_backend() {
    let config = ConfigContext::new();
    let song = open_song_mem(&minimal_wav(), MidiDevice::Default, &config).expect("open");
    assert!(!song.is_midi());
    let info = song.stream_info();
    assert_eq!(info.sample_rate, 22_050);
    assert_eq!(info.channel_layout, aulos_lib::ChannelLayout::Stereo);

    assert!(song.start(false, 0));
    let mut buffer = vec![0_u8; 256];
    assert!(song.fill_stream(&mut buffer));
}

#[test]
fn xa_dispatches_and_streams_decoded_sectors() {
    let config = ConfigContext::new();
    let song = open_song_mem(&minimal_cdxa(2), MidiDevice::Default, &config).expect("open");
    assert!(!song.is_midi());
    assert_eq!(song.stream_info().sample_rate, 37_800);
    assert!(song.start(false, 0));
    let mut buffer = vec![0_u8; 512];
    assert!(song.fill_stream(&mut buffer));
}

#[test]
fn short_stream_fails_with_header_error() {
    let config = ConfigContext::new();
    let result = open_song_mem(&[1, 2, 3, 4, 5, 6, 7], MidiDevice::Default, &config);
    assert!(matches!(result, Err(OpenError::HeaderRead)));
    assert!(!aulos_lib::last_error().is_empty());
}

#[test]
fn garbage_stream_is_unidentified() {
    let config = ConfigContext::new();
    let data = vec![0xA5_u8; 256];
    let result = open_song_mem(&data, MidiDevice::Default, &config);
    assert!(matches!(result, Err(OpenError::Unidentified)));
}

#[test]
fn reader_is_closed_exactly_once_on_every_path() {
    let config = ConfigContext::new();

    // Success path through a non-claiming backend (MIDI).
    let (reader, closes) = CountingReader::new(minimal_smf());
    let song = open_song(reader, MidiDevice::Default, &config).expect("open");
    drop(song);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // Success path through the claiming sample backend.
    let (reader, closes) = CountingReader::new(minimal_wav());
    let song = open_song(reader, MidiDevice::Default, &config).expect("open");
    drop(song);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // Unidentified garbage: closed by the dispatcher.
    let (reader, closes) = CountingReader::new(vec![0xA5_u8; 256]);
    assert!(open_song(reader, MidiDevice::Default, &config).is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // Header failure: closed by the dispatcher.
    let (reader, closes) = CountingReader::new(vec![1, 2, 3]);
    assert!(open_song(reader, MidiDevice::Default, &config).is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // XA takes the reader unconditionally, including on failure.
    let mut broken = b"RIFF\x10\x00\x00\x00CDXA".to_vec();
    broken.extend_from_slice(b"fmt \x04\x00\x00\x00aaaa");
    broken.resize(64, 0);
    let (reader, closes) = CountingReader::new(broken);
    assert!(open_song(reader, MidiDevice::Default, &config).is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // XA success: the reader lives inside the session until it drops.
    let (reader, closes) = CountingReader::new(minimal_cdxa(1));
    let song = open_song(reader, MidiDevice::Default, &config).expect("open");
    assert_eq!(closes.load(Ordering::SeqCst), 0);
    drop(song);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn switchboard_pushes_live_settings_into_dispatched_sessions() {
    let mut config = ConfigContext::new();
    let song = open_song_mem(&minimal_smf(), MidiDevice::SoundFont, &config).expect("open");

    let key = aulos_lib::config::IntConfigKey::SoundFontPolyphony as u32;
    let (restart, resolved) = config.set_int(key, Some(&song), 5000);
    assert!(!restart);
    assert_eq!(resolved, 4096);
    assert!(song.stats().contains("synth.polyphony"));
}
