//! The typed configuration switchboard.
//!
//! Settings are addressed by stable integer keys in three disjoint
//! namespaces (integer, float, string). A write clamps or rounds the value,
//! best-effort pushes it into the active session, stores it, and reports
//! whether the active device type needs a restart to fully honor the
//! change. None of these outcomes are errors: an unknown key simply returns
//! `false` with no side effect.
//!
//! State lives in an explicit [`ConfigContext`] rather than ambient
//! globals, so hosts (and tests) can run independent contexts side by side.

pub mod wavetable;

use serde::Serialize;

use crate::session::{MidiDevice, SongHandle};
use wavetable::{pack_reverb, WavetableHandle};

/// Integer-valued keys. Identifiers start at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntConfigKey {
    SoundFontReverb = 0,
    SoundFontChorus = 1,
    SoundFontPolyphony = 2,
    SoundFontInterp = 3,
    SoundFontSampleRate = 4,
    SoundFontChorusVoices = 5,
    SoundFontChorusType = 6,
    FmSynthChips = 7,
    FmSynthCore = 8,
    FmSynthFullPan = 9,
    WavetableModulationWheel = 10,
    WavetablePortamento = 11,
    WavetableReverb = 12,
    WavetableReverbLevel = 13,
    WavetableChorus = 14,
    WavetableSurroundChorus = 15,
    WavetableKeyAdjust = 16,
    ModSampleRate = 17,
    ModVolumeRamp = 18,
    ModInterp = 19,
    SndStreamBufferSize = 20,
    SndMidiDevice = 21,
    SndOutputRate = 22,
    SndMidiPrecache = 23,
}

/// Float-valued keys. Identifiers start at 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatConfigKey {
    SoundFontGain = 1000,
    SoundFontReverbRoomSize = 1001,
    SoundFontReverbDamping = 1002,
    SoundFontReverbWidth = 1003,
    SoundFontReverbLevel = 1004,
    SoundFontChorusLevel = 1005,
    SoundFontChorusSpeed = 1006,
    SoundFontChorusDepth = 1007,
    WavetableDrumPower = 1008,
    WavetableTempoAdjust = 1009,
    WavetableMinSustain = 1010,
    GmeStereoDepth = 1011,
    ModMasterVolume = 1012,
    SndMusicVolume = 1013,
    SndRelativeVolume = 1014,
    SndMasterVolume = 1015,
}

/// String-valued keys. Identifiers start at 2000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringConfigKey {
    SoundFontPatchSet = 2000,
    WavetableConfig = 2001,
    FmSynthBank = 2002,
}

impl IntConfigKey {
    pub fn from_raw(raw: u32) -> Option<Self> {
        use IntConfigKey::*;
        Some(match raw {
            0 => SoundFontReverb,
            1 => SoundFontChorus,
            2 => SoundFontPolyphony,
            3 => SoundFontInterp,
            4 => SoundFontSampleRate,
            5 => SoundFontChorusVoices,
            6 => SoundFontChorusType,
            7 => FmSynthChips,
            8 => FmSynthCore,
            9 => FmSynthFullPan,
            10 => WavetableModulationWheel,
            11 => WavetablePortamento,
            12 => WavetableReverb,
            13 => WavetableReverbLevel,
            14 => WavetableChorus,
            15 => WavetableSurroundChorus,
            16 => WavetableKeyAdjust,
            17 => ModSampleRate,
            18 => ModVolumeRamp,
            19 => ModInterp,
            20 => SndStreamBufferSize,
            21 => SndMidiDevice,
            22 => SndOutputRate,
            23 => SndMidiPrecache,
            _ => return None,
        })
    }
}

impl FloatConfigKey {
    pub fn from_raw(raw: u32) -> Option<Self> {
        use FloatConfigKey::*;
        Some(match raw {
            1000 => SoundFontGain,
            1001 => SoundFontReverbRoomSize,
            1002 => SoundFontReverbDamping,
            1003 => SoundFontReverbWidth,
            1004 => SoundFontReverbLevel,
            1005 => SoundFontChorusLevel,
            1006 => SoundFontChorusSpeed,
            1007 => SoundFontChorusDepth,
            1008 => WavetableDrumPower,
            1009 => WavetableTempoAdjust,
            1010 => WavetableMinSustain,
            1011 => GmeStereoDepth,
            1012 => ModMasterVolume,
            1013 => SndMusicVolume,
            1014 => SndRelativeVolume,
            1015 => SndMasterVolume,
            _ => return None,
        })
    }
}

impl StringConfigKey {
    pub fn from_raw(raw: u32) -> Option<Self> {
        use StringConfigKey::*;
        Some(match raw {
            2000 => SoundFontPatchSet,
            2001 => WavetableConfig,
            2002 => FmSynthBank,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SoundFontConfig {
    pub reverb: bool,
    pub chorus: bool,
    pub polyphony: i32,
    pub interp: i32,
    pub samplerate: i32,
    pub chorus_voices: i32,
    pub chorus_type: i32,
    pub gain: f32,
    pub reverb_roomsize: f32,
    pub reverb_damping: f32,
    pub reverb_width: f32,
    pub reverb_level: f32,
    pub chorus_level: f32,
    pub chorus_speed: f32,
    pub chorus_depth: f32,
    pub patchset: String,
}

impl Default for SoundFontConfig {
    fn default() -> Self {
        Self {
            reverb: false,
            chorus: false,
            polyphony: 128,
            interp: 1,
            samplerate: 0,
            chorus_voices: 3,
            chorus_type: 0,
            gain: 0.5,
            reverb_roomsize: 0.75,
            reverb_damping: 0.23,
            reverb_width: 0.75,
            reverb_level: 0.57,
            chorus_level: 1.2,
            chorus_speed: 0.3,
            chorus_depth: 8.0,
            patchset: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FmSynthConfig {
    pub chips: i32,
    pub core: i32,
    pub fullpan: bool,
    pub bank: String,
}

impl Default for FmSynthConfig {
    fn default() -> Self {
        Self {
            chips: 2,
            core: 0,
            fullpan: true,
            bank: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModConfig {
    pub samplerate: i32,
    pub volume_ramp: i32,
    pub interp: i32,
    pub master_volume: f32,
}

impl Default for ModConfig {
    fn default() -> Self {
        Self {
            samplerate: 0,
            volume_ramp: 2,
            interp: 2,
            master_volume: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MiscConfig {
    pub stream_buffer_size: i32,
    pub midi_device: i32,
    pub output_rate: i32,
    pub midi_precache: bool,
    pub music_volume: f32,
    pub relative_volume: f32,
    pub master_volume: f32,
    pub gme_stereo_depth: f32,
}

impl Default for MiscConfig {
    fn default() -> Self {
        Self {
            stream_buffer_size: 64,
            midi_device: 0,
            output_rate: 44_100,
            midi_precache: true,
            music_volume: 1.0,
            relative_volume: 1.0,
            master_volume: 1.0,
            gme_stereo_depth: 0.0,
        }
    }
}

/// Process-scoped configuration state, mutated only through the switchboard.
#[derive(Default)]
pub struct ConfigContext {
    pub soundfont: SoundFontConfig,
    pub fmsynth: FmSynthConfig,
    pub modplay: ModConfig,
    pub misc: MiscConfig,
    wavetable: WavetableHandle,
    wavetable_reverb_mode: i32,
    wavetable_reverb_level: i32,
}

impl ConfigContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the wavetable synth state, for render consumers.
    pub fn wavetable(&self) -> WavetableHandle {
        self.wavetable.clone()
    }

    /// Set an integer-valued key.
    ///
    /// Returns the restart-required flag and the value after clamping. The
    /// flag is not an error: it reports that the active session's device
    /// needs a reload to fully honor the change. Unknown keys return
    /// `(false, value)` untouched.
    pub fn set_int(&mut self, key: u32, song: Option<&SongHandle>, value: i32) -> (bool, i32) {
        use IntConfigKey::*;
        let key = match IntConfigKey::from_raw(key) {
            Some(key) => key,
            None => return (false, value),
        };
        let device = device_type(song);
        match key {
            SoundFontReverb => {
                push_int(song, "synth.reverb.active", value);
                self.soundfont.reverb = value != 0;
                (false, value)
            }
            SoundFontChorus => {
                push_int(song, "synth.chorus.active", value);
                self.soundfont.chorus = value != 0;
                (false, value)
            }
            SoundFontPolyphony => {
                let value = value.clamp(16, 4096);
                push_int(song, "synth.polyphony", value);
                self.soundfont.polyphony = value;
                (false, value)
            }
            SoundFontInterp => {
                // Only four interpolation orders exist; round undefined
                // values to the nearest valid one.
                let value = match value {
                    i32::MIN..=0 => 0,
                    1 | 2 => 1,
                    3..=5 => 4,
                    _ => 7,
                };
                push_int(song, "synth.interpolation", value);
                self.soundfont.interp = value;
                (false, value)
            }
            SoundFontSampleRate => {
                // Only takes effect on the next load.
                let value = value.max(0);
                self.soundfont.samplerate = value;
                (false, value)
            }
            SoundFontChorusVoices => {
                let value = value.clamp(0, 99);
                push_num(song, "synth.chorus.voices", value as f64);
                self.soundfont.chorus_voices = value;
                (false, value)
            }
            SoundFontChorusType => {
                let value = if value == 0 || value == 1 { value } else { 0 };
                push_num(song, "synth.chorus.type", value as f64);
                self.soundfont.chorus_type = value;
                (false, value)
            }
            FmSynthChips => {
                let value = value.clamp(1, 8);
                push_int(song, "fm.chips", value);
                self.fmsynth.chips = value;
                (false, value)
            }
            FmSynthCore => {
                let value = value.clamp(0, 3);
                self.fmsynth.core = value;
                (device == MidiDevice::FmSynth, value)
            }
            FmSynthFullPan => {
                self.fmsynth.fullpan = value != 0;
                (false, value)
            }
            WavetableModulationWheel => {
                self.wavetable.update(|state| state.modulation_wheel = value != 0);
                (false, value)
            }
            WavetablePortamento => {
                self.wavetable.update(|state| state.portamento = value != 0);
                (false, value)
            }
            WavetableReverb => {
                let value = if (0..=4).contains(&value) { value } else { 0 };
                self.wavetable_reverb_mode = value;
                self.apply_wavetable_reverb();
                (false, value)
            }
            WavetableReverbLevel => {
                let value = if (0..=127).contains(&value) { value } else { 0 };
                self.wavetable_reverb_level = value;
                self.apply_wavetable_reverb();
                (false, value)
            }
            WavetableChorus => {
                self.wavetable.update(|state| state.chorus = value != 0);
                (false, value)
            }
            WavetableSurroundChorus => {
                self.wavetable.update(|state| state.surround_chorus = value != 0);
                (device == MidiDevice::Wavetable, value)
            }
            WavetableKeyAdjust => {
                let value = value.clamp(-24, 24);
                self.wavetable.update(|state| state.key_adjust = value);
                (false, value)
            }
            ModSampleRate => {
                self.modplay.samplerate = value;
                (false, value)
            }
            ModVolumeRamp => {
                self.modplay.volume_ramp = value;
                (false, value)
            }
            ModInterp => {
                self.modplay.interp = value;
                (false, value)
            }
            SndStreamBufferSize => {
                let value = value.clamp(16, 1024);
                self.misc.stream_buffer_size = value;
                (false, value)
            }
            SndMidiDevice => {
                let changed = self.misc.midi_device != value;
                self.misc.midi_device = value;
                (changed, value)
            }
            SndOutputRate => {
                self.misc.output_rate = value;
                (false, value)
            }
            SndMidiPrecache => {
                self.misc.midi_precache = value != 0;
                (false, value)
            }
        }
    }

    /// Set a float-valued key. Same contract as [`set_int`](Self::set_int).
    pub fn set_float(&mut self, key: u32, song: Option<&SongHandle>, value: f32) -> (bool, f32) {
        use FloatConfigKey::*;
        let key = match FloatConfigKey::from_raw(key) {
            Some(key) => key,
            None => return (false, value),
        };
        match key {
            SoundFontGain => {
                let value = value.clamp(0.0, 10.0);
                push_num(song, "synth.gain", value as f64);
                self.soundfont.gain = value;
                (false, value)
            }
            SoundFontReverbRoomSize => {
                let value = value.clamp(0.0, 1.2);
                push_num(song, "synth.reverb", value as f64);
                self.soundfont.reverb_roomsize = value;
                (false, value)
            }
            SoundFontReverbDamping => {
                let value = value.clamp(0.0, 1.0);
                push_num(song, "synth.reverb", value as f64);
                self.soundfont.reverb_damping = value;
                (false, value)
            }
            SoundFontReverbWidth => {
                let value = value.clamp(0.0, 100.0);
                push_num(song, "synth.reverb", value as f64);
                self.soundfont.reverb_width = value;
                (false, value)
            }
            SoundFontReverbLevel => {
                let value = value.clamp(0.0, 1.0);
                push_num(song, "synth.reverb", value as f64);
                self.soundfont.reverb_level = value;
                (false, value)
            }
            SoundFontChorusLevel => {
                let value = value.clamp(0.0, 1.0);
                push_num(song, "synth.chorus", value as f64);
                self.soundfont.chorus_level = value;
                (false, value)
            }
            SoundFontChorusSpeed => {
                let value = value.clamp(0.29, 5.0);
                push_num(song, "synth.chorus", value as f64);
                self.soundfont.chorus_speed = value;
                (false, value)
            }
            SoundFontChorusDepth => {
                // Depth is in milliseconds; the usable ceiling depends on
                // the sample rate, 21 is safe everywhere.
                let value = value.clamp(0.0, 21.0);
                push_num(song, "synth.chorus", value as f64);
                self.soundfont.chorus_depth = value;
                (false, value)
            }
            WavetableDrumPower => {
                let value = value.clamp(0.0, 30.0);
                self.wavetable.update(|state| state.drum_power = value as f64);
                (false, value)
            }
            WavetableTempoAdjust => {
                let value = value.clamp(0.25, 10.0);
                self.wavetable.update(|state| state.tempo_adjust = value as f64);
                (false, value)
            }
            WavetableMinSustain => {
                let value = value.max(0.0);
                self.wavetable
                    .update(|state| state.min_sustain_time = value as f64);
                (false, value)
            }
            GmeStereoDepth => {
                push_num(song, "gme.stereodepth", value as f64);
                self.misc.gme_stereo_depth = value;
                (false, value)
            }
            ModMasterVolume => {
                let value = value.max(0.0);
                self.modplay.master_volume = value;
                (false, value)
            }
            SndMusicVolume => {
                self.misc.music_volume = value;
                (false, value)
            }
            SndRelativeVolume => {
                self.misc.relative_volume = value;
                (false, value)
            }
            SndMasterVolume => {
                self.misc.master_volume = value;
                (false, value)
            }
        }
    }

    /// Set a string-valued key. Returns only the restart-required flag.
    pub fn set_string(&mut self, key: u32, song: Option<&SongHandle>, value: &str) -> bool {
        use StringConfigKey::*;
        let key = match StringConfigKey::from_raw(key) {
            Some(key) => key,
            None => return false,
        };
        let device = device_type(song);
        match key {
            SoundFontPatchSet => {
                self.soundfont.patchset = value.to_string();
                // The wavetable synth falls back to the same patch set when
                // it has no configuration of its own.
                self.wavetable.update(|state| {
                    if state.config_path.is_empty() {
                        state.config_path = value.to_string();
                    }
                });
                device == MidiDevice::SoundFont
            }
            WavetableConfig => {
                self.wavetable
                    .update(|state| state.config_path = value.to_string());
                device == MidiDevice::Wavetable
            }
            FmSynthBank => {
                self.fmsynth.bank = value.to_string();
                device == MidiDevice::FmSynth
            }
        }
    }

    fn apply_wavetable_reverb(&mut self) {
        let packed = pack_reverb(self.wavetable_reverb_mode, self.wavetable_reverb_level);
        self.wavetable.update(|state| state.reverb = packed);
    }
}

fn device_type(song: Option<&SongHandle>) -> MidiDevice {
    song.map(|song| song.device_type())
        .unwrap_or(MidiDevice::Default)
}

fn push_int(song: Option<&SongHandle>, name: &str, value: i32) {
    if let Some(song) = song {
        song.change_setting_int(name, value);
    }
}

fn push_num(song: Option<&SongHandle>, name: &str, value: f64) {
    if let Some(song) = song {
        song.change_setting_num(name, value);
    }
}

/// Value type of a setting, for the enumeration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SettingKind {
    Int,
    Bool,
    Float,
    Text,
}

/// One row of the settings enumeration.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Setting {
    pub name: &'static str,
    pub identifier: u32,
    pub kind: SettingKind,
    pub default: f64,
}

const fn setting(name: &'static str, identifier: u32, kind: SettingKind, default: f64) -> Setting {
    Setting {
        name,
        identifier,
        kind,
        default,
    }
}

/// Ordered enumeration of every known key, for hosts building generic
/// settings UIs. The list ends with an all-zero sentinel entry.
pub fn settings_table() -> &'static [Setting] {
    use SettingKind::*;
    const TABLE: &[Setting] = &[
        setting("aulos_soundfont_reverb", 0, Bool, 0.0),
        setting("aulos_soundfont_chorus", 1, Bool, 0.0),
        setting("aulos_soundfont_polyphony", 2, Int, 128.0),
        setting("aulos_soundfont_interp", 3, Int, 1.0),
        setting("aulos_soundfont_samplerate", 4, Int, 0.0),
        setting("aulos_soundfont_chorus_voices", 5, Int, 3.0),
        setting("aulos_soundfont_chorus_type", 6, Int, 0.0),
        setting("aulos_fmsynth_chips", 7, Int, 2.0),
        setting("aulos_fmsynth_core", 8, Int, 0.0),
        setting("aulos_fmsynth_fullpan", 9, Bool, 1.0),
        setting("aulos_wavetable_modulation_wheel", 10, Bool, 1.0),
        setting("aulos_wavetable_portamento", 11, Bool, 0.0),
        setting("aulos_wavetable_reverb", 12, Int, 0.0),
        setting("aulos_wavetable_reverb_level", 13, Int, 0.0),
        setting("aulos_wavetable_chorus", 14, Bool, 0.0),
        setting("aulos_wavetable_surround_chorus", 15, Bool, 0.0),
        setting("aulos_wavetable_key_adjust", 16, Int, 0.0),
        setting("aulos_mod_samplerate", 17, Int, 0.0),
        setting("aulos_mod_volramp", 18, Int, 2.0),
        setting("aulos_mod_interp", 19, Int, 2.0),
        setting("aulos_snd_streambuffersize", 20, Int, 64.0),
        setting("aulos_snd_mididevice", 21, Int, 0.0),
        setting("aulos_snd_outputrate", 22, Int, 44100.0),
        setting("aulos_snd_midiprecache", 23, Bool, 1.0),
        setting("aulos_soundfont_gain", 1000, Float, 0.5),
        setting("aulos_soundfont_reverb_roomsize", 1001, Float, 0.75),
        setting("aulos_soundfont_reverb_damping", 1002, Float, 0.23),
        setting("aulos_soundfont_reverb_width", 1003, Float, 0.75),
        setting("aulos_soundfont_reverb_level", 1004, Float, 0.57),
        setting("aulos_soundfont_chorus_level", 1005, Float, 1.2),
        setting("aulos_soundfont_chorus_speed", 1006, Float, 0.3),
        setting("aulos_soundfont_chorus_depth", 1007, Float, 8.0),
        setting("aulos_wavetable_drum_power", 1008, Float, 1.0),
        setting("aulos_wavetable_tempo_adjust", 1009, Float, 1.0),
        setting("aulos_wavetable_min_sustain", 1010, Float, 5000.0),
        setting("aulos_gme_stereo_depth", 1011, Float, 0.0),
        setting("aulos_mod_master_volume", 1012, Float, 1.0),
        setting("aulos_snd_musicvolume", 1013, Float, 1.0),
        setting("aulos_snd_relative_volume", 1014, Float, 1.0),
        setting("aulos_snd_mastervolume", 1015, Float, 1.0),
        setting("aulos_soundfont_patchset", 2000, Text, 0.0),
        setting("aulos_wavetable_config", 2001, Text, 0.0),
        setting("aulos_fmsynth_bank", 2002, Text, 0.0),
        // Sentinel.
        setting("", 0, Int, 0.0),
    ];
    TABLE
}
