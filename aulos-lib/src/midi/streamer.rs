//! Session wrapper for MIDI-family sources.
//!
//! Sequencing and synthesis live behind the configured device; this wrapper
//! owns the validated payload, tracks transport state, and keeps the most
//! recent live setting pushes so hosts can inspect what reached the device.

use std::collections::HashMap;

use log::debug;
use serde_json::json;

use crate::config::ConfigContext;
use crate::midi::MidiSource;
use crate::session::{
    ChannelLayout, MidiDevice, SampleFormat, Session, SessionError, StreamInfo,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Int(i32),
    Num(f64),
    Text(String),
}

pub struct MidiStreamer {
    source: MidiSource,
    device: MidiDevice,
    output_rate: u32,
    buffer_size: u32,
    looping: bool,
    playing: bool,
    paused: bool,
    subsong: i32,
    settings: HashMap<String, SettingValue>,
}

impl MidiStreamer {
    pub fn new(source: MidiSource, device: MidiDevice, config: &ConfigContext) -> Self {
        Self {
            source,
            device,
            output_rate: config.misc.output_rate.max(1) as u32,
            buffer_size: stream_buffer_bytes(config),
            looping: false,
            playing: false,
            paused: false,
            subsong: 0,
            settings: HashMap::new(),
        }
    }

    /// The most recent live push for `name`, if any reached this session.
    pub fn last_setting(&self, name: &str) -> Option<&SettingValue> {
        self.settings.get(name)
    }
}

pub(crate) fn stream_buffer_bytes(config: &ConfigContext) -> u32 {
    // The configured size is in KiB, already clamped by the switchboard.
    (config.misc.stream_buffer_size.clamp(16, 1024) as u32) * 1024
}

impl Session for MidiStreamer {
    fn play(&mut self, looping: bool, subsong: i32) -> Result<(), SessionError> {
        if subsong < 0 || subsong as u32 >= self.source.subsong_count() {
            return Err(SessionError::new(format!(
                "subsong {} out of range (0..{})",
                subsong,
                self.source.subsong_count()
            )));
        }
        self.looping = looping;
        self.subsong = subsong;
        self.playing = true;
        self.paused = false;
        debug!(
            "starting {:?} MIDI playback on {:?}, subsong {}",
            self.source.kind(),
            self.device,
            subsong
        );
        Ok(())
    }

    fn pause(&mut self) {
        if self.playing {
            self.paused = true;
        }
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.paused = false;
    }

    fn service_stream(&mut self, buffer: &mut [u8]) -> bool {
        // The device renders into the host mix; the stream slot carries
        // silence while the sequencer is driving.
        buffer.fill(0);
        self.playing
    }

    fn is_playing(&self) -> bool {
        self.playing && !self.paused
    }

    fn set_subsong(&mut self, subsong: i32) -> bool {
        if subsong < 0 || subsong as u32 >= self.source.subsong_count() {
            return false;
        }
        self.subsong = subsong;
        true
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn device_type(&self) -> MidiDevice {
        self.device
    }

    fn is_midi(&self) -> bool {
        true
    }

    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            buffer_size: self.buffer_size,
            sample_rate: self.output_rate,
            sample_format: SampleFormat::Float32,
            channel_layout: ChannelLayout::Stereo,
        }
    }

    fn change_setting_int(&mut self, name: &str, value: i32) {
        self.settings
            .insert(name.to_string(), SettingValue::Int(value));
    }

    fn change_setting_num(&mut self, name: &str, value: f64) {
        self.settings
            .insert(name.to_string(), SettingValue::Num(value));
    }

    fn change_setting_string(&mut self, name: &str, value: &str) {
        self.settings
            .insert(name.to_string(), SettingValue::Text(value.to_string()));
    }

    fn stats(&self) -> String {
        let settings: serde_json::Map<String, serde_json::Value> = self
            .settings
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    SettingValue::Int(v) => json!(v),
                    SettingValue::Num(v) => json!(v),
                    SettingValue::Text(v) => json!(v),
                };
                (name.clone(), value)
            })
            .collect();
        json!({
            "kind": format!("{:?}", self.source.kind()),
            "device": self.device.id(),
            "bytes": self.source.data().len(),
            "subsong": self.subsong,
            "subsongs": self.source.subsong_count(),
            "settings": settings,
        })
        .to_string()
    }

    fn is_valid(&self) -> bool {
        // Construction already validated the payload.
        !self.source.data().is_empty()
    }
}
