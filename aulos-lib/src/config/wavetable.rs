//! Shared wavetable-synth state.
//!
//! The wavetable renderer keeps one set of tuning variables for every
//! session of that device type and is not reentrant: a render thread may be
//! reading these while the switchboard writes them. All access therefore
//! goes through this handle's own lock, which is distinct from any
//! per-session lock.

use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct WavetableState {
    pub modulation_wheel: bool,
    pub portamento: bool,
    /// Packed reverb mode/level, see [`pack_reverb`].
    pub reverb: i32,
    pub chorus: bool,
    pub surround_chorus: bool,
    pub key_adjust: i32,
    pub tempo_adjust: f64,
    pub min_sustain_time: f64,
    pub drum_power: f64,
    pub config_path: String,
}

impl Default for WavetableState {
    fn default() -> Self {
        Self {
            modulation_wheel: true,
            portamento: false,
            reverb: 0,
            chorus: false,
            surround_chorus: false,
            key_adjust: 0,
            tempo_adjust: 1.0,
            min_sustain_time: 5000.0,
            drum_power: 1.0,
            config_path: String::new(),
        }
    }
}

/// Cloneable handle over the shared state.
#[derive(Clone, Default)]
pub struct WavetableHandle {
    state: Arc<Mutex<WavetableState>>,
}

impl WavetableHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the shared state under its lock.
    pub fn update(&self, apply: impl FnOnce(&mut WavetableState)) {
        let mut state = self.state.lock().unwrap();
        apply(&mut state);
    }

    /// Copy of the current state, for render-side consumers.
    pub fn snapshot(&self) -> WavetableState {
        self.state.lock().unwrap().clone()
    }
}

/// Recombine the two legacy reverb knobs into the renderer's packed value.
///
/// Mode 0 is off, modes 1 through 4 select the reverb strategy, and the
/// magnitude carries the level in a fixed linear banding:
/// `(mode - 1) * -128 - level`. A zero level falls back to the bare mode.
pub fn pack_reverb(mode: i32, level: i32) -> i32 {
    if mode == 0 || level == 0 {
        mode
    } else {
        (mode - 1) * -128 - level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_reverb_bands() {
        assert_eq!(pack_reverb(0, 10), 0);
        assert_eq!(pack_reverb(0, 0), 0);
        assert_eq!(pack_reverb(2, 10), -138);
        assert_eq!(pack_reverb(1, 1), -1);
        assert_eq!(pack_reverb(1, 127), -127);
        assert_eq!(pack_reverb(4, 1), -385);
        assert_eq!(pack_reverb(3, 0), 3);
    }

    #[test]
    fn updates_are_visible_through_snapshots() {
        let handle = WavetableHandle::new();
        handle.update(|state| state.key_adjust = -12);
        assert_eq!(handle.snapshot().key_adjust, -12);

        let other = handle.clone();
        other.update(|state| state.chorus = true);
        assert!(handle.snapshot().chorus);
    }
}
