//! Collaborators the calibration workflow talks to.
//!
//! - **Display**: shows three centred lines of text
//! - **Controls**: reports the discretized position of the two knobs
//! - **Storage**: keeps the selected series and the calibration results

use crate::config::{MAX_DRIVES, MAX_POINTS};
use core::fmt;
use heapless::Vec;

/// One of the two continuous controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Knob {
    K1,
    K2,
}

pub trait Display {
    type Error: fmt::Debug;

    /// Replaces the screen content with up to three centred lines.
    fn show(&mut self, lines: [&str; 3]) -> Result<(), Self::Error>;
}

pub trait Controls {
    /// Position of `knob` split into `steps` detents, in `0..steps`.
    fn position(&mut self, knob: Knob, steps: u8) -> u8;
}

/// The small record kept across power cycles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub series: u8,
}

/// Everything the rest of the firmware needs at boot.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationArtifact {
    /// Reference voltages, as fine-tuned during input calibration.
    pub points: Vec<f32, MAX_POINTS>,
    /// Raw sample captured at each point.
    pub readings: Vec<u16, MAX_POINTS>,
    /// Output drive per integer volt, starting at 0 V.
    pub output_drives: Vec<u16, MAX_DRIVES>,
}

pub trait Storage {
    type Error: fmt::Debug;

    fn load_selection(&mut self) -> Result<Option<Selection>, Self::Error>;

    fn save_selection(&mut self, selection: &Selection) -> Result<(), Self::Error>;

    /// Persists the input calibration as soon as it is complete.
    fn save_input(&mut self, points: &[f32], readings: &[u16]) -> Result<(), Self::Error>;

    /// Persists the complete calibration.
    fn save_artifact(&mut self, artifact: &CalibrationArtifact) -> Result<(), Self::Error>;
}
