//! Calibration of an analog CV input and output for `no_std` targets.
//!
//! The operator applies a series of reference voltages to the input, which
//! yields a piecewise-linear [`CalibrationCurve`] from raw samples to volts.
//! With the output looped back into the input, the curve is then used as a
//! reference to find the drive value reproducing every integer voltage.
//!
//! The session is run by a [`Calibrator`] on top of any [`AnalogIo`]
//! (usually a [`Hardware`] context built from `embedded-hal` parts), a
//! [`Display`], [`Controls`] and a [`Storage`].

#![cfg_attr(not(test), no_std)]

mod config;
mod curve;
mod error;
mod hardware;
mod interpolate;
mod machine;
mod ports;
mod search;
mod workflow;

pub use config::{
    Config, Sampling, SearchConfig, StepRule, DEFAULT_SERIES, MAX_DRIVES, MAX_POINTS, MAX_VOLTS,
    SERIES_12, SERIES_2, SERIES_5,
};
pub use curve::CalibrationCurve;
pub use error::{Error, Result};
pub use hardware::{AnalogIo, Hardware};
pub use machine::{Handler, Machine, StateSpec};
pub use ports::{CalibrationArtifact, Controls, Display, Knob, Selection, Storage};
pub use search::{OutputSearch, Progress};
pub use workflow::{Calibrator, Event, State};
