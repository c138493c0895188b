//! Calibration errors.
//!
//! Every failure the engine can report is a small `Copy` value so it can be
//! stored by the workflow and rendered on the error screen later. Errors
//! coming from hardware or collaborators are logged where they happen and
//! mapped onto one of these variants.

use thiserror_no_std::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Two consecutive readings do not increase, so the slope between the
    /// points at `index` and `index + 1` cannot be computed.
    #[error("degenerate calibration data after point {index}")]
    DegenerateCalibration { index: usize },

    /// Points and readings differ in length, hold fewer than two entries, or
    /// the points are not strictly increasing.
    #[error("invalid calibration series")]
    InvalidSeries,

    /// The output search gave up on a target voltage.
    #[error("output search for {volts} V did not converge (drive {drive})")]
    NonConvergentSearch { volts: u8, drive: u16 },

    #[error("analog input could not be sampled")]
    Sample,

    #[error("display update failed")]
    Display,

    #[error("storage access failed")]
    Storage,

    /// A transition named a state that is missing from the table.
    #[error("state is not part of the state table")]
    UnknownState,

    #[error("state machine has not been started")]
    NotStarted,

    #[error("fixed capacity exceeded")]
    CapacityExceeded,
}

impl Error {
    /// Short text for the operator, fits one display line.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::DegenerateCalibration { .. } | Error::InvalidSeries => "Invalid data",
            Error::NonConvergentSearch { .. } => "No convergence",
            Error::Sample => "Sampling failed",
            Error::Display => "Display failed",
            Error::Storage => "Saving failed",
            Error::UnknownState | Error::NotStarted => "Internal error",
            Error::CapacityExceeded => "Too many points",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headlines_fit_a_display_line() {
        let errors = [
            Error::DegenerateCalibration { index: 3 },
            Error::InvalidSeries,
            Error::NonConvergentSearch { volts: 4, drive: 65000 },
            Error::Sample,
            Error::Display,
            Error::Storage,
            Error::UnknownState,
            Error::NotStarted,
            Error::CapacityExceeded,
        ];

        for error in errors {
            assert!(error.headline().len() <= 16, "{:?}", error);
        }
    }

    #[test]
    fn degenerate_message_names_the_point() {
        let message = format!("{}", Error::DegenerateCalibration { index: 2 });
        assert_eq!(message, "degenerate calibration data after point 2");
    }
}
