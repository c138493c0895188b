use crate::config::{SearchConfig, MAX_DRIVES, MAX_VOLTS};
use crate::curve::CalibrationCurve;
use crate::error::{Error, Result};
use crate::hardware::AnalogIo;
use heapless::Vec;

/// What the search is doing, reported after every sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Progress {
    /// Output at drive 0 has settled.
    Zero { reading: u16 },
    /// The drive was raised and the input resampled.
    Step {
        volts: u8,
        drive: u16,
        reading: u16,
        expected: f32,
    },
    /// `drive` reproduces `volts`.
    Accepted { volts: u8, drive: u16, reading: u16 },
}

/// Closed-loop search for the output drive values that reproduce each
/// integer voltage, with the input curve as reference.
///
/// The reading is assumed to rise with the drive value. Every target starts
/// from the drive value found for the previous one and raises it in steps
/// that shrink as the reading approaches the expected one. A target is
/// abandoned with [`Error::NonConvergentSearch`] once the drive ceiling or
/// the iteration cap is hit.
pub struct OutputSearch<'a> {
    curve: &'a CalibrationCurve,
    config: &'a SearchConfig,
}

impl<'a> OutputSearch<'a> {
    pub fn new(curve: &'a CalibrationCurve, config: &'a SearchConfig) -> Self {
        Self { curve, config }
    }

    /// Returns the drive values for 0 V up to `max_volts`.
    pub fn run<H, F>(
        &self,
        io: &mut H,
        max_volts: u8,
        mut progress: F,
    ) -> Result<Vec<u16, MAX_DRIVES>>
    where
        H: AnalogIo,
        F: FnMut(Progress) -> Result<()>,
    {
        if usize::from(max_volts) > MAX_VOLTS {
            return Err(Error::CapacityExceeded);
        }

        let mut drives = Vec::new();
        let mut drive = 0;

        io.drive(drive);
        io.settle(self.config.initial_settle_ms);
        let mut reading = io.sample()?;
        progress(Progress::Zero { reading })?;
        drives.push(drive).map_err(|_| Error::CapacityExceeded)?;

        for volts in 1..=max_volts {
            (drive, reading) = self.find(io, volts, drive, reading, &mut progress)?;

            log::info!("{} V: drive {} (reading {})", volts, drive, reading);
            drives.push(drive).map_err(|_| Error::CapacityExceeded)?;
            progress(Progress::Accepted {
                volts,
                drive,
                reading,
            })?;
            io.settle(self.config.target_pause_ms);
        }

        Ok(drives)
    }

    /// Raises `drive` from its current value until the input reaches the
    /// reading expected for `volts`. Returns the accepted drive value and
    /// its reading.
    pub fn find<H, F>(
        &self,
        io: &mut H,
        volts: u8,
        mut drive: u16,
        mut reading: u16,
        progress: &mut F,
    ) -> Result<(u16, u16)>
    where
        H: AnalogIo,
        F: FnMut(Progress) -> Result<()>,
    {
        let expected = self.curve.cv_to_reading(volts.into());
        let ceiling = match self.config.max_drive {
            Some(max_drive) => max_drive.min(io.max_drive()),
            None => io.max_drive(),
        };
        let mut iterations = 0;

        while !self.reached(reading, expected) {
            if iterations == self.config.max_iterations {
                log::error!("{} V: no convergence after {} steps", volts, iterations);
                return Err(Error::NonConvergentSearch { volts, drive });
            }

            let rule = self.config.rule_for(f32::from(reading) / expected);
            drive = match drive.checked_add(rule.step) {
                Some(next) if next <= ceiling => next,
                _ => {
                    log::error!("{} V: drive ceiling {} reached", volts, ceiling);
                    return Err(Error::NonConvergentSearch { volts, drive });
                }
            };

            io.drive(drive);
            if rule.settle_ms > 0 {
                io.settle(rule.settle_ms);
            }
            reading = io.sample()?;
            iterations += 1;

            log::debug!("{} V: drive {} reading {} / {}", volts, drive, reading, expected);
            progress(Progress::Step {
                volts,
                drive,
                reading,
                expected,
            })?;
        }

        Ok((drive, reading))
    }

    fn reached(&self, reading: u16, expected: f32) -> bool {
        expected - f32::from(reading) <= self.config.tolerance
    }
}
