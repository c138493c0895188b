use crate::config::MAX_POINTS;
use crate::error::{Error, Result};
use crate::interpolate::{interpolate, segment, slope};
use heapless::Vec;

/// Piecewise-linear mapping between raw input samples and voltages.
///
/// Built from the reference voltages applied during input calibration
/// (`points`) and the samples captured at each of them (`readings`). The
/// slope of the last segment is stored twice so readings above the last
/// point are extrapolated along it. Below the first point there is no
/// extrapolation.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationCurve {
    points: Vec<f32, MAX_POINTS>,
    readings: Vec<u16, MAX_POINTS>,
    gradients: Vec<f32, MAX_POINTS>,
    max_voltage: f32,
}

impl CalibrationCurve {
    /// Builds a curve, computing the gradient (volts per raw unit) of every
    /// segment.
    ///
    /// Fails with [`Error::DegenerateCalibration`] if a reading does not
    /// increase over the previous one, and with [`Error::InvalidSeries`] if
    /// the two slices differ in length, hold fewer than two entries, or the
    /// points are not strictly increasing.
    ///
    /// # Examples
    ///
    /// ```
    /// use cv_calibrator::CalibrationCurve;
    ///
    /// let curve = CalibrationCurve::build(&[0.0, 10.0], &[1000, 50000], 12.0).unwrap();
    ///
    /// assert_eq!(curve.reading_to_voltage(1000), 0.0);
    /// assert!((curve.reading_to_voltage(25500) - 5.0).abs() < 1e-3);
    /// ```
    pub fn build(points: &[f32], readings: &[u16], max_voltage: f32) -> Result<Self> {
        if points.len() != readings.len()
            || points.len() < 2
            || !points.windows(2).all(|w| w[0] < w[1])
        {
            return Err(Error::InvalidSeries);
        }

        let points: Vec<f32, MAX_POINTS> =
            Vec::from_slice(points).map_err(|_| Error::CapacityExceeded)?;
        let readings: Vec<u16, MAX_POINTS> =
            Vec::from_slice(readings).map_err(|_| Error::CapacityExceeded)?;

        let mut gradients: Vec<f32, MAX_POINTS> = Vec::new();
        for index in 0..readings.len() - 1 {
            let gradient = slope(
                readings[index].into(),
                readings[index + 1].into(),
                points[index],
                points[index + 1],
            )
            .ok_or_else(|| {
                log::warn!(
                    "readings {} and {} do not increase",
                    readings[index],
                    readings[index + 1]
                );
                Error::DegenerateCalibration { index }
            })?;
            gradients
                .push(gradient)
                .map_err(|_| Error::CapacityExceeded)?;
        }
        let last = gradients[gradients.len() - 1];
        gradients.push(last).map_err(|_| Error::CapacityExceeded)?;

        Ok(Self {
            points,
            readings,
            gradients,
            max_voltage,
        })
    }

    pub fn points(&self) -> &[f32] {
        &self.points
    }

    pub fn readings(&self) -> &[u16] {
        &self.readings
    }

    /// One gradient per point; the last one repeats the final segment.
    pub fn gradients(&self) -> &[f32] {
        &self.gradients
    }

    /// Converts a raw sample into a voltage, clamped to `0..=max_voltage`.
    pub fn reading_to_voltage(&self, raw: u16) -> f32 {
        let voltage = match segment(&self.readings, &raw) {
            None => 0.0,
            Some(index) => interpolate(
                self.readings[index].into(),
                self.points[index],
                self.gradients[index],
                raw.into(),
            ),
        };

        voltage.clamp(0.0, self.max_voltage)
    }

    /// Returns the raw sample expected for `voltage`.
    ///
    /// Voltages below the first point map to the first reading.
    pub fn cv_to_reading(&self, voltage: f32) -> f32 {
        match segment(&self.points, &voltage) {
            None => self.readings[0].into(),
            Some(index) => interpolate(
                self.points[index],
                self.readings[index].into(),
                1.0 / self.gradients[index],
                voltage,
            ),
        }
    }
}
