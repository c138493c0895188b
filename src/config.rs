/// Largest number of calibration points in a series.
pub const MAX_POINTS: usize = 16;

/// Highest integer voltage the output can be calibrated for.
pub const MAX_VOLTS: usize = 12;

/// Number of output drive values in a complete artifact (0 V up to
/// [`MAX_VOLTS`]).
pub const MAX_DRIVES: usize = MAX_VOLTS + 1;

pub const SERIES_2: &[f32] = &[0.0, 10.0];
pub const SERIES_5: &[f32] = &[0.0, 2.5, 5.0, 7.5, 10.0];
pub const SERIES_12: &[f32] = &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0];

pub const DEFAULT_SERIES: &[&[f32]] = &[SERIES_2, SERIES_5, SERIES_12];

/// Configuration for a calibration session.
///
/// - `series`: The selectable sets of reference voltages, each strictly increasing
/// - `max_voltage`: Upper clamp for voltages computed from readings (V)
/// - `selection_write_interval_ms`: Minimum time between two writes of the selected series
/// - `refresh_interval_ms`: Idle redraw period while the live sample is shown
/// - `knob_steps`: Number of detents a knob is discretized into
///
/// # Examples
///
/// ```
/// use cv_calibrator::{Config, SearchConfig};
///
/// let config = Config {
///     series: &[&[0.0, 5.0, 10.0]],
///     search: SearchConfig {
///         max_iterations: 500,
///         ..SearchConfig::default()
///     },
///     ..Config::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    pub series: &'static [&'static [f32]],
    pub max_voltage: f32,
    pub selection_write_interval_ms: u32,
    pub refresh_interval_ms: u16,
    pub knob_steps: u8,
    pub sampling: Sampling,
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            series: DEFAULT_SERIES,
            max_voltage: 12.0,
            selection_write_interval_ms: 500,
            refresh_interval_ms: 200,
            knob_steps: 10,
            sampling: Sampling::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    /// Returns the reference voltages of series `index`, if it exists.
    pub fn series(&self, index: usize) -> Option<&'static [f32]> {
        self.series.get(index).copied()
    }
}

/// How a single sample is built from raw conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sampling {
    /// Raw conversions averaged into one sample.
    pub oversampling: u16,
    /// Applied to every raw conversion; clears the bits that are only noise.
    pub noise_mask: u16,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            oversampling: 256,
            noise_mask: 0xff80,
        }
    }
}

/// Step taken by the output search while `reading / expected` is below
/// `ratio_below`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepRule {
    pub ratio_below: f32,
    pub step: u16,
    pub settle_ms: u16,
}

impl StepRule {
    pub const fn new(ratio_below: f32, step: u16, settle_ms: u16) -> Self {
        Self {
            ratio_below,
            step,
            settle_ms,
        }
    }
}

/// Tuning of the output search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    /// Checked in order; the first rule whose `ratio_below` exceeds the
    /// current ratio wins.
    pub rules: [StepRule; 4],
    /// Used once the ratio is above every rule.
    pub final_rule: StepRule,
    /// A reading this far below the expected reading is accepted (raw units).
    pub tolerance: f32,
    pub initial_settle_ms: u16,
    pub target_pause_ms: u16,
    /// Drive adjustments allowed for one target voltage.
    pub max_iterations: u32,
    /// Highest drive value tried; `None` uses the output's maximum.
    pub max_drive: Option<u16>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rules: [
                StepRule::new(0.50, 1000, 0),
                StepRule::new(0.80, 200, 0),
                StepRule::new(0.95, 100, 0),
                StepRule::new(0.99, 20, 100),
            ],
            final_rule: StepRule::new(f32::INFINITY, 10, 200),
            tolerance: 0.002,
            initial_settle_ms: 500,
            target_pause_ms: 1000,
            max_iterations: 10_000,
            max_drive: None,
        }
    }
}

impl SearchConfig {
    /// Picks the step for the given `reading / expected` ratio.
    pub fn rule_for(&self, ratio: f32) -> StepRule {
        self.rules
            .iter()
            .copied()
            .find(|rule| ratio < rule.ratio_below)
            .unwrap_or(self.final_rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_series_are_strictly_increasing() {
        for series in DEFAULT_SERIES {
            assert!(series.len() >= 2 && series.len() <= MAX_POINTS);
            assert!(series.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn series_lookup() {
        let config = Config::default();
        assert_eq!(config.series(1), Some(SERIES_5));
        assert_eq!(config.series(3), None);
    }

    #[test]
    fn rules_go_from_coarse_to_fine() {
        let search = SearchConfig::default();

        assert_eq!(search.rule_for(0.3), StepRule::new(0.50, 1000, 0));
        assert_eq!(search.rule_for(0.6), StepRule::new(0.80, 200, 0));
        assert_eq!(search.rule_for(0.85), StepRule::new(0.95, 100, 0));
        assert_eq!(search.rule_for(0.97), StepRule::new(0.99, 20, 100));
        assert_eq!(search.rule_for(0.995).step, 10);
        assert_eq!(search.rule_for(0.995).settle_ms, 200);
    }

    #[test]
    fn thresholds_are_exclusive() {
        let search = SearchConfig::default();
        assert_eq!(search.rule_for(0.5).step, 200);
        assert_eq!(search.rule_for(0.99).step, 10);
    }
}
