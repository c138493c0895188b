//! The calibration session as seen by the operator.
//!
//! Input calibration walks through the reference voltages of the selected
//! series: the operator applies each voltage (fine-tuning the value with the
//! knobs if their source is not exact), confirms, and the sample is recorded.
//! The readings become a [`CalibrationCurve`], which then serves as the
//! reference for the automatic output calibration.
//!
//! ```text
//! start -> power_reminder -> current_point <-> result -> input_done
//!                                                            |
//!                                    all_done <- start_output
//! ```
//!
//! Any failing step leads to `error`; confirming `all_done` or `error`
//! starts over.

use crate::config::{Config, MAX_DRIVES, MAX_POINTS, MAX_VOLTS};
use crate::curve::CalibrationCurve;
use crate::error::{Error, Result};
use crate::hardware::AnalogIo;
use crate::machine::{Handler, Machine, StateSpec};
use crate::ports::{CalibrationArtifact, Controls, Display, Knob, Selection, Storage};
use crate::search::{OutputSearch, Progress};
use core::fmt::{self, Write};
use heapless::{String, Vec};

const LINE_LENGTH: usize = 24;

type Line = String<LINE_LENGTH>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Start,
    PowerReminder,
    CurrentPoint,
    Result,
    InputDone,
    StartOutput,
    AllDone,
    Error,
}

/// Operator input. `Knob1`/`Knob2` are synthesized by
/// [`poll`](Calibrator::poll) when a knob moves, `Refresh` is the idle tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    Back,
    Confirm,
    Knob1,
    Knob2,
    Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    ShowStartMenu,
    SelectSeries,
    BeginInput,
    ShowPowerReminder,
    ShowCurrentPoint,
    AdjustTenths,
    AdjustHundredths,
    CapturePoint,
    ShowResult,
    Retry,
    AcceptPoint,
    ShowInputSaved,
    ShowConnectOutput,
    CalibrateOutput,
    ShowDone,
    ShowError,
    Restart,
}

const fn on(
    event: Event,
    actions: &'static [Action],
    target: Option<State>,
) -> Handler<State, Event, Action> {
    Handler {
        event,
        actions,
        target,
    }
}

static STATES: &[StateSpec<State, Event, Action>] = &[
    StateSpec {
        state: State::Start,
        on_enter: Some(Action::ShowStartMenu),
        handlers: &[
            on(Event::Back, &[Action::ShowStartMenu], None),
            on(Event::Confirm, &[Action::BeginInput], Some(State::PowerReminder)),
            on(Event::Knob1, &[Action::SelectSeries], None),
        ],
    },
    StateSpec {
        state: State::PowerReminder,
        on_enter: Some(Action::ShowPowerReminder),
        handlers: &[
            on(Event::Back, &[], Some(State::Start)),
            on(Event::Confirm, &[], Some(State::CurrentPoint)),
        ],
    },
    StateSpec {
        state: State::CurrentPoint,
        on_enter: Some(Action::ShowCurrentPoint),
        handlers: &[
            on(Event::Back, &[], Some(State::Start)),
            on(Event::Confirm, &[Action::CapturePoint], Some(State::Result)),
            on(Event::Knob1, &[Action::AdjustTenths, Action::ShowCurrentPoint], None),
            on(Event::Knob2, &[Action::AdjustHundredths, Action::ShowCurrentPoint], None),
            on(Event::Refresh, &[Action::ShowCurrentPoint], None),
        ],
    },
    StateSpec {
        state: State::Result,
        on_enter: Some(Action::ShowResult),
        handlers: &[
            on(Event::Back, &[Action::Retry], Some(State::CurrentPoint)),
            // AcceptPoint picks the next state
            on(Event::Confirm, &[Action::AcceptPoint], None),
        ],
    },
    StateSpec {
        state: State::InputDone,
        on_enter: Some(Action::ShowInputSaved),
        handlers: &[
            on(Event::Back, &[], Some(State::Start)),
            on(Event::Confirm, &[], Some(State::StartOutput)),
        ],
    },
    StateSpec {
        state: State::StartOutput,
        on_enter: Some(Action::ShowConnectOutput),
        handlers: &[
            on(Event::Back, &[], Some(State::Start)),
            on(Event::Confirm, &[Action::CalibrateOutput], Some(State::AllDone)),
        ],
    },
    StateSpec {
        state: State::AllDone,
        on_enter: Some(Action::ShowDone),
        handlers: &[on(Event::Confirm, &[Action::Restart], Some(State::Start))],
    },
    StateSpec {
        state: State::Error,
        on_enter: Some(Action::ShowError),
        handlers: &[on(Event::Confirm, &[Action::Restart], Some(State::Start))],
    },
];

/// Writes into a [`Line`], cutting the text at [`LINE_LENGTH`].
struct Truncate<'a>(&'a mut Line);

impl fmt::Write for Truncate<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Formats one display line, cut after [`LINE_LENGTH`] bytes.
fn line(args: fmt::Arguments) -> Line {
    let mut line = Line::new();
    // Truncate itself never fails
    let _ = Truncate(&mut line).write_fmt(args);
    line
}

/// Moves `nominal` by whole tenths; detent `center` leaves it unchanged.
fn offset_tenths(nominal: f32, position: u8, center: u8) -> f32 {
    nominal + (f32::from(position) - f32::from(center)) / 10.0
}

/// Replaces the hundredths digit of `value` with `digit`, away from zero.
fn with_hundredths(value: f32, digit: u8) -> f32 {
    let hundredths = libm::roundf(value * 100.0) as i32;
    let tenths = hundredths / 10 * 10;
    let digit = i32::from(digit.min(9));

    let hundredths = if hundredths < 0 {
        tenths - digit
    } else {
        tenths + digit
    };
    hundredths as f32 / 100.0
}

/// Everything the actions work on. Owned by the [`Calibrator`] for one
/// session.
struct Session<H, D, C, S> {
    config: Config,
    io: H,
    display: D,
    controls: C,
    storage: S,
    series: usize,
    points: Vec<f32, MAX_POINTS>,
    readings: Vec<u16, MAX_POINTS>,
    current_point: usize,
    current_reading: Option<u16>,
    curve: Option<CalibrationCurve>,
    output_drives: Vec<u16, MAX_DRIVES>,
    fault: Option<Error>,
    now_ms: u32,
    last_saved_ms: Option<u32>,
    selection_pending: bool,
}

impl<H, D, C, S> Session<H, D, C, S>
where
    H: AnalogIo,
    D: Display,
    C: Controls,
    S: Storage,
{
    fn perform(&mut self, action: Action) -> Option<State> {
        let result = match action {
            Action::ShowStartMenu => self.show_start_menu().map(|_| None),
            Action::SelectSeries => self.select_series().map(|_| None),
            Action::BeginInput => self.begin_input().map(|_| None),
            Action::ShowPowerReminder => self.show_power_reminder().map(|_| None),
            Action::ShowCurrentPoint => self.show_current_point().map(|_| None),
            Action::AdjustTenths => {
                self.adjust_tenths();
                Ok(None)
            }
            Action::AdjustHundredths => {
                self.adjust_hundredths();
                Ok(None)
            }
            Action::CapturePoint => self.capture_point().map(|_| None),
            Action::ShowResult => self.show_result().map(|_| None),
            Action::Retry => {
                self.current_reading = None;
                Ok(None)
            }
            Action::AcceptPoint => self.accept_point().map(Some),
            Action::ShowInputSaved => self
                .show(["Values saved", "B2 to", "calib. outputs"])
                .map(|_| None),
            Action::ShowConnectOutput => self
                .show(["Plug CV1 into", "analogue in.", "             OK"])
                .map(|_| None),
            Action::CalibrateOutput => self.calibrate_output().map(|_| None),
            Action::ShowDone => self.show(["All done!", " ", "B2 to restart"]).map(|_| None),
            Action::ShowError => {
                let headline = self.fault.map_or("Invalid data", |fault| fault.headline());
                self.show(["ERROR", headline, "B2 to restart"]).map(|_| None)
            }
            Action::Restart => {
                self.restart();
                Ok(None)
            }
        };

        result.unwrap_or_else(|error| self.fail(error))
    }

    /// Records the first fault of the session and asks for the error state.
    fn fail(&mut self, error: Error) -> Option<State> {
        log::error!("calibration failed: {}", error);
        if self.fault.is_none() {
            self.fault = Some(error);
        }
        Some(State::Error)
    }

    fn nominal(&self) -> &'static [f32] {
        self.config.series(self.series).unwrap_or(&[])
    }

    fn reset_points(&mut self) {
        let nominal = self.nominal();
        self.points.clear();
        // series length was checked against MAX_POINTS when the session began
        let _ = self.points.extend_from_slice(nominal);
        self.readings.clear();
        self.current_point = 0;
        self.current_reading = None;
    }

    fn show(&mut self, lines: [&str; 3]) -> Result<()> {
        self.display.show(lines).map_err(|e| {
            log::error!("display failed: {:?}", e);
            Error::Display
        })
    }

    fn show_start_menu(&mut self) -> Result<()> {
        let points = line(format_args!("{} points", self.nominal().len()));
        self.show(["Input calib.", &points, "K1:points B2:go"])
    }

    fn select_series(&mut self) -> Result<()> {
        let count = self.config.series.len();
        let position = usize::from(self.controls.position(Knob::K1, count as u8));

        if position != self.series && position < count {
            log::info!("series {} selected", position);
            self.series = position;
            self.reset_points();
            self.selection_pending = true;
            self.flush_selection()?;
            self.show_start_menu()?;
        }

        Ok(())
    }

    /// Writes the pending selection unless the last write is too recent.
    fn flush_selection(&mut self) -> Result<()> {
        if !self.selection_pending {
            return Ok(());
        }
        if let Some(last) = self.last_saved_ms {
            if self.now_ms.wrapping_sub(last) < self.config.selection_write_interval_ms {
                log::debug!("selection write deferred");
                return Ok(());
            }
        }

        let selection = Selection {
            series: self.series as u8,
        };
        self.storage.save_selection(&selection).map_err(|e| {
            log::error!("saving selection failed: {:?}", e);
            Error::Storage
        })?;
        self.last_saved_ms = Some(self.now_ms);
        self.selection_pending = false;

        Ok(())
    }

    fn begin_input(&mut self) -> Result<()> {
        self.reset_points();
        self.curve = None;
        self.output_drives.clear();
        Ok(())
    }

    fn show_power_reminder(&mut self) -> Result<()> {
        if self.io.usb_powered() {
            self.show(["Confirm rack", "power is ON", "Back   Confirm"])
        } else {
            self.show(["Rack power", "is ON.", "       Continue"])
        }
    }

    fn show_current_point(&mut self) -> Result<()> {
        let reading = self.io.sample()?;
        let target = line(format_args!("Apply {:.2} V", self.points[self.current_point]));
        let adc = line(format_args!("adc: {}", reading));
        self.show([&target, &adc, "Abort        OK"])
    }

    fn adjust_tenths(&mut self) {
        let steps = self.config.knob_steps;
        let position = self.controls.position(Knob::K1, steps);
        let nominal = self.nominal()[self.current_point];
        self.points[self.current_point] = offset_tenths(nominal, position, steps / 2);
    }

    fn adjust_hundredths(&mut self) {
        let digit = self.controls.position(Knob::K2, self.config.knob_steps);
        let point = &mut self.points[self.current_point];
        *point = with_hundredths(*point, digit);
    }

    fn capture_point(&mut self) -> Result<()> {
        let reading = self.io.sample()?;
        log::info!("{} V reads {}", self.points[self.current_point], reading);
        self.current_reading = Some(reading);
        Ok(())
    }

    fn show_result(&mut self) -> Result<()> {
        let result = line(format_args!(
            "{:.2}V = {}",
            self.points[self.current_point],
            self.current_reading.unwrap_or(0)
        ));
        self.show([&result, " ", "Retry   Confirm"])
    }

    /// Keeps the captured reading and moves on to the next point. After the
    /// last one the curve is built and the input calibration saved.
    fn accept_point(&mut self) -> Result<State> {
        let reading = match self.current_reading.take() {
            Some(reading) => reading,
            None => return Ok(State::CurrentPoint),
        };
        self.readings
            .push(reading)
            .map_err(|_| Error::CapacityExceeded)?;
        self.current_point += 1;

        if self.current_point < self.points.len() {
            return Ok(State::CurrentPoint);
        }

        let curve =
            CalibrationCurve::build(&self.points, &self.readings, self.config.max_voltage)?;
        self.show(["Saving values...", "", ""])?;
        self.storage
            .save_input(&self.points, &self.readings)
            .map_err(|e| {
                log::error!("saving input calibration failed: {:?}", e);
                Error::Storage
            })?;
        log::info!("input calibration saved ({} points)", self.points.len());
        self.curve = Some(curve);

        Ok(State::InputDone)
    }

    fn calibrate_output(&mut self) -> Result<()> {
        let max_volts = self.nominal().last().map_or(0, |top| *top as u8);
        let Self {
            config,
            io,
            display,
            curve,
            ..
        } = self;
        let curve = curve.as_ref().ok_or(Error::InvalidSeries)?;

        let mut show = |lines: [&str; 3]| {
            display.show(lines).map_err(|e| {
                log::error!("display failed: {:?}", e);
                Error::Display
            })
        };
        show(["Calibrating", "0 V", "please wait..."])?;

        let search = OutputSearch::new(curve, &config.search);
        let drives = search.run(io, max_volts, |progress| match progress {
            Progress::Zero { reading } => show([
                "Cal 0 V",
                &line(format_args!("adc: {}", reading)),
                &line(format_args!("ain: {:.3} V", curve.reading_to_voltage(reading))),
            ]),
            Progress::Step {
                volts,
                drive,
                reading,
                expected,
            } => {
                let percent = f32::from(reading) / expected * 100.0;
                show([
                    &line(format_args!("Cal {} V", volts)),
                    &line(format_args!("{} {:.1}%", drive, percent)),
                    &line(format_args!("ain: {:.2} V", curve.reading_to_voltage(reading))),
                ])
            }
            Progress::Accepted {
                volts,
                drive,
                reading,
            } => show([
                &line(format_args!("Cal {} V", volts)),
                &line(format_args!("drive = {}", drive)),
                &line(format_args!("ain: {:.2} V", curve.reading_to_voltage(reading))),
            ]),
        })?;

        let artifact = CalibrationArtifact {
            points: self.points.clone(),
            readings: self.readings.clone(),
            output_drives: drives.clone(),
        };
        self.output_drives = drives;

        self.show(["Saving values...", "", ""])?;
        self.storage.save_artifact(&artifact).map_err(|e| {
            log::error!("saving calibration failed: {:?}", e);
            Error::Storage
        })?;
        log::info!("calibration saved ({} drive values)", artifact.output_drives.len());
        self.show(["Saving done", "", ""])
    }

    fn restart(&mut self) {
        self.io.drive(0);
        self.reset_points();
        self.curve = None;
        self.output_drives.clear();
        self.fault = None;
    }
}

/// Drives a calibration session.
///
/// Buttons are passed in with [`handle`](Calibrator::handle); everything
/// else happens in [`poll`](Calibrator::poll), which the host calls in a
/// loop.
pub struct Calibrator<H, D, C, S> {
    machine: Machine<State, Event, Action>,
    session: Session<H, D, C, S>,
    knobs: [u8; 2],
}

impl<H, D, C, S> Calibrator<H, D, C, S>
where
    H: AnalogIo,
    D: Display,
    C: Controls,
    S: Storage,
{
    /// Returns a calibrator for the series selected in `storage`.
    ///
    /// Fails with [`Error::InvalidSeries`] if a series in `config` is not a
    /// strictly increasing list of 2 to [`MAX_POINTS`] voltages within
    /// `0..=MAX_VOLTS`.
    pub fn new(config: Config, io: H, display: D, controls: C, mut storage: S) -> Result<Self> {
        let valid = !config.series.is_empty()
            && config.series.iter().all(|series| {
                (2..=MAX_POINTS).contains(&series.len())
                    && series.windows(2).all(|w| w[0] < w[1])
                    && series[series.len() - 1] <= MAX_VOLTS as f32
            });
        if !valid {
            return Err(Error::InvalidSeries);
        }

        let series = match storage.load_selection() {
            Ok(Some(selection)) if usize::from(selection.series) < config.series.len() => {
                usize::from(selection.series)
            }
            Ok(_) => 0,
            Err(e) => {
                log::warn!("stored selection unreadable: {:?}", e);
                0
            }
        };

        let mut session = Session {
            config,
            io,
            display,
            controls,
            storage,
            series,
            points: Vec::new(),
            readings: Vec::new(),
            current_point: 0,
            current_reading: None,
            curve: None,
            output_drives: Vec::new(),
            fault: None,
            now_ms: 0,
            last_saved_ms: None,
            selection_pending: false,
        };
        session.reset_points();

        Ok(Self {
            machine: Machine::new(STATES),
            session,
            knobs: [0; 2],
        })
    }

    /// Shows the start menu and takes the current knob positions as
    /// reference.
    pub fn start(&mut self) -> Result<()> {
        let steps = self.session.config.knob_steps;
        self.knobs = [
            self.session.controls.position(Knob::K1, steps),
            self.session.controls.position(Knob::K2, steps),
        ];

        let session = &mut self.session;
        self.machine.start(State::Start, |action| session.perform(action))?;
        self.enter_fault()?;
        Ok(())
    }

    /// Feeds one event to the session. Returns the new state if it changed.
    pub fn handle(&mut self, event: Event) -> Result<Option<State>> {
        let session = &mut self.session;
        let next = self.machine.dispatch(event, |action| session.perform(action))?;

        Ok(self.enter_fault()?.or(next))
    }

    /// One tick of the host loop.
    ///
    /// Writes a deferred selection once allowed, turns the first knob that
    /// moved into an event, and otherwise refreshes the live sample while a
    /// point is being calibrated, then waits the refresh interval.
    pub fn poll(&mut self, now_ms: u32) -> Result<Option<State>> {
        self.session.now_ms = now_ms;
        if let Err(error) = self.session.flush_selection() {
            self.session.fail(error);
            return self.enter_fault();
        }

        let steps = self.session.config.knob_steps;
        let k1 = self.session.controls.position(Knob::K1, steps);
        let k2 = self.session.controls.position(Knob::K2, steps);

        if k1 != self.knobs[0] {
            self.knobs[0] = k1;
            self.handle(Event::Knob1)
        } else if k2 != self.knobs[1] {
            self.knobs[1] = k2;
            self.handle(Event::Knob2)
        } else if self.machine.is_in(State::CurrentPoint) {
            let next = self.handle(Event::Refresh)?;
            let interval = self.session.config.refresh_interval_ms;
            self.session.io.settle(interval);
            Ok(next)
        } else {
            Ok(None)
        }
    }

    /// Moves to the error state if an action failed outside of a
    /// transition, e.g. in an entry action.
    fn enter_fault(&mut self) -> Result<Option<State>> {
        if self.session.fault.is_none() || self.machine.is_in(State::Error) {
            return Ok(None);
        }

        let session = &mut self.session;
        self.machine.start(State::Error, |action| session.perform(action))?;
        Ok(Some(State::Error))
    }

    pub fn state(&self) -> Option<State> {
        self.machine.current()
    }

    /// Index of the selected series.
    pub fn series(&self) -> usize {
        self.session.series
    }

    /// Reference voltages of the session, including fine-tuning.
    pub fn points(&self) -> &[f32] {
        &self.session.points
    }

    /// Readings accepted so far.
    pub fn readings(&self) -> &[u16] {
        &self.session.readings
    }

    pub fn current_point(&self) -> usize {
        self.session.current_point
    }

    pub fn curve(&self) -> Option<&CalibrationCurve> {
        self.session.curve.as_ref()
    }

    pub fn output_drives(&self) -> &[u16] {
        &self.session.output_drives
    }

    pub fn fault(&self) -> Option<Error> {
        self.session.fault
    }

    /// Destroys the calibrator and returns its collaborators.
    pub fn free(self) -> (H, D, C, S) {
        let Session {
            io,
            display,
            controls,
            storage,
            ..
        } = self.session;
        (io, display, controls, storage)
    }
}
