use crate::error::{Error, Result};
use core::fmt;

/// Reaction of one state to one event.
///
/// `actions` run in order. An action returning a state overrides `target`;
/// if none does, `target` is used, and without a target the state stays.
#[derive(Debug)]
pub struct Handler<S: 'static, E, A: 'static> {
    pub event: E,
    pub actions: &'static [A],
    pub target: Option<S>,
}

/// A state of the table with its handlers and optional entry action.
#[derive(Debug)]
pub struct StateSpec<S: 'static, E: 'static, A: 'static> {
    pub state: S,
    pub on_enter: Option<A>,
    pub handlers: &'static [Handler<S, E, A>],
}

/// Table-driven state machine.
///
/// States, events and actions are plain values; the machine only decides
/// which actions to run and where to go next. Running an action is up to
/// the caller, through the closure passed to [`start`](Machine::start) and
/// [`dispatch`](Machine::dispatch).
///
/// # Examples
///
/// ```
/// use cv_calibrator::{Handler, Machine, StateSpec};
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// enum Light { Off, On }
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// enum Event { Press }
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// enum Action { Count }
///
/// static TABLE: &[StateSpec<Light, Event, Action>] = &[
///     StateSpec {
///         state: Light::Off,
///         on_enter: None,
///         handlers: &[Handler { event: Event::Press, actions: &[], target: Some(Light::On) }],
///     },
///     StateSpec {
///         state: Light::On,
///         on_enter: Some(Action::Count),
///         handlers: &[Handler { event: Event::Press, actions: &[], target: Some(Light::Off) }],
///     },
/// ];
///
/// let mut presses = 0;
/// let mut machine = Machine::new(TABLE);
/// machine.start(Light::Off, |_| None).unwrap();
/// machine.dispatch(Event::Press, |_| { presses += 1; None }).unwrap();
///
/// assert_eq!(machine.current(), Some(Light::On));
/// assert_eq!(presses, 1);
/// ```
#[derive(Debug)]
pub struct Machine<S: 'static, E: 'static, A: 'static> {
    table: &'static [StateSpec<S, E, A>],
    current: Option<S>,
}

impl<S, E, A> Machine<S, E, A>
where
    S: Copy + PartialEq + fmt::Debug + 'static,
    E: Copy + PartialEq + fmt::Debug + 'static,
    A: Copy + 'static,
{
    pub const fn new(table: &'static [StateSpec<S, E, A>]) -> Self {
        Self {
            table,
            current: None,
        }
    }

    /// Returns the current state, or `None` before [`start`](Machine::start).
    pub fn current(&self) -> Option<S> {
        self.current
    }

    pub fn is_in(&self, state: S) -> bool {
        self.current == Some(state)
    }

    /// Makes `initial` the current state and runs its entry action.
    ///
    /// May be called again to restart the machine from any state.
    pub fn start<F>(&mut self, initial: S, run: F) -> Result<()>
    where
        F: FnMut(A) -> Option<S>,
    {
        self.enter(initial, run)
    }

    /// Feeds `event` to the current state.
    ///
    /// Events the current state has no handler for are ignored. Returns the
    /// new state if the event changed it.
    pub fn dispatch<F>(&mut self, event: E, mut run: F) -> Result<Option<S>>
    where
        F: FnMut(A) -> Option<S>,
    {
        let current = self.current.ok_or(Error::NotStarted)?;
        let spec = self.spec(current)?;

        let handler = match spec.handlers.iter().find(|h| h.event == event) {
            Some(handler) => handler,
            None => return Ok(None),
        };

        let mut next = None;
        for action in handler.actions {
            if let Some(state) = run(*action) {
                next = Some(state);
            }
        }

        match next.or(handler.target) {
            Some(next) if next != current => {
                log::debug!("{:?} --{:?}--> {:?}", current, event, next);
                self.enter(next, run)?;
                Ok(Some(next))
            }
            _ => Ok(None),
        }
    }

    fn enter<F>(&mut self, state: S, mut run: F) -> Result<()>
    where
        F: FnMut(A) -> Option<S>,
    {
        let spec = self.spec(state)?;
        self.current = Some(state);

        // entry actions cannot redirect
        if let Some(action) = spec.on_enter {
            run(action);
        }

        Ok(())
    }

    fn spec(&self, state: S) -> Result<&'static StateSpec<S, E, A>> {
        let table = self.table;
        table
            .iter()
            .find(|spec| spec.state == state)
            .ok_or(Error::UnknownState)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum State {
        Idle,
        Armed,
        Fired,
        Missing,
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Event {
        Arm,
        Fire,
        Tick,
        Reset,
        Jump,
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Action {
        Log,
        Count,
        Misfire,
        EnterArmed,
        EnterFired,
    }

    static TABLE: &[StateSpec<State, Event, Action>] = &[
        StateSpec {
            state: State::Idle,
            on_enter: None,
            handlers: &[
                Handler {
                    event: Event::Arm,
                    actions: &[Action::Log, Action::Count],
                    target: Some(State::Armed),
                },
                Handler {
                    event: Event::Tick,
                    actions: &[Action::Count],
                    target: None,
                },
                Handler {
                    event: Event::Jump,
                    actions: &[],
                    target: Some(State::Missing),
                },
            ],
        },
        StateSpec {
            state: State::Armed,
            on_enter: Some(Action::EnterArmed),
            handlers: &[
                Handler {
                    event: Event::Fire,
                    actions: &[Action::Misfire, Action::Log],
                    target: Some(State::Fired),
                },
                Handler {
                    event: Event::Arm,
                    actions: &[Action::Count],
                    target: Some(State::Armed),
                },
            ],
        },
        StateSpec {
            state: State::Fired,
            on_enter: Some(Action::EnterFired),
            handlers: &[Handler {
                event: Event::Reset,
                actions: &[],
                target: Some(State::Idle),
            }],
        },
    ];

    /// Runs every action by recording it; `Misfire` redirects to `Idle`.
    fn record(log: &mut Vec<Action>) -> impl FnMut(Action) -> Option<State> + '_ {
        move |action| {
            log.push(action);
            match action {
                Action::Misfire => Some(State::Idle),
                _ => None,
            }
        }
    }

    fn started(initial: State) -> Machine<State, Event, Action> {
        let mut machine = Machine::new(TABLE);
        machine.start(initial, |_| None).unwrap();
        machine
    }

    #[test]
    fn dispatch_before_start() {
        let mut machine = Machine::new(TABLE);
        assert_eq!(machine.dispatch(Event::Arm, |_| None), Err(Error::NotStarted));
        assert_eq!(machine.current(), None);
    }

    #[test]
    fn start_runs_entry_action() {
        let mut log = Vec::new();
        let mut machine = Machine::new(TABLE);
        machine.start(State::Armed, record(&mut log)).unwrap();

        assert!(machine.is_in(State::Armed));
        assert_eq!(log, [Action::EnterArmed]);
    }

    #[test]
    fn start_in_unknown_state() {
        let mut machine = Machine::new(TABLE);
        assert_eq!(
            machine.start(State::Missing, |_| None),
            Err(Error::UnknownState)
        );
    }

    #[test]
    fn actions_run_in_order_then_target_entered() {
        let mut log = Vec::new();
        let mut machine = started(State::Idle);

        let next = machine.dispatch(Event::Arm, record(&mut log)).unwrap();

        assert_eq!(next, Some(State::Armed));
        assert_eq!(log, [Action::Log, Action::Count, Action::EnterArmed]);
    }

    #[test]
    fn unhandled_event_is_ignored() {
        let mut log = Vec::new();
        let mut machine = started(State::Idle);

        assert_eq!(machine.dispatch(Event::Fire, record(&mut log)), Ok(None));
        assert!(machine.is_in(State::Idle));
        assert!(log.is_empty());
    }

    #[test]
    fn no_target_keeps_state() {
        let mut log = Vec::new();
        let mut machine = started(State::Idle);

        assert_eq!(machine.dispatch(Event::Tick, record(&mut log)), Ok(None));
        assert!(machine.is_in(State::Idle));
        assert_eq!(log, [Action::Count]);
    }

    #[test]
    fn action_result_overrides_target() {
        let mut log = Vec::new();
        let mut machine = started(State::Armed);

        let next = machine.dispatch(Event::Fire, record(&mut log)).unwrap();

        assert_eq!(next, Some(State::Idle));
        assert_eq!(log, [Action::Misfire, Action::Log]);
    }

    #[test]
    fn self_transition_skips_entry_action() {
        let mut log = Vec::new();
        let mut machine = started(State::Armed);

        assert_eq!(machine.dispatch(Event::Arm, record(&mut log)), Ok(None));
        assert_eq!(log, [Action::Count]);
    }

    #[test]
    fn unknown_target_leaves_state_unchanged() {
        let mut machine = started(State::Idle);

        assert_eq!(
            machine.dispatch(Event::Jump, |_| None),
            Err(Error::UnknownState)
        );
        assert!(machine.is_in(State::Idle));
    }

    #[test]
    fn full_cycle() {
        let mut log = Vec::new();
        let mut machine = started(State::Idle);

        machine.dispatch(Event::Arm, |_| None).unwrap();
        machine.dispatch(Event::Fire, |_| None).unwrap();
        assert!(machine.is_in(State::Fired));

        machine.dispatch(Event::Reset, record(&mut log)).unwrap();
        assert!(machine.is_in(State::Idle));
        assert!(log.is_empty());
    }
}
