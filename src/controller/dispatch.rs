//! The continuation dispatcher.
//!
//! A dispatch walks `before filters -> action -> after filters`. Every step
//! advances the chain at most once, through [`Controller::next`] or
//! [`Controller::fail`] (directly or via `send`/`redirect` during the action).
//! A step that returns without advancing owns the response and ends the
//! chain there.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::Controller;
use crate::error::ControllerError;

/// Where a dispatch is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    /// Index into the type's before-filter list.
    Before(usize),
    Action,
    /// Index into the type's after-filter list.
    After(usize),
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pending => write!(f, "pending"),
            Phase::Before(i) => write!(f, "before filter #{}", i),
            Phase::Action => write!(f, "action"),
            Phase::After(i) => write!(f, "after filter #{}", i),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every step advanced.
    Completed,
    /// A step returned without advancing.
    Halted(Phase),
    /// A step failed; the outer continuation received the error.
    Failed(Phase),
}

/// The advancement recorded by the step currently running.
#[derive(Debug)]
pub(crate) enum Signal {
    Proceed,
    Fail(ControllerError),
}

enum Step {
    Advance,
    Halt,
    Fail(ControllerError),
}

fn step<F>(controller: &mut Controller<'_>, phase: Phase, body: F) -> Step
where
    F: FnOnce(&mut Controller<'_>) -> Result<(), ControllerError>,
{
    controller.signal = None;
    debug!(controller = %controller.controller_name(), %phase, "dispatch step");

    let in_action = phase == Phase::Action;
    if in_action {
        controller.set_in_action(true);
    }
    let result = body(controller);
    if in_action {
        controller.set_in_action(false);
    }

    match (result, controller.signal.take()) {
        (Err(err), _) => Step::Fail(err),
        (Ok(()), Some(Signal::Fail(err))) => Step::Fail(err),
        (Ok(()), Some(Signal::Proceed)) => Step::Advance,
        (Ok(()), None) => Step::Halt,
    }
}

/// Run the full chain for `action` on a bound controller.
pub(crate) fn run<N>(controller: &mut Controller<'_>, action: &str, next: N) -> Outcome
where
    N: FnOnce(ControllerError),
{
    let controller_type = Arc::clone(controller.controller_type());

    let Some(body) = controller_type.action(action) else {
        next(ControllerError::unknown_action(controller_type.name(), action));
        return Outcome::Failed(Phase::Pending);
    };

    for (i, filter) in controller_type.before_filters().iter().enumerate() {
        if !filter.applies_to(action) {
            continue;
        }
        let phase = Phase::Before(i);
        match step(controller, phase, |c| filter.run(c)) {
            Step::Advance => {}
            Step::Halt => return halted(phase),
            Step::Fail(err) => return failed(phase, err, next),
        }
    }

    match step(controller, Phase::Action, |c| body.invoke(c)) {
        Step::Advance => {}
        Step::Halt => return halted(Phase::Action),
        Step::Fail(err) => return failed(Phase::Action, err, next),
    }

    for (i, filter) in controller_type.after_filters().iter().enumerate() {
        if !filter.applies_to(action) {
            continue;
        }
        let phase = Phase::After(i);
        match step(controller, phase, |c| filter.run(c)) {
            Step::Advance => {}
            Step::Halt => return halted(phase),
            Step::Fail(err) => return failed(phase, err, next),
        }
    }

    debug!(controller = %controller_type.name(), action, phase = %Phase::Done, "dispatch complete");
    Outcome::Completed
}

fn halted(phase: Phase) -> Outcome {
    debug!(%phase, "dispatch halted");
    Outcome::Halted(phase)
}

fn failed<N: FnOnce(ControllerError)>(phase: Phase, err: ControllerError, next: N) -> Outcome {
    debug!(%phase, error = %err, "dispatch failed");
    next(err);
    Outcome::Failed(phase)
}
