use crate::context::StepContext;
use pathwise_choice::{ChoiceError, ChoiceInterrupt};
use pathwise_peer::{DispatchError, ModeledException, Signature};
use pathwise_state::{ProgramState, StateError, StateResult, StateSnapshot};

/// How a call to [`Program::step`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A transition boundary without a decision, e.g. a thread yielding
    /// when only one thread can run.
    TransitionEnd,
    /// No thread can make progress any more. Ends the path without a
    /// boundary, so the final state is not matched.
    Terminated,
}

/// Why a step stopped before reaching a boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupt {
    /// A new decision point was registered through the context.
    Suspended,
    /// An exception escaped the program.
    Uncaught(ModeledException),
    Choice(ChoiceError),
    Peer(DispatchError),
    State(StateError),
}

impl From<ChoiceInterrupt> for Interrupt {
    fn from(i: ChoiceInterrupt) -> Self {
        match i {
            ChoiceInterrupt::Suspended => Interrupt::Suspended,
            ChoiceInterrupt::Rejected(e) => Interrupt::Choice(e),
        }
    }
}

impl From<DispatchError> for Interrupt {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Suspended => Interrupt::Suspended,
            DispatchError::Choice(e) => Interrupt::Choice(e),
            DispatchError::State(e) => Interrupt::State(e),
            DispatchError::HandlerFault { exception, .. } => Interrupt::Uncaught(exception),
            other => Interrupt::Peer(other),
        }
    }
}

impl From<StateError> for Interrupt {
    fn from(e: StateError) -> Self {
        Interrupt::State(e)
    }
}

/// The interpreter of the program under test, as seen by the driver.
///
/// All mutable execution state lives in the [`ProgramState`]; the driver
/// snapshots and restores it to backtrack. `step` runs the program until
/// the next transition boundary. A decision point is reached by asking the
/// context; when that returns [`ChoiceInterrupt::Suspended`] the step must
/// return [`Interrupt::Suspended`] without having changed state for the
/// current instruction, and must request the same choice (same name and
/// location) when it is re-run from the restored state.
pub trait Program {
    fn state(&self) -> &ProgramState;

    fn state_mut(&mut self) -> &mut ProgramState;

    fn step(&mut self, cx: &mut StepContext<'_>) -> Result<StepOutcome, Interrupt>;

    fn restore(&mut self, snapshot: &StateSnapshot) -> StateResult<()> {
        snapshot.restore_into(self.state_mut())
    }

    /// Native methods the program may call. Checked against the peer
    /// registry before the search starts.
    fn required_peers(&self) -> Vec<Signature> {
        Vec::new()
    }

    /// Name recorded in choice traces.
    fn name(&self) -> Option<&str> {
        None
    }
}
