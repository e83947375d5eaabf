use pathwise_choice::{ChoiceContext, ChoiceError, ChoiceInterrupt, ChoiceRequest, ChoiceValue};
use pathwise_peer::{DispatchResult, Dispatcher, Signature};
use pathwise_state::{ProgramState, Value};
use tracing::trace;

/// The choice picked for a suspended decision point, waiting for the
/// re-executed instruction to ask for it again.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Delivery {
    pub name: String,
    pub location: String,
    pub value: ChoiceValue,
}

#[derive(Debug, Default)]
struct Bridge {
    delivery: Option<Delivery>,
    pending: Option<ChoiceRequest>,
    ignored: bool,
    violations: Vec<String>,
}

impl ChoiceContext for Bridge {
    fn request_choice(&mut self, request: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt> {
        if let Some(d) = self.delivery.take() {
            if d.name == request.name && d.location == request.location {
                return Ok(d.value);
            }
            let expected = format!("{}@{}", d.name, d.location);
            self.delivery = Some(d);
            return Err(ChoiceError::ReplayMismatch {
                expected,
                actual: request.to_string(),
            }
            .into());
        }
        if self.pending.is_none() {
            trace!(choice = %request, "new decision point");
            self.pending = Some(request);
        }
        Err(ChoiceInterrupt::Suspended)
    }

    fn ignore_path(&mut self) {
        self.ignored = true;
    }

    fn report_violation(&mut self, description: String) {
        self.violations.push(description);
    }
}

/// What a step left behind in its context.
#[derive(Debug, Default)]
pub(crate) struct StepReport {
    pub pending: Option<ChoiceRequest>,
    pub unconsumed: Option<Delivery>,
    pub ignored: bool,
    pub violations: Vec<String>,
}

/// The engine as seen by [`Program::step`](crate::Program::step): choice
/// requests, path control and native calls.
pub struct StepContext<'a> {
    bridge: Bridge,
    dispatcher: &'a mut Dispatcher,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(dispatcher: &'a mut Dispatcher, delivery: Option<Delivery>) -> Self {
        Self {
            bridge: Bridge {
                delivery,
                ..Bridge::default()
            },
            dispatcher,
        }
    }

    /// Calls the native peer bound to `signature`. Choices requested by the
    /// peer go through this context like the program's own.
    pub fn invoke_native(
        &mut self,
        signature: &Signature,
        args: &[Value],
        site: &str,
        state: &mut ProgramState,
    ) -> DispatchResult<Value> {
        self.dispatcher
            .dispatch(signature, args, site, state, &mut self.bridge)
    }

    /// Whether a chosen value is still waiting to be picked up.
    pub fn has_delivery(&self) -> bool {
        self.bridge.delivery.is_some()
    }

    pub(crate) fn finish(self) -> StepReport {
        StepReport {
            pending: self.bridge.pending,
            unconsumed: self.bridge.delivery,
            ignored: self.bridge.ignored,
            violations: self.bridge.violations,
        }
    }
}

impl ChoiceContext for StepContext<'_> {
    fn request_choice(&mut self, request: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt> {
        self.bridge.request_choice(request)
    }

    fn ignore_path(&mut self) {
        self.bridge.ignore_path();
    }

    fn report_violation(&mut self, description: String) {
        self.bridge.report_violation(description);
    }
}
