use crate::error::ChoiceInterrupt;
use crate::request::{ChoiceRequest, ChoiceSpec};
use crate::value::ChoiceValue;
use pathwise_state::ThreadId;

/// The engine as seen by the interpreter during one transition.
///
/// `request_choice` either returns the value chosen for this decision point
/// on the current path, or [`ChoiceInterrupt::Suspended`] when the point is
/// reached for the first time. In the latter case the interpreter must
/// propagate the interrupt without having modified state for the current
/// instruction; the instruction is executed again once the driver has
/// picked a value.
pub trait ChoiceContext {
    fn request_choice(&mut self, request: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt>;

    /// Abandon the current path without reporting anything.
    fn ignore_path(&mut self);

    /// Report a property violation on the current path.
    fn report_violation(&mut self, description: String);

    fn choose_bool(&mut self, name: &str, location: &str) -> Result<bool, ChoiceInterrupt> {
        let v = self.request_choice(ChoiceRequest::boolean(name, location))?;
        Ok(v.as_bool().unwrap_or(false))
    }

    fn choose_int(&mut self, name: &str, location: &str, spec: ChoiceSpec) -> Result<i64, ChoiceInterrupt> {
        let v = self.request_choice(ChoiceRequest::new(name, location, spec))?;
        Ok(v.as_int().unwrap_or_default())
    }

    fn choose_thread(&mut self, name: &str, location: &str, runnable: Vec<ThreadId>) -> Result<ThreadId, ChoiceInterrupt> {
        let v = self.request_choice(ChoiceRequest::threads(name, location, runnable))?;
        Ok(v.as_thread().unwrap_or(ThreadId(0)))
    }
}
