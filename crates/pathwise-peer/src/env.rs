use crate::error::{PeerFault, PeerResult};
use crate::error::ModeledException;
use crate::handles::HandleTable;
use crate::signature::Signature;
use pathwise_choice::ChoiceContext;
use pathwise_state::{ObjRef, ProgramState, Value};

/// Everything a handler may touch during one call.
pub struct PeerEnv<'a> {
    pub state: &'a mut ProgramState,
    pub control: &'a mut dyn ChoiceContext,
    pub handles: &'a mut HandleTable,
    signature: &'a Signature,
    site: &'a str,
}

impl<'a> PeerEnv<'a> {
    pub fn new(
        state: &'a mut ProgramState,
        control: &'a mut dyn ChoiceContext,
        handles: &'a mut HandleTable,
        signature: &'a Signature,
        site: &'a str,
    ) -> Self {
        Self {
            state,
            control,
            handles,
            signature,
            site,
        }
    }

    pub fn signature(&self) -> &'a Signature {
        self.signature
    }

    /// The call site, used as the location of any choice the handler requests.
    pub fn site(&self) -> &'a str {
        self.site
    }

    /// Read the elements of a modeled array.
    pub fn array_elements(&self, array: ObjRef) -> PeerResult<Vec<Value>> {
        Ok(self.state.heap().object(array)?.slots.to_vec())
    }
}

fn bad_arg(idx: usize, expected: &str, args: &[Value]) -> PeerFault {
    let actual = args.get(idx).map_or("missing", Value::type_name);
    PeerFault::Exception(ModeledException::illegal_argument(format!(
        "argument {} must be {}, got {}",
        idx, expected, actual
    )))
}

pub fn int_arg(args: &[Value], idx: usize) -> PeerResult<i64> {
    args.get(idx)
        .and_then(Value::as_int)
        .ok_or_else(|| bad_arg(idx, "int", args))
}

pub fn bool_arg(args: &[Value], idx: usize) -> PeerResult<bool> {
    args.get(idx)
        .and_then(Value::as_bool)
        .ok_or_else(|| bad_arg(idx, "boolean", args))
}

pub fn str_arg(args: &[Value], idx: usize) -> PeerResult<&str> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| bad_arg(idx, "string", args))
}

pub fn ref_arg(args: &[Value], idx: usize) -> PeerResult<ObjRef> {
    args.get(idx)
        .and_then(Value::as_ref)
        .ok_or_else(|| bad_arg(idx, "reference", args))
}
