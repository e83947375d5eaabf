//! Built-in `Verify` peers: the program-facing API for explicit choices,
//! path pruning and assertions.

use crate::env::{bool_arg, int_arg, str_arg, PeerEnv};
use crate::error::{DispatchResult, ModeledException, PeerFault, PeerResult};
use crate::registry::PeerRegistryBuilder;
use pathwise_choice::{ChoiceRequest, ChoiceSpec};
use pathwise_state::Value;

pub const VERIFY: &str = "Verify";

/// Bit width used by `getBitFlip` unless a width argument is passed.
const DEFAULT_FLIP_WIDTH: u32 = 64;

pub fn register_verify(builder: &mut PeerRegistryBuilder) -> DispatchResult<()> {
    builder
        .register("Verify.getBoolean()Z", |env, _| get_boolean(env, true))?
        .register("Verify.getBoolean(Z)Z", |env, args| {
            get_boolean(env, bool_arg(args, 0)?)
        })?
        .register("Verify.getInt(II)I", |env, args| {
            let (min, max) = (int_arg(args, 0)?, int_arg(args, 1)?);
            choose_int(env, "verifyGetInt", ChoiceSpec::IntRange { min, max, delta: 1 })
        })?
        .register("Verify.getIntFromList([I)I", get_int_from_list)?
        .register("Verify.getBitFlip(JI)J", |env, args| {
            get_bit_flip(env, int_arg(args, 0)?, int_arg(args, 1)?, DEFAULT_FLIP_WIDTH as i64)
        })?
        .register("Verify.getBitFlip(JII)J", |env, args| {
            get_bit_flip(env, int_arg(args, 0)?, int_arg(args, 1)?, int_arg(args, 2)?)
        })?
        .register("Verify.ignoreIf(Z)V", |env, args| {
            if bool_arg(args, 0)? {
                env.control.ignore_path();
            }
            Ok(Value::Null)
        })?
        .register("Verify.assertTrue(Z)V", |env, args| {
            assert_true(env, "assertion failed", bool_arg(args, 0)?)
        })?
        .register("Verify.assertTrue(Ljava/lang/String;Z)V", |env, args| {
            let msg = str_arg(args, 0)?.to_string();
            assert_true(env, &msg, bool_arg(args, 1)?)
        })?;
    Ok(())
}

fn get_boolean(env: &mut PeerEnv<'_>, false_first: bool) -> PeerResult<Value> {
    let request = ChoiceRequest::new("verifyGetBoolean", env.site(), ChoiceSpec::Bool { false_first });
    let v = env.control.request_choice(request)?;
    Ok(Value::Bool(v.as_bool().unwrap_or(false)))
}

fn choose_int(env: &mut PeerEnv<'_>, name: &str, spec: ChoiceSpec) -> PeerResult<Value> {
    let site = env.site();
    Ok(Value::Int(env.control.choose_int(name, site, spec)?))
}

/// Accepts either a reference to an int array or the ints themselves.
fn get_int_from_list(env: &mut PeerEnv<'_>, args: &[Value]) -> PeerResult<Value> {
    let values: Vec<Value> = match args {
        [Value::Ref(array)] => env.array_elements(*array)?,
        _ => args.to_vec(),
    };
    let ints = values
        .iter()
        .map(|v| {
            v.as_int().ok_or_else(|| {
                PeerFault::Exception(ModeledException::illegal_argument(format!(
                    "getIntFromList expects ints, got {}",
                    v.type_name()
                )))
            })
        })
        .collect::<PeerResult<Vec<i64>>>()?;
    choose_int(env, "verifyGetIntFromList", ChoiceSpec::IntList(ints))
}

fn get_bit_flip(env: &mut PeerEnv<'_>, value: i64, nbits: i64, width: i64) -> PeerResult<Value> {
    let (Ok(nbits), Ok(width)) = (u32::try_from(nbits), u32::try_from(width)) else {
        return Err(PeerFault::Exception(ModeledException::illegal_argument(
            "bit flip counts must be non-negative",
        )));
    };
    choose_int(env, "verifyGetBitFlip", ChoiceSpec::BitFlip { value, width, nbits })
}

fn assert_true(env: &mut PeerEnv<'_>, message: &str, cond: bool) -> PeerResult<Value> {
    if !cond {
        env.control.report_violation(message.to_string());
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::signature::Signature;
    use crate::DispatchError;
    use pathwise_choice::{ChoiceContext, ChoiceError, ChoiceInterrupt, ChoiceValue};
    use pathwise_state::{ClassRegistry, ProgramState};
    use std::sync::Arc;

    /// Records requests and answers each with its first choice.
    #[derive(Default)]
    struct FirstChoice {
        requests: Vec<ChoiceRequest>,
        ignored: bool,
        violations: Vec<String>,
    }

    impl ChoiceContext for FirstChoice {
        fn request_choice(&mut self, request: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt> {
            let mut cg = pathwise_choice::ChoiceGenerator::from_request(&request)?;
            self.requests.push(request);
            cg.advance();
            Ok(cg.next_choice()?)
        }
        fn ignore_path(&mut self) {
            self.ignored = true;
        }
        fn report_violation(&mut self, d: String) {
            self.violations.push(d);
        }
    }

    fn setup() -> (Dispatcher, ProgramState) {
        let mut b = PeerRegistryBuilder::new();
        register_verify(&mut b).unwrap();
        let mut reg = ClassRegistry::new();
        reg.define("int[]", &[], &[]);
        (Dispatcher::new(Arc::new(b.build())), ProgramState::new(Arc::new(reg)))
    }

    fn call(d: &mut Dispatcher, s: &mut ProgramState, cx: &mut FirstChoice, sig: &str, args: &[Value]) -> Result<Value, DispatchError> {
        d.dispatch(&Signature::parse(sig).unwrap(), args, "Main.run:1", s, cx)
    }

    #[test]
    fn test_get_int_requests_range() {
        let (mut d, mut s) = setup();
        let mut cx = FirstChoice::default();
        let v = call(&mut d, &mut s, &mut cx, "Verify.getInt(II)I", &[Value::Int(3), Value::Int(5)]).unwrap();
        assert_eq!(v, Value::Int(3));
        assert_eq!(cx.requests[0].name, "verifyGetInt");
        assert_eq!(cx.requests[0].location, "Main.run:1");
    }

    #[test]
    fn test_get_boolean_false_first() {
        let (mut d, mut s) = setup();
        let mut cx = FirstChoice::default();
        assert_eq!(call(&mut d, &mut s, &mut cx, "Verify.getBoolean()Z", &[]).unwrap(), Value::Bool(false));
        assert_eq!(
            call(&mut d, &mut s, &mut cx, "Verify.getBoolean(Z)Z", &[Value::Bool(false)]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_get_int_from_array() {
        let (mut d, mut s) = setup();
        let arr = s.new_array("int[]", vec![Value::Int(9), Value::Int(8)]).unwrap();
        let mut cx = FirstChoice::default();
        let v = call(&mut d, &mut s, &mut cx, "Verify.getIntFromList([I)I", &[Value::Ref(arr)]).unwrap();
        assert_eq!(v, Value::Int(9));
    }

    #[test]
    fn test_empty_list_is_configuration_error() {
        let (mut d, mut s) = setup();
        let arr = s.new_array("int[]", vec![]).unwrap();
        let mut cx = FirstChoice::default();
        let err = call(&mut d, &mut s, &mut cx, "Verify.getIntFromList([I)I", &[Value::Ref(arr)]).unwrap_err();
        assert!(matches!(err, DispatchError::Choice(ChoiceError::EmptyChoiceSet { .. })));
    }

    #[test]
    fn test_ignore_and_assert() {
        let (mut d, mut s) = setup();
        let mut cx = FirstChoice::default();
        call(&mut d, &mut s, &mut cx, "Verify.ignoreIf(Z)V", &[Value::Bool(false)]).unwrap();
        assert!(!cx.ignored);
        call(&mut d, &mut s, &mut cx, "Verify.ignoreIf(Z)V", &[Value::Bool(true)]).unwrap();
        assert!(cx.ignored);

        call(&mut d, &mut s, &mut cx, "Verify.assertTrue(Ljava/lang/String;Z)V", &[Value::str("x > 0"), Value::Bool(false)]).unwrap();
        assert_eq!(cx.violations, vec!["x > 0".to_string()]);
    }

    #[test]
    fn test_bad_argument_is_modeled_exception() {
        let (mut d, mut s) = setup();
        let mut cx = FirstChoice::default();
        let err = call(&mut d, &mut s, &mut cx, "Verify.getInt(II)I", &[Value::Bool(true)]).unwrap_err();
        assert!(matches!(err, DispatchError::HandlerFault { .. }));
        assert!(!err.is_fatal());
    }
}
