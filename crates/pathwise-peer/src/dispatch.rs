//! The dispatch bridge between modeled calls and peer handlers.

use crate::env::PeerEnv;
use crate::error::{DispatchError, DispatchResult, PeerFault};
use crate::handles::HandleTable;
use crate::registry::{PeerHandler, PeerRegistry};
use crate::signature::Signature;
use pathwise_choice::{ChoiceContext, ChoiceInterrupt, ChoiceRequest, ChoiceValue};
use pathwise_state::{DeterminismProbe, ProgramState, SerializerConfig, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Routes native calls to their handlers.
///
/// With determinism verification on, every call runs twice from identical
/// copies of the state, the second run answering choice requests with the
/// values the first one got. Diverging results or post-states are reported
/// as [`DispatchError::Nondeterministic`].
pub struct Dispatcher {
    registry: Arc<PeerRegistry>,
    handles: HandleTable,
    verify: Option<SerializerConfig>,
    calls: u64,
}

impl Dispatcher {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self {
            registry,
            handles: HandleTable::new(),
            verify: None,
            calls: 0,
        }
    }

    /// Run every call twice and compare, using `config` to fingerprint the
    /// post-states.
    pub fn with_verification(mut self, config: SerializerConfig) -> Self {
        self.verify = Some(config);
        self
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Number of dispatched calls.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn dispatch(
        &mut self,
        signature: &Signature,
        args: &[Value],
        site: &str,
        state: &mut ProgramState,
        control: &mut dyn ChoiceContext,
    ) -> DispatchResult<Value> {
        let handler = self
            .registry
            .lookup(signature)
            .cloned()
            .ok_or_else(|| DispatchError::UnboundSignature(signature.clone()))?;
        self.calls += 1;
        trace!(signature = %signature, site, "dispatch");

        match self.verify.clone() {
            None => {
                // A suspended call is re-executed from the pre-call state, so
                // writes made before the suspension must not reach `state`.
                let mut scratch = state.clone();
                let result = {
                    let mut env = PeerEnv::new(&mut scratch, control, &mut self.handles, signature, site);
                    handler(&mut env, args)
                };
                if matches!(result, Err(PeerFault::Interrupt(ChoiceInterrupt::Suspended))) {
                    return Err(DispatchError::Suspended);
                }
                *state = scratch;
                result.map_err(|f| DispatchError::from_fault(signature, f))
            }
            Some(config) => self.dispatch_verified(&handler, config, signature, args, site, state, control),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_verified(
        &mut self,
        handler: &PeerHandler,
        config: SerializerConfig,
        signature: &Signature,
        args: &[Value],
        site: &str,
        state: &mut ProgramState,
        control: &mut dyn ChoiceContext,
    ) -> DispatchResult<Value> {
        let mut probe = DeterminismProbe::new(config);

        let mut first = state.clone();
        probe.begin(&first)?;
        let mut recorder = Recorder {
            inner: control,
            answers: Vec::new(),
        };
        let r1 = {
            let mut env = PeerEnv::new(&mut first, &mut recorder, &mut self.handles, signature, site);
            handler(&mut env, args)
        };
        if matches!(r1, Err(PeerFault::Interrupt(ChoiceInterrupt::Suspended))) {
            return Err(DispatchError::Suspended);
        }
        probe.end(&first)?;

        let mut second = state.clone();
        probe.begin(&second)?;
        let mut replayer = Replayer {
            answers: recorder.answers.into_iter(),
        };
        let r2 = {
            let mut env = PeerEnv::new(&mut second, &mut replayer, &mut self.handles, signature, site);
            handler(&mut env, args)
        };
        let report = probe.end(&second)?;

        if r1 != r2 {
            debug!(signature = %signature, "peer results diverged");
            return Err(DispatchError::Nondeterministic {
                signature: signature.clone(),
                detail: format!("results differ: {:?} vs {:?}", r1, r2),
            });
        }
        if let Some(m) = report.mismatch() {
            return Err(DispatchError::diverged(signature, m));
        }

        *state = first;
        r1.map_err(|f| DispatchError::from_fault(signature, f))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bindings", &self.registry.len())
            .field("handles", &self.handles.len())
            .field("verify", &self.verify.is_some())
            .field("calls", &self.calls)
            .finish()
    }
}

/// Forwards to the real context and remembers the answers.
struct Recorder<'c> {
    inner: &'c mut dyn ChoiceContext,
    answers: Vec<ChoiceValue>,
}

impl ChoiceContext for Recorder<'_> {
    fn request_choice(&mut self, request: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt> {
        let v = self.inner.request_choice(request)?;
        self.answers.push(v.clone());
        Ok(v)
    }

    fn ignore_path(&mut self) {
        self.inner.ignore_path();
    }

    fn report_violation(&mut self, description: String) {
        self.inner.report_violation(description);
    }
}

/// Answers from a recording; side channels were already forwarded once.
struct Replayer {
    answers: std::vec::IntoIter<ChoiceValue>,
}

impl ChoiceContext for Replayer {
    fn request_choice(&mut self, _request: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt> {
        // An extra request means the second run took another path.
        self.answers.next().ok_or(ChoiceInterrupt::Suspended)
    }

    fn ignore_path(&mut self) {}

    fn report_violation(&mut self, _description: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{int_arg, str_arg};
    use crate::error::ModeledException;
    use crate::handles::Handle;
    use crate::registry::PeerRegistryBuilder;
    use pathwise_state::ClassRegistry;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A context that always has the given answer ready.
    struct Fixed(ChoiceValue, Vec<String>);

    impl ChoiceContext for Fixed {
        fn request_choice(&mut self, _r: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt> {
            Ok(self.0.clone())
        }
        fn ignore_path(&mut self) {}
        fn report_violation(&mut self, d: String) {
            self.1.push(d);
        }
    }

    fn state() -> ProgramState {
        let mut reg = ClassRegistry::new();
        reg.define("Main", &[], &["x"]);
        let mut s = ProgramState::new(Arc::new(reg));
        s.init_class("Main").unwrap();
        s
    }

    fn sig(s: &str) -> Signature {
        Signature::parse(s).unwrap()
    }

    #[test]
    fn test_unbound_signature() {
        let mut d = Dispatcher::new(Arc::new(PeerRegistry::default()));
        let mut s = state();
        let err = d
            .dispatch(&sig("A.f()V"), &[], "site", &mut s, &mut Fixed(ChoiceValue::Int(0), vec![]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnboundSignature(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_handler_mutates_state() {
        let mut b = PeerRegistryBuilder::new();
        b.register("Main.store(I)V", |env, args| {
            let x = int_arg(args, 0)?;
            env.state.set_static("Main", "x", Value::Int(x))?;
            Ok(Value::Null)
        })
        .unwrap();
        let mut d = Dispatcher::new(Arc::new(b.build()));
        let mut s = state();
        d.dispatch(&sig("Main.store(I)V"), &[Value::Int(4)], "site", &mut s, &mut Fixed(ChoiceValue::Int(0), vec![]))
            .unwrap();
        assert_eq!(s.get_static("Main", "x").unwrap(), &Value::Int(4));
        assert_eq!(d.calls(), 1);
    }

    #[test]
    fn test_exception_is_handler_fault() {
        let mut b = PeerRegistryBuilder::new();
        b.register("Main.fail()V", |_, _| {
            Err(PeerFault::Exception(ModeledException::new("IOException", "boom")))
        })
        .unwrap();
        let mut d = Dispatcher::new(Arc::new(b.build()));
        let err = d
            .dispatch(&sig("Main.fail()V"), &[], "site", &mut state(), &mut Fixed(ChoiceValue::Int(0), vec![]))
            .unwrap_err();
        match err {
            DispatchError::HandlerFault { exception, .. } => assert_eq!(exception.class, "IOException"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_handles_survive_across_calls() {
        let mut b = PeerRegistryBuilder::new();
        b.register("Pattern.compile(Ljava/lang/String;)I", |env, args| {
            let pat = str_arg(args, 0)?.to_string();
            let h = env.handles.intern("pattern", &pat, || Ok(pat.clone()))?;
            Ok(Value::Int(h.as_int()))
        })
        .unwrap();
        b.register("Pattern.matches(ILjava/lang/String;)Z", |env, args| {
            let h = Handle::from_int(int_arg(args, 0)?)?;
            let pat = env.handles.get::<String>("pattern", h)?;
            Ok(Value::Bool(str_arg(args, 1)?.starts_with(pat.as_str())))
        })
        .unwrap();
        let mut d = Dispatcher::new(Arc::new(b.build()));
        let mut s = state();
        let mut cx = Fixed(ChoiceValue::Int(0), vec![]);

        let compile = sig("Pattern.compile(Ljava/lang/String;)I");
        let h1 = d.dispatch(&compile, &[Value::str("ab")], "s", &mut s, &mut cx).unwrap();
        let h2 = d.dispatch(&compile, &[Value::str("ab")], "s", &mut s, &mut cx).unwrap();
        assert_eq!(h1, h2);
        let m = d
            .dispatch(
                &sig("Pattern.matches(ILjava/lang/String;)Z"),
                &[h1, Value::str("abc")],
                "s",
                &mut s,
                &mut cx,
            )
            .unwrap();
        assert_eq!(m, Value::Bool(true));

        let stale = d
            .dispatch(
                &sig("Pattern.matches(ILjava/lang/String;)Z"),
                &[Value::Int(42), Value::str("abc")],
                "s",
                &mut s,
                &mut cx,
            )
            .unwrap_err();
        assert!(matches!(stale, DispatchError::StaleHandle { handle: 42, .. }));
    }

    #[test]
    fn test_verification_accepts_deterministic_peer() {
        let mut b = PeerRegistryBuilder::new();
        b.register("Main.pick()I", |env, _| {
            let site = env.site();
            let v = env.control.choose_bool("pick", site)?;
            env.state.set_static("Main", "x", Value::Bool(v))?;
            Ok(Value::Bool(v))
        })
        .unwrap();
        let mut d = Dispatcher::new(Arc::new(b.build())).with_verification(SerializerConfig::default());
        let mut s = state();
        let v = d
            .dispatch(&sig("Main.pick()I"), &[], "s", &mut s, &mut Fixed(ChoiceValue::Bool(true), vec![]))
            .unwrap();
        assert_eq!(v, Value::Bool(true));
        assert_eq!(s.get_static("Main", "x").unwrap(), &Value::Bool(true));
    }

    #[test]
    fn test_verification_rejects_hidden_host_state() {
        static COUNTER: AtomicI64 = AtomicI64::new(0);
        let mut b = PeerRegistryBuilder::new();
        b.register("Main.tick()V", |env, _| {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            env.state.set_static("Main", "x", Value::Int(n))?;
            Ok(Value::Null)
        })
        .unwrap();
        let mut d = Dispatcher::new(Arc::new(b.build())).with_verification(SerializerConfig::default());
        let mut s = state();
        let err = d
            .dispatch(&sig("Main.tick()V"), &[], "s", &mut s, &mut Fixed(ChoiceValue::Int(0), vec![]))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Nondeterministic { .. }));
        assert!(err.is_fatal());
        // the state is left as it was before the call
        assert_eq!(s.get_static("Main", "x").unwrap(), &Value::Null);
    }

    /// A context with no choice ready yet.
    struct Suspending;

    impl ChoiceContext for Suspending {
        fn request_choice(&mut self, _r: ChoiceRequest) -> Result<ChoiceValue, ChoiceInterrupt> {
            Err(ChoiceInterrupt::Suspended)
        }
        fn ignore_path(&mut self) {}
        fn report_violation(&mut self, _d: String) {}
    }

    fn increment_then_choose() -> PeerRegistryBuilder {
        let mut b = PeerRegistryBuilder::new();
        b.register("Main.bump()Z", |env, _| {
            let x = match env.state.get_static("Main", "x")? {
                Value::Int(n) => *n,
                _ => 0,
            };
            env.state.set_static("Main", "x", Value::Int(x + 1))?;
            let site = env.site();
            Ok(Value::Bool(env.control.choose_bool("bump", site)?))
        })
        .unwrap();
        b
    }

    #[test]
    fn test_suspension_discards_writes_before_the_request() {
        for verify in [false, true] {
            let mut d = Dispatcher::new(Arc::new(increment_then_choose().build()));
            if verify {
                d = d.with_verification(SerializerConfig::default());
            }
            let mut s = state();
            let bump = sig("Main.bump()Z");

            let err = d.dispatch(&bump, &[], "s", &mut s, &mut Suspending).unwrap_err();
            assert_eq!(err, DispatchError::Suspended);
            assert_eq!(s.get_static("Main", "x").unwrap(), &Value::Null);

            // re-executed with the value available, the write lands once
            let v = d
                .dispatch(&bump, &[], "s", &mut s, &mut Fixed(ChoiceValue::Bool(true), vec![]))
                .unwrap();
            assert_eq!(v, Value::Bool(true));
            assert_eq!(s.get_static("Main", "x").unwrap(), &Value::Int(1));
        }
    }

    #[test]
    fn test_negative_handle_is_reported_as_given() {
        let mut b = PeerRegistryBuilder::new();
        b.register("Pattern.use(I)V", |env, args| {
            let h = Handle::from_int(int_arg(args, 0)?)?;
            env.handles.get::<String>("pattern", h)?;
            Ok(Value::Null)
        })
        .unwrap();
        let mut d = Dispatcher::new(Arc::new(b.build()));
        let err = d
            .dispatch(
                &sig("Pattern.use(I)V"),
                &[Value::Int(-1)],
                "s",
                &mut state(),
                &mut Fixed(ChoiceValue::Int(0), vec![]),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::StaleHandle { handle: -1, .. }));
    }
}
