//! Native peers called from scripts: Verify choices, missing bindings and
//! determinism verification.

use pathwise_mc::SearchConfig;
use pathwise_peer::{register_verify, PeerRegistryBuilder};
use pathwise_soundness::{check_script, check_script_with_peers, end_states_from_outcome, Expr, Op, Script, Var};
use pathwise_state::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn verified() -> SearchConfig {
    SearchConfig {
        verify_peer_determinism: true,
        ..SearchConfig::default()
    }
}

fn get_int_script() -> Script {
    Script::new("GetInt").global("x", Value::Int(0)).thread(
        "main",
        1,
        vec![
            Op::native(Some(Var::Local(0)), "Verify.getInt(II)I", vec![Expr::Int(0), Expr::Int(2)]),
            Op::Set(Var::global("x"), Expr::local(0)),
            Op::native(None, "Verify.ignoreIf(Z)V", vec![Expr::local(0).equals(Expr::Int(1))]),
        ],
    )
}

#[test]
fn verify_get_int_enumerates_range() {
    let outcome = check_script(get_int_script(), SearchConfig::default()).unwrap();
    assert!(outcome.is_exhausted());
    assert_eq!(end_states_from_outcome(&outcome), Some(2));
    assert_eq!(outcome.stats().ignored_paths, 1);
}

#[test]
fn verify_assert_reports_violation() {
    let script = Script::new("VerifyAssert").thread(
        "main",
        1,
        vec![
            Op::native(Some(Var::Local(0)), "Verify.getBoolean()Z", vec![]),
            Op::native(
                None,
                "Verify.assertTrue(Ljava/lang/String;Z)V",
                vec![Expr::Str("flag must be false".into()), Expr::local(0).negate()],
            ),
        ],
    );
    let outcome = check_script(script, SearchConfig::default()).unwrap();
    let violations = outcome.violations();
    assert_eq!(violations.len(), 1);
    assert!(violations[0].description.contains("flag must be false"));
}

#[test]
fn deterministic_peers_pass_verification() {
    let plain = check_script(get_int_script(), SearchConfig::default()).unwrap();
    let checked = check_script(get_int_script(), verified()).unwrap();
    assert!(checked.is_exhausted());
    assert_eq!(plain.stats().new_states, checked.stats().new_states);
}

#[test]
fn hidden_host_state_fails_verification() {
    static TICKS: AtomicI64 = AtomicI64::new(0);
    let mut builder = PeerRegistryBuilder::new();
    register_verify(&mut builder).unwrap();
    builder
        .register("Host.tick()V", |env, _| {
            let n = TICKS.fetch_add(1, Ordering::Relaxed);
            env.state.set_static("Globals", "x", Value::Int(n))?;
            Ok(Value::Null)
        })
        .unwrap();
    let script = Script::new("Ticks")
        .global("x", Value::Int(0))
        .thread("main", 0, vec![Op::native(None, "Host.tick()V", vec![])]);

    let err = check_script_with_peers(script, verified(), Arc::new(builder.build())).unwrap_err();
    assert!(err.contains("not deterministic"), "{err}");
}

#[test]
fn unbound_native_is_rejected_before_search() {
    let script = Script::new("Unbound").thread("main", 0, vec![Op::native(None, "Foo.bar()V", vec![])]);
    let err = check_script(script, SearchConfig::default()).unwrap_err();
    assert!(err.starts_with("configuration error"), "{err}");
    assert!(err.contains("Foo.bar"), "{err}");
}

#[test]
fn malformed_signature_is_rejected_at_load() {
    let script = Script::new("Malformed").thread("main", 0, vec![Op::native(None, "nonsense", vec![])]);
    let err = check_script(script, SearchConfig::default()).unwrap_err();
    assert!(err.contains("malformed native signature"), "{err}");
}
