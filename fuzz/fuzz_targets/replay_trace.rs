#![no_main]
use libfuzzer_sys::fuzz_target;
use pathwise_mc::{ChoiceTrace, SearchConfig};
use pathwise_soundness::{replay_script, Expr, Op, Script, Var};
use pathwise_state::Value;

// Arbitrary traces must be replayed or rejected, never panic.
fuzz_target!(|data: &[u8]| {
    let mut trace = ChoiceTrace::new();
    for &b in data.iter().take(16) {
        trace.push("choose", (b % 4) as usize);
    }
    let script = Script::new("Fuzz").global("x", Value::Int(0)).thread(
        "main",
        1,
        vec![
            Op::choose_int(Var::Local(0), &[1, 2, 3]),
            Op::Set(Var::global("x"), Expr::global("x").plus(Expr::local(0))),
            Op::JumpIf(Expr::global("x").less_than(Expr::Int(6)), 0),
        ],
    );
    let _ = replay_script(script, SearchConfig::default(), &trace);
});
