//! Replaying a recorded choice trace reproduces the same path.

use pathwise_mc::{ChoiceTrace, EventLog, Search, SearchConfig, SearchEvent};
use pathwise_soundness::{check_script, first_violation, replay_script, verify_peers, Expr, Interpreter, Op, Script, Var};
use pathwise_state::Value;

/// Fails when the two chosen values sum to 5.
fn pick_two() -> Script {
    Script::new("PickTwo").global("sum", Value::Int(0)).thread(
        "main",
        2,
        vec![
            Op::choose_int(Var::Local(0), &[1, 2, 3]),
            Op::choose_int(Var::Local(1), &[1, 2, 3]),
            Op::Set(Var::global("sum"), Expr::local(0).plus(Expr::local(1))),
            Op::Assert(Expr::global("sum").equals(Expr::Int(5)).negate(), "sum is five".into()),
        ],
    )
}

fn violating_trace() -> ChoiceTrace {
    let outcome = check_script(pick_two(), SearchConfig::default()).unwrap();
    first_violation(&outcome).unwrap().trace.clone()
}

fn transition_events(trace: &ChoiceTrace) -> Vec<SearchEvent> {
    let mut program = Interpreter::new(pick_two()).unwrap();
    let mut search = Search::new(SearchConfig::default(), verify_peers().unwrap());
    let log = EventLog::new();
    search.add_listener(log.clone());
    search.replay(&mut program, trace).unwrap();
    log.filtered(|e| matches!(e, SearchEvent::TransitionEnded { .. }))
}

#[test]
fn violation_trace_names_program_and_choices() {
    let trace = violating_trace();
    assert_eq!(trace.application.as_deref(), Some("PickTwo"));
    let indices: Vec<usize> = trace.iter().map(|e| e.index).collect();
    // 2 + 3 is the first pair summing to five in depth-first order.
    assert_eq!(indices, vec![1, 2]);
}

#[test]
fn replay_reproduces_violation() {
    let trace = violating_trace();
    let replay = replay_script(pick_two(), SearchConfig::default(), &trace).unwrap();
    let violation = replay.violation.expect("violation not reproduced");
    assert_eq!(violation.description, "sum is five");
    assert_eq!(replay.choices, 2);
    assert_eq!(replay.fingerprints.len(), 2);
}

#[test]
fn replays_are_identical() {
    let trace = violating_trace();
    let a = replay_script(pick_two(), SearchConfig::default(), &trace).unwrap();
    let b = replay_script(pick_two(), SearchConfig::default(), &trace).unwrap();
    assert_eq!(a.fingerprints, b.fingerprints);
    assert_eq!(transition_events(&trace), transition_events(&trace));
}

#[test]
fn prefix_trace_stops_early() {
    let mut prefix = ChoiceTrace::new();
    prefix.push("choose", 0);
    let replay = replay_script(pick_two(), SearchConfig::default(), &prefix).unwrap();
    assert!(replay.violation.is_none());
    assert!(!replay.terminated);
    assert_eq!(replay.choices, 1);
}

#[test]
fn saved_trace_replays_the_same() {
    let trace = violating_trace();
    let dir = tempfile::tempdir().unwrap();
    for file in ["cex.trace", "cex.json"] {
        let path = dir.path().join(file);
        trace.save(&path).unwrap();
        let loaded = ChoiceTrace::load(&path).unwrap();
        assert_eq!(loaded, trace);
        let a = replay_script(pick_two(), SearchConfig::default(), &trace).unwrap();
        let b = replay_script(pick_two(), SearchConfig::default(), &loaded).unwrap();
        assert_eq!(a.fingerprints, b.fingerprints);
    }
}

#[test]
fn trace_from_other_program_is_rejected() {
    let mut trace = ChoiceTrace::new();
    trace.push("verifyGetBoolean", 0);
    let err = replay_script(pick_two(), SearchConfig::default(), &trace).unwrap_err();
    assert!(err.contains("does not fit"), "{err}");
}
