//! Scripted programs for exercising the pathwise engine end to end.

pub mod error;
pub mod interp;
pub mod script;

pub use error::ScriptError;
pub use interp::Interpreter;
pub use script::{Expr, Op, Script, ThreadScript, Var, GLOBALS, LOCKS};

use pathwise_mc::{ChoiceTrace, ReplayOutcome, Search, SearchConfig, SearchOutcome, Violation};
use pathwise_peer::{register_verify, PeerRegistry, PeerRegistryBuilder};
use std::sync::Arc;

/// A registry holding only the `Verify` peers.
pub fn verify_peers() -> Result<Arc<PeerRegistry>, String> {
    let mut builder = PeerRegistryBuilder::new();
    register_verify(&mut builder).map_err(|e| e.to_string())?;
    Ok(Arc::new(builder.build()))
}

pub fn check_script(script: Script, config: SearchConfig) -> Result<SearchOutcome, String> {
    check_script_with_peers(script, config, verify_peers()?)
}

pub fn check_script_with_peers(
    script: Script,
    config: SearchConfig,
    peers: Arc<PeerRegistry>,
) -> Result<SearchOutcome, String> {
    let mut program = Interpreter::new(script).map_err(|e| e.to_string())?;
    let mut search = Search::new(config, peers);
    search.run(&mut program).map_err(|e| e.to_string())
}

pub fn replay_script(script: Script, config: SearchConfig, trace: &ChoiceTrace) -> Result<ReplayOutcome, String> {
    let mut program = Interpreter::new(script).map_err(|e| e.to_string())?;
    let mut search = Search::new(config, verify_peers()?);
    search.replay(&mut program, trace).map_err(|e| e.to_string())
}

pub fn end_states_from_outcome(outcome: &SearchOutcome) -> Option<usize> {
    match outcome {
        SearchOutcome::Exhausted { stats, .. } => Some(stats.end_states),
        _ => None,
    }
}

pub fn first_violation(outcome: &SearchOutcome) -> Option<&Violation> {
    outcome.violations().into_iter().next()
}
