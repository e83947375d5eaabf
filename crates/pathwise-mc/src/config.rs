use pathwise_state::SerializerConfig;
use serde::{Deserialize, Serialize};

/// Order in which unexplored choices are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    #[default]
    DepthFirst,
    BreadthFirst,
}

/// How visited fingerprints are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VisitedPolicy {
    /// Exact set that grows without bound.
    #[default]
    Unbounded,
    /// Exact set holding at most `max_entries`; the oldest entry is evicted
    /// first. Evicted states may be explored again.
    Bounded { max_entries: usize },
    /// Fixed-size bloom filter of `2^log2_bits` bits. False positives prune
    /// unexplored states.
    Bloom { log2_bits: u32, hashes: u32 },
}

/// Configuration for a [`Search`](crate::Search).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub strategy: Strategy,
    /// Prune transitions ending in an already visited state.
    pub state_matching: bool,
    /// Treat a revisit at a shallower depth than before as new.
    pub match_depth: bool,
    /// Keep the canonical form of every visited state to detect
    /// fingerprint collisions. Costs memory proportional to the state size.
    pub full_tracking: bool,
    pub visited: VisitedPolicy,
    /// Maximum transitions on a path (0 = unlimited).
    pub max_depth: usize,
    /// Maximum new states (0 = unlimited).
    pub max_states: usize,
    /// Wall-clock limit in seconds (0 = unlimited).
    pub max_time_secs: u64,
    /// Resident memory limit in MiB (0 = unlimited).
    pub memory_limit_mb: usize,
    /// Keep searching after a property violation.
    pub multiple_errors: bool,
    /// Shuffle every generator's choices with this seed. The same seed gives
    /// the same exploration order.
    pub choice_seed: Option<u64>,
    pub serializer: SerializerConfig,
    /// Run every native call twice and fail on diverging results.
    pub verify_peer_determinism: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::DepthFirst,
            state_matching: true,
            match_depth: false,
            full_tracking: false,
            visited: VisitedPolicy::Unbounded,
            max_depth: 0,
            max_states: 0,
            max_time_secs: 0,
            memory_limit_mb: 0,
            multiple_errors: false,
            choice_seed: None,
            serializer: SerializerConfig::default(),
            verify_peer_determinism: false,
        }
    }
}
