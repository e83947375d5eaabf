//! Fingerprints depend on heap shape and content, never on where or in
//! which order objects were allocated.

use pathwise_state::{CanonicalSerializer, ClassRegistry, Heap, ProgramState, Value};
use proptest::prelude::*;
use std::sync::Arc;

fn registry() -> Arc<ClassRegistry> {
    let mut reg = ClassRegistry::new();
    reg.define("Node", &["value", "next"], &[]);
    reg.define("Main", &[], &["head"]);
    Arc::new(reg)
}

/// A list holding `values`, with node `i` allocated at position `order[i]`
/// and `garbage` unreachable nodes allocated before each list node.
fn build_list(reg: &Arc<ClassRegistry>, base: u32, values: &[i64], order: &[usize], garbage: usize) -> ProgramState {
    let mut s = ProgramState::with_heap(reg.clone(), Heap::with_base(base));
    s.init_class("Main").unwrap();
    let mut nodes = vec![None; values.len()];
    for &i in order {
        for _ in 0..garbage {
            let g = s.new_object("Node").unwrap();
            s.set_field(g, "value", Value::Int(-1)).unwrap();
        }
        nodes[i] = Some(s.new_object("Node").unwrap());
    }
    let nodes: Vec<_> = nodes.into_iter().map(Option::unwrap).collect();
    for (i, &n) in nodes.iter().enumerate() {
        s.set_field(n, "value", Value::Int(values[i])).unwrap();
        if let Some(&next) = nodes.get(i + 1) {
            s.set_field(n, "next", Value::Ref(next)).unwrap();
        }
    }
    s.set_static("Main", "head", Value::Ref(nodes[0])).unwrap();
    s
}

/// A permutation of `0..n` derived from `seed`.
fn permutation(n: usize, seed: u64) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..n).collect();
    idx.sort_by_key(|&i| (i as u64 ^ seed).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    idx
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn allocation_order_does_not_matter(
        values in prop::collection::vec(-50i64..50, 1..8),
        seed in any::<u64>(),
        base in 0u32..1000,
        garbage in 0usize..3,
    ) {
        let reg = registry();
        let mut ser = CanonicalSerializer::default();
        let straight: Vec<usize> = (0..values.len()).collect();
        let x = build_list(&reg, 0, &values, &straight, 0);
        let y = build_list(&reg, base, &values, &permutation(values.len(), seed), garbage);
        prop_assert_eq!(ser.fingerprint(&x).unwrap(), ser.fingerprint(&y).unwrap());
    }

    #[test]
    fn content_change_changes_fingerprint(
        values in prop::collection::vec(-50i64..50, 1..8),
        at in any::<prop::sample::Index>(),
    ) {
        let reg = registry();
        let mut ser = CanonicalSerializer::default();
        let straight: Vec<usize> = (0..values.len()).collect();
        let x = build_list(&reg, 0, &values, &straight, 0);
        let mut changed = values.clone();
        let i = at.index(changed.len());
        changed[i] += 100;
        let y = build_list(&reg, 0, &changed, &straight, 0);
        prop_assert_ne!(ser.fingerprint(&x).unwrap(), ser.fingerprint(&y).unwrap());
    }
}
