//! Property tests for event ordering, the event budget and the builders.

use proptest::prelude::*;
use serde_json::{json, Map};

use tracelab_check::builders::{build_recursion_tree, final_table};
use tracelab_check::tracer::{
    run_trace, EntryPoint, EventKind, TraceConfig, TraceEvent, TraceInput, TraceReport, TracerKind,
};

/// Turns push/pop choices into a balanced call/return sequence under a
/// single top-level call. Each call carries a unique `id` binding.
fn balanced_events(choices: &[bool]) -> Vec<TraceEvent> {
    let mut kinds = Vec::new();
    let mut depth = 0usize;
    let mut next_id = 0i64;

    let mut call = |kinds: &mut Vec<EventKind>, depth: usize| {
        let mut locals = Map::new();
        locals.insert("id".into(), json!(next_id));
        next_id += 1;
        kinds.push(EventKind::Call {
            function: "f".into(),
            line: 1,
            frame_id: next_id as u64,
            depth,
            locals,
        });
    };
    let ret = |kinds: &mut Vec<EventKind>, depth: usize| {
        kinds.push(EventKind::Return {
            function: "f".into(),
            line: 2,
            frame_id: 0,
            depth,
            return_value: "None".into(),
            locals: Map::new(),
        });
    };

    depth += 1;
    call(&mut kinds, depth);
    for &push in choices {
        if push || depth == 1 {
            depth += 1;
            call(&mut kinds, depth);
        } else {
            ret(&mut kinds, depth);
            depth -= 1;
        }
    }
    while depth > 0 {
        ret(&mut kinds, depth);
        depth -= 1;
    }

    kinds
        .into_iter()
        .enumerate()
        .map(|(seq, kind)| TraceEvent {
            seq: seq as u64,
            kind,
        })
        .collect()
}

fn counting_trace(iterations: usize, budget: usize) -> TraceReport {
    let source = format!(
        "total = 0\nfor i in range({}):\n    total = total + i\n",
        iterations
    );
    let entry = EntryPoint::default();
    let input = TraceInput {
        source: &source,
        stdin: "",
        entry: &entry,
    };
    let config = TraceConfig {
        event_budget: budget,
        ..TraceConfig::default()
    };
    run_trace(TracerKind::Execution, &input, &config)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn tree_preorder_matches_call_order(choices in proptest::collection::vec(any::<bool>(), 0..60)) {
        let events = balanced_events(&choices);
        let tree = build_recursion_tree(&events).unwrap();

        let calls: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.kind {
                EventKind::Call { locals, .. } => Some(locals["id"].clone()),
                _ => None,
            })
            .collect();
        let preorder: Vec<_> = tree
            .preorder()
            .into_iter()
            .map(|node| node.args["id"].clone())
            .collect();
        prop_assert_eq!(preorder, calls);
    }

    #[test]
    fn builders_are_idempotent(choices in proptest::collection::vec(any::<bool>(), 0..40)) {
        let events = balanced_events(&choices);
        let first = serde_json::to_string(&build_recursion_tree(&events)).unwrap();
        let second = serde_json::to_string(&build_recursion_tree(&events)).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(final_table(&events), final_table(&events));
    }

    #[test]
    fn sequence_indices_are_contiguous(iterations in 0usize..40, budget in 1usize..50) {
        let report = counting_trace(iterations, budget);
        for (expected, event) in report.events.iter().enumerate() {
            prop_assert_eq!(event.seq, expected as u64);
        }
    }

    #[test]
    fn budget_keeps_exactly_n_data_events(iterations in 5usize..40, budget in 1usize..20) {
        let natural = counting_trace(iterations, usize::MAX).events.len();
        let report = counting_trace(iterations, budget);
        let truncations = report
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Truncated { .. }))
            .count();
        if natural > budget {
            prop_assert_eq!(report.events.len(), budget + 1);
            prop_assert_eq!(truncations, 1);
            let last_is_truncated = matches!(report.events[budget].kind, EventKind::Truncated { .. });
            prop_assert!(last_is_truncated);
            prop_assert!(report.truncated);
        } else {
            prop_assert_eq!(report.events.len(), natural);
            prop_assert_eq!(truncations, 0);
        }
    }
}
