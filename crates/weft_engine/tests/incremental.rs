//! Incremental behavior of collection nodes across runs.

mod common;

use common::Counter;
use std::sync::Arc;
use weft_engine::{
    CancellationToken, DiffState, Driver, DriverOptions, DriverState, Item, Node,
    PipelineBuilder, RunOutput,
};

#[derive(Default, Clone)]
struct Names {
    names: Vec<String>,
    suffix: String,
}

impl Names {
    fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
            suffix: String::new(),
        }
    }
}

fn run(driver: &Driver<Names>, previous: &DriverState, inputs: &Names) -> RunOutput {
    driver
        .run(previous, inputs, &CancellationToken::new())
        .expect("run should succeed")
}

fn states<T: Item>(output: &RunOutput, node: Node<T>) -> String {
    output
        .table(node)
        .map(|table| table.packed_states())
        .unwrap_or_default()
}

/// A pipeline mapping each name to upper case, with one source per name.
struct Upper {
    driver: Driver<Names>,
    names: Node<String>,
    upper: Node<String>,
    calls: Counter,
    outputs: Counter,
}

fn upper_pipeline() -> Upper {
    let calls = Counter::default();
    let outputs = Counter::default();
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    let upper = {
        let calls = calls.clone();
        builder.map(names, move |name: &String, _: &CancellationToken| {
            calls.hit();
            name.to_uppercase()
        })
    };
    {
        let outputs = outputs.clone();
        builder.generator("Upper", move |cx| {
            cx.register_source_output(upper, move |out, name: &String| {
                outputs.hit();
                out.add_source(&format!("{name}.g.rs"), format!("// {name}"));
            });
        });
    }
    Upper {
        driver: Driver::new(builder.build(), DriverOptions::default()),
        names,
        upper,
        calls,
        outputs,
    }
}

#[test]
fn rerun_without_changes_invokes_no_callbacks() {
    let p = upper_pipeline();
    let inputs = Names::new(&["widget", "gadget"]);
    let first = run(&p.driver, &DriverState::new(), &inputs);
    assert_eq!(p.calls.take(), 2);
    assert_eq!(p.outputs.take(), 2);
    assert_eq!(states(&first, p.upper), "AA");

    let second = run(&p.driver, &first.state, &inputs);
    assert_eq!(p.calls.get(), 0);
    assert_eq!(p.outputs.get(), 0);
    assert_eq!(states(&second, p.names), "CC");
    assert_eq!(states(&second, p.upper), "CC");

    let hints: Vec<_> = second.result.sources().map(|s| s.hint_name.as_str()).collect();
    assert_eq!(hints, vec!["WIDGET.g.rs", "GADGET.g.rs"]);
    assert_eq!(
        first.result.sources().collect::<Vec<_>>(),
        second.result.sources().collect::<Vec<_>>()
    );
    assert_eq!(second.state.generation(), 2);
}

#[test]
fn every_previous_item_is_accounted_for() {
    let p = upper_pipeline();
    let first = run(&p.driver, &DriverState::new(), &Names::new(&["a", "b", "c"]));
    p.calls.take();

    let second = run(&p.driver, &first.state, &Names::new(&["a", "c", "d", "e"]));
    assert_eq!(states(&second, p.names), "CRCAA");
    assert_eq!(states(&second, p.upper), "CRCAA");
    assert_eq!(p.calls.get(), 2);

    let table = second.table(p.upper).unwrap();
    let live: Vec<_> = table.live_values().cloned().collect();
    assert_eq!(live, vec!["A", "C", "D", "E"]);
    assert_eq!(table.len(), 5);

    let hints: Vec<_> = second.result.sources().map(|s| s.hint_name.clone()).collect();
    assert_eq!(hints, vec!["A.g.rs", "C.g.rs", "D.g.rs", "E.g.rs"]);
}

#[test]
fn same_length_snapshots_match_by_position() {
    let p = upper_pipeline();
    let first = run(&p.driver, &DriverState::new(), &Names::new(&["a", "b", "c"]));

    let second = run(&p.driver, &first.state, &Names::new(&["x", "y", "z"]));
    assert_eq!(states(&second, p.names), "MMM");
    assert_eq!(states(&second, p.upper), "MMM");

    let third = run(&p.driver, &second.state, &Names::new(&["x", "q", "z"]));
    assert_eq!(states(&third, p.names), "CMC");
    assert_eq!(states(&third, p.upper), "CMC");
}

#[test]
fn reordered_keys_stay_cached() {
    let p = upper_pipeline();
    let first = run(&p.driver, &DriverState::new(), &Names::new(&["a", "b"]));
    p.calls.take();

    let second = run(&p.driver, &first.state, &Names::new(&["b", "a"]));
    assert_eq!(states(&second, p.names), "CC");
    assert_eq!(p.calls.get(), 0);
}

#[test]
fn repeated_values_are_matched_in_order() {
    let calls = Counter::default();
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    {
        let calls = calls.clone();
        builder.generator("Repeated", move |cx| {
            cx.register_host_output(names, move |out, name: &String| {
                calls.hit();
                out.add_output("name", serde_json::json!(name));
            });
        });
    }
    let driver = Driver::new(builder.build(), DriverOptions::default());

    let first = run(&driver, &DriverState::new(), &Names::new(&["a", "a"]));
    assert_eq!(states(&first, names), "AA");
    assert_eq!(calls.take(), 2);

    let second = run(&driver, &first.state, &Names::new(&["a", "a"]));
    assert_eq!(states(&second, names), "CC");
    assert_eq!(calls.take(), 0);

    let third = run(&driver, &second.state, &Names::new(&["a", "a", "b"]));
    assert_eq!(states(&third, names), "CCA");
    assert_eq!(calls.take(), 1);

    let fourth = run(&driver, &third.state, &Names::new(&["a"]));
    assert_eq!(states(&fourth, names), "CRR");
    let values: Vec<_> = fourth.table(names).unwrap().live_values().cloned().collect();
    assert_eq!(values, vec!["a"]);
}

#[test]
fn collect_is_total_even_when_empty() {
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    let all = builder.collect(names);
    builder.generator("Count", |cx| {
        cx.register_host_output(all, |out, names: &Arc<[String]>| {
            out.add_output("count", serde_json::json!(names.len()));
        });
    });
    let driver = Driver::new(builder.build(), DriverOptions::default());

    let empty = run(&driver, &DriverState::new(), &Names::new(&[]));
    let table = empty.table(all).unwrap();
    assert_eq!(table.packed_states(), "A");
    assert_eq!(table.live_values().next().map(|names| names.len()), Some(0));
    assert_eq!(empty.result.host_outputs().next().unwrap().value, serde_json::json!(0));

    let filled = run(&driver, &empty.state, &Names::new(&["a", "b"]));
    let table = filled.table(all).unwrap();
    assert_eq!(table.packed_states(), "M");
    let values: Vec<_> = table.live_values().next().unwrap().to_vec();
    assert_eq!(values, vec!["a", "b"]);

    let emptied = run(&driver, &filled.state, &Names::new(&[]));
    assert_eq!(states(&emptied, names), "RR");
    assert_eq!(states(&emptied, all), "M");
    assert_eq!(emptied.result.host_outputs().next().unwrap().value, serde_json::json!(0));
}

#[test]
fn collecting_unchanged_items_stays_cached() {
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    let all = builder.collect(names);
    builder.generator("Count", |cx| {
        cx.register_host_output(all, |out, names: &Arc<[String]>| {
            out.add_output("count", serde_json::json!(names.len()));
        });
    });
    let driver = Driver::new(builder.build(), DriverOptions::default());
    let inputs = Names::new(&["a", "b"]);
    let first = run(&driver, &DriverState::new(), &inputs);
    let second = run(&driver, &first.state, &inputs);
    assert_eq!(states(&second, all), "C");
    assert_eq!(second.result.host_outputs().count(), 1);
}

#[test]
fn combine_sees_the_latest_right_value() {
    let calls = Counter::default();
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    let suffix = builder.input_value(|inputs: &Names| inputs.suffix.clone());
    let pairs = builder.combine(names, suffix);
    let joined = {
        let calls = calls.clone();
        builder.map(pairs, move |(name, suffix): &(String, String), _: &CancellationToken| {
            calls.hit();
            format!("{name}{suffix}")
        })
    };
    builder.generator("Joined", |cx| {
        cx.register_source_output(joined, |out, name: &String| {
            out.add_source(&format!("{name}.g.rs"), name.as_str());
        });
    });
    let driver = Driver::new(builder.build(), DriverOptions::default());

    let mut inputs = Names::new(&["a", "b"]);
    inputs.suffix = "_v1".to_string();
    let first = run(&driver, &DriverState::new(), &inputs);
    assert_eq!(calls.take(), 2);

    inputs.suffix = "_v2".to_string();
    let second = run(&driver, &first.state, &inputs);
    assert_eq!(states(&second, names), "CC");
    assert_eq!(states(&second, suffix), "M");
    assert_eq!(states(&second, pairs), "MM");
    assert_eq!(calls.take(), 2);
    let hints: Vec<_> = second.result.sources().map(|s| s.hint_name.clone()).collect();
    assert_eq!(hints, vec!["a_v2.g.rs", "b_v2.g.rs"]);

    let third = run(&driver, &second.state, &inputs);
    assert_eq!(states(&third, suffix), "C");
    assert_eq!(states(&third, pairs), "CC");
    assert_eq!(calls.take(), 0);

    inputs.names.push("c".to_string());
    let fourth = run(&driver, &third.state, &inputs);
    assert_eq!(states(&fourth, pairs), "CCA");
    assert_eq!(calls.take(), 1);
}

#[test]
fn custom_comparer_stops_propagation() {
    let downstream = Counter::default();
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    let echoed = builder.map(names, |name: &String, _: &CancellationToken| name.clone());
    let folded = builder.with_comparer(echoed, |a: &String, b: &String| a.eq_ignore_ascii_case(b));
    let lengths = {
        let downstream = downstream.clone();
        builder.map(folded, move |name: &String, _: &CancellationToken| {
            downstream.hit();
            name.len()
        })
    };
    builder.generator("Lengths", |cx| {
        cx.register_host_output(lengths, |out, len: &usize| {
            out.add_output("len", serde_json::json!(len));
        });
    });
    let driver = Driver::new(builder.build(), DriverOptions::default());

    let first = run(&driver, &DriverState::new(), &Names::new(&["Widget"]));
    assert_eq!(downstream.take(), 1);

    let second = run(&driver, &first.state, &Names::new(&["WIDGET"]));
    assert_eq!(states(&second, names), "M");
    assert_eq!(states(&second, folded), "C");
    assert_eq!(states(&second, lengths), "C");
    assert_eq!(downstream.get(), 0);
    let kept: Vec<_> = second.table(folded).unwrap().live_values().cloned().collect();
    assert_eq!(kept, vec!["Widget"]);
}

#[test]
fn fan_out_reconciles_outputs_per_item() {
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    let parts = builder.map_many(names, |name: &String, _: &CancellationToken| {
        name.split(':').skip(1).map(str::to_string).collect::<Vec<_>>()
    });
    builder.generator("Parts", |cx| {
        cx.register_host_output(parts, |out, part: &String| {
            out.add_output("part", serde_json::json!(part));
        });
    });
    let driver = Driver::new(builder.build(), DriverOptions::default());

    let first = run(&driver, &DriverState::new(), &Names::new(&["a:x:y", "b:z"]));
    assert_eq!(states(&first, parts), "AAA");

    let second = run(&driver, &first.state, &Names::new(&["a:x:w:v", "b:z"]));
    assert_eq!(states(&second, names), "MC");
    assert_eq!(states(&second, parts), "CMAC");

    let third = run(&driver, &second.state, &Names::new(&["a:q", "b:z"]));
    assert_eq!(states(&third, parts), "MRRC");
    let values: Vec<_> = third.result.host_outputs().map(|o| o.value.clone()).collect();
    assert_eq!(values, vec![serde_json::json!("q"), serde_json::json!("z")]);
}

#[test]
fn keyed_inputs_match_by_key() {
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input_keyed(
        |inputs: &Names| inputs.names.clone(),
        |name: &String| name.split('=').next().unwrap_or_default().to_string(),
    );
    builder.generator("Keys", |cx| {
        cx.register_host_output(names, |out, name: &String| {
            out.add_output("name", serde_json::json!(name));
        });
    });
    let driver = Driver::new(builder.build(), DriverOptions::default());

    let first = run(&driver, &DriverState::new(), &Names::new(&["a=1", "b=2"]));
    let second = run(&driver, &first.state, &Names::new(&["b=3", "a=1"]));
    // Items are told apart by key only, so a new value under a known key is
    // not a change.
    assert_eq!(states(&second, names), "CC");
    let values: Vec<_> = second.table(names).unwrap().live_values().cloned().collect();
    assert_eq!(values, vec!["a=1", "b=2"]);

    let third = run(&driver, &second.state, &Names::new(&["a=1", "c=4", "b=2"]));
    assert_eq!(states(&third, names), "CCA");
}

#[test]
fn filter_drops_rejected_items() {
    let mut builder = PipelineBuilder::<Names>::new();
    let names = builder.input(|inputs: &Names| inputs.names.clone());
    let long = builder.filter(names, |name: &String, _: &CancellationToken| name.len() > 2);
    builder.generator("Long", |cx| {
        cx.register_host_output(long, |out, name: &String| {
            out.add_output("name", serde_json::json!(name));
        });
    });
    let driver = Driver::new(builder.build(), DriverOptions::default());

    let first = run(&driver, &DriverState::new(), &Names::new(&["ab", "abc", "abcd"]));
    assert_eq!(states(&first, long), "AA");

    let second = run(&driver, &first.state, &Names::new(&["abcde", "abc", "abcd"]));
    assert_eq!(states(&second, long), "ACC");
    let values: Vec<_> = second.result.host_outputs().map(|o| o.value.clone()).collect();
    assert_eq!(
        values,
        vec![
            serde_json::json!("abcde"),
            serde_json::json!("abc"),
            serde_json::json!("abcd")
        ]
    );
}

#[test]
fn concurrent_runs_share_a_driver() {
    let p = upper_pipeline();
    let base = run(&p.driver, &DriverState::new(), &Names::new(&["a"]));
    let left_inputs = Names::new(&["a", "b"]);
    let right_inputs = Names::new(&["c"]);

    let (left_out, right_out) = std::thread::scope(|scope| {
        let left = scope.spawn(|| run(&p.driver, &base.state, &left_inputs));
        let right = scope.spawn(|| run(&p.driver, &base.state, &right_inputs));
        (left.join().unwrap(), right.join().unwrap())
    });

    assert_eq!(states(&left_out, p.names), "CA");
    assert_eq!(states(&right_out, p.names), "M");
    let left_hints: Vec<_> = left_out.result.sources().map(|s| s.hint_name.clone()).collect();
    let right_hints: Vec<_> = right_out.result.sources().map(|s| s.hint_name.clone()).collect();
    assert_eq!(left_hints, vec!["A.g.rs", "B.g.rs"]);
    assert_eq!(right_hints, vec!["C.g.rs"]);
    assert_eq!(left_out.state.generation(), 2);
    assert_eq!(right_out.state.generation(), 2);

    // The shared base state is untouched.
    let again = run(&p.driver, &base.state, &Names::new(&["a"]));
    assert_eq!(states(&again, p.names), "C");
}

#[test]
fn states_from_another_pipeline_are_rejected() {
    let a = upper_pipeline();
    let b = upper_pipeline();
    let inputs = Names::new(&["a"]);
    let first = run(&a.driver, &DriverState::new(), &inputs);
    let err = b
        .driver
        .run(&first.state, &inputs, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, weft_engine::DriverError::Internal(_)));
}

#[test]
fn state_exposes_committed_tables() {
    let p = upper_pipeline();
    let first = run(&p.driver, &DriverState::new(), &Names::new(&["a", "b"]));
    let committed = first.state.table(p.upper).unwrap();
    assert!(committed.is_cached());
    assert_eq!(committed.states(), vec![DiffState::Cached, DiffState::Cached]);
    assert!(DriverState::new().table(p.upper).is_none());
}
