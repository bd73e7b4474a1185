// stepviz - Step-by-step Program State Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! End-to-end trace sessions against scripted target programs

use std::sync::Arc;

use serde_json::json;
use stepviz_common::{
    test_utils::{ScriptedConnector, StaticArtifactProducer},
    types::{
        Command, Literal, MemberKey, Shape, Snapshot, SnapshotKind, ThreadId, TraceResult, Value,
    },
};
use stepviz_engine::{spawn_tracer, TraceError, TracerConfig};
use stepviz_integration_tests::test_utils::{
    driver::{run_to_end, run_with},
    init::init_test_environment,
    programs,
};
use tracing::info;

fn local<'a>(snapshot: &'a Snapshot, name: &str) -> &'a Value {
    snapshot
        .current_frame()
        .and_then(|frame| frame.variable(name))
        .unwrap_or_else(|| panic!("no local {name}"))
}

fn heap_member<'a>(snapshot: &'a Snapshot, value: &Value, key: &MemberKey) -> &'a Value {
    let id = value.as_reference().expect("reference");
    let object = snapshot.resolve(id).expect("object on the heap");
    &object.members.iter().find(|m| &m.key == key).expect("member").value
}

#[test]
fn test_simple_program_full_trace() {
    init_test_environment();
    info!("Running test");

    let run = run_to_end(programs::simple_locals());

    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);
    assert_eq!(*run.outcome.as_ref().unwrap(), 7);
    assert_eq!(run.results.first(), Some(&TraceResult::Started));
    assert_eq!(run.results.last(), Some(&TraceResult::Finished));
    assert_eq!(run.error_results(), 0);

    let snapshots = run.snapshots();
    let kinds: Vec<_> = snapshots.iter().map(|(s, _)| s.kind).collect();
    assert_eq!(
        kinds,
        [
            SnapshotKind::Call,
            SnapshotKind::Line,
            SnapshotKind::Line,
            SnapshotKind::Line,
            SnapshotKind::Line,
            SnapshotKind::Line,
            SnapshotKind::Return,
        ]
    );
    assert!(snapshots.iter().all(|(s, threw)| !s.stack.is_empty() && threw.is_none()));

    // one-based runtime line 6 is reported as source line 5
    let (at_println, _) = snapshots[4];
    assert_eq!(at_println.stack[0].source_line, 5);
    assert_eq!(at_println.stack[0].name, "main");
    assert_eq!(local(at_println, "x"), &Value::Literal(Literal::Integer(1)));
    assert_eq!(local(at_println, "s"), &Value::Literal(Literal::text("hi")));

    // 2^53 + 1 is not exactly representable as a double
    assert_eq!(local(at_println, "big"), &Value::Literal(Literal::text("9007199254740993")));

    let args = local(at_println, "args").as_reference().expect("args is an array");
    let args = at_println.resolve(args).unwrap();
    assert_eq!(args.shape, Shape::Array);
    assert!(args.members.is_empty());

    assert_eq!(run.output(), "hi\n");
    assert_eq!(run.journal.launches.len(), 1);
    assert!(run.journal.launches[0].suspend);
    assert!(run.journal.interrupted.is_empty());
}

#[test]
fn test_output_precedes_the_step_that_follows_it() {
    init_test_environment();

    let run = run_to_end(programs::simple_locals());

    let output_at = run
        .results
        .iter()
        .position(|r| matches!(r, TraceResult::Output { .. }))
        .expect("output result");
    let snapshots_before = run.results[..output_at]
        .iter()
        .filter(|r| matches!(r, TraceResult::Snapshot { .. }))
        .count();
    assert_eq!(snapshots_before, 5);
}

#[test]
fn test_subscriptions_are_scoped_to_entry_thread_and_program_types() {
    init_test_environment();

    let (scenario, _) = programs::cyclic_graph();
    let run = run_to_end(scenario);

    let scoped: Vec<_> = run.journal.requests.iter().filter(|r| r.class_filter.is_some()).collect();
    assert_eq!(scoped.len(), 8);
    assert!(scoped.iter().all(|r| r.thread == Some(ThreadId(1))));
    assert!(scoped.iter().any(|r| r.class_filter.as_deref() == Some("Node")));
}

#[test]
fn test_cyclic_graph_resolves_to_references() {
    init_test_environment();

    let (scenario, ids) = programs::cyclic_graph();
    let run = run_to_end(scenario);
    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);

    let (snapshot, _) = run.snapshots()[0];
    assert_eq!(local(snapshot, "a"), &Value::Reference(ids.a));
    assert_eq!(local(snapshot, "b"), &Value::Reference(ids.b));
    assert_eq!(snapshot.heap.len(), 2);

    let a = snapshot.resolve(ids.a).unwrap();
    let b = snapshot.resolve(ids.b).unwrap();
    assert_eq!(a.shape, Shape::Aggregate);
    assert!(a.user_defined);
    assert_eq!(a.runtime_type_name, "Node");
    assert_eq!(a.field("next"), Some(&Value::Reference(ids.b)));
    assert_eq!(b.field("next"), Some(&Value::Reference(ids.a)));
    assert_eq!(b.field("value"), Some(&Value::Literal(Literal::Integer(2))));
}

#[test]
fn test_container_shapes() {
    init_test_environment();

    let run = run_to_end(programs::collections(false));
    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);
    let (snapshot, _) = run.snapshots()[0];

    let list = local(snapshot, "list");
    let list_object = snapshot.resolve(list.as_reference().unwrap()).unwrap();
    assert_eq!(list_object.shape, Shape::OrderedSequence);
    assert_eq!(list_object.runtime_type_name, "java.util.ArrayList");
    assert!(!list_object.user_defined);
    assert_eq!(
        list_object.members.iter().map(|m| m.value.clone()).collect::<Vec<_>>(),
        [Value::Literal(Literal::Integer(1)), Value::Literal(Literal::text("two")), Value::Null]
    );

    let map = local(snapshot, "map");
    assert_eq!(snapshot.resolve(map.as_reference().unwrap()).unwrap().shape, Shape::Map);
    assert_eq!(
        heap_member(snapshot, map, &MemberKey::Value(Value::Literal(Literal::text("k")))),
        &Value::Literal(Literal::Integer(5))
    );

    let set = local(snapshot, "set");
    assert_eq!(snapshot.resolve(set.as_reference().unwrap()).unwrap().shape, Shape::Set);
    assert_eq!(
        heap_member(snapshot, set, &MemberKey::Index(0)),
        &Value::Literal(Literal::text("c"))
    );

    // the linked list holds the same list object, which is stored once
    let linked = local(snapshot, "linked");
    assert_eq!(
        snapshot.resolve(linked.as_reference().unwrap()).unwrap().shape,
        Shape::LinkedSequence
    );
    assert_eq!(heap_member(snapshot, linked, &MemberKey::Index(0)), list);

    let arr = local(snapshot, "arr");
    assert_eq!(snapshot.resolve(arr.as_reference().unwrap()).unwrap().shape, Shape::Array);
    assert_eq!(
        heap_member(snapshot, arr, &MemberKey::Index(1)),
        &Value::Literal(Literal::Integer(2))
    );

    assert_eq!(local(snapshot, "huge"), &Value::Literal(Literal::text("9223372036854775807")));
    assert_eq!(local(snapshot, "ratio"), &Value::Literal(Literal::text("NaN")));

    // list, map, set, linked and arr; helper objects never reach the heap
    assert_eq!(snapshot.heap.len(), 5);
}

#[test]
fn test_failing_invocations_fall_back_to_opaque_labels() {
    init_test_environment();

    let run = run_to_end(programs::collections(true));

    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);
    assert_eq!(*run.outcome.as_ref().unwrap(), 2);

    let (snapshot, _) = run.snapshots()[0];
    assert_eq!(local(snapshot, "list"), &Value::Literal(Literal::text("type java.util.ArrayList")));
    assert_eq!(local(snapshot, "map"), &Value::Literal(Literal::text("type java.util.HashMap")));
    assert_eq!(local(snapshot, "set"), &Value::Literal(Literal::text("type java.util.HashSet")));
    assert_eq!(
        heap_member(snapshot, local(snapshot, "arr"), &MemberKey::Index(0)),
        &Value::Literal(Literal::Integer(1))
    );
    assert!(run.journal.invocations.iter().any(|(_, method)| method == "toArray"));
}

#[test]
fn test_uncaught_exception_reports_what_the_thread_threw() {
    init_test_environment();

    let run = run_to_end(programs::uncaught_exception());
    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);
    assert_eq!(*run.outcome.as_ref().unwrap(), 5);

    let snapshots = run.snapshots();
    let kinds: Vec<_> = snapshots.iter().map(|(s, _)| s.kind).collect();
    assert_eq!(
        kinds,
        [
            SnapshotKind::Call,
            SnapshotKind::Line,
            SnapshotKind::Line,
            SnapshotKind::Exception,
            SnapshotKind::Return,
        ]
    );

    let (thrown, none) = snapshots[3];
    let (ended, threw) = snapshots[4];
    assert!(none.is_none());
    assert!(Arc::ptr_eq(&thrown.stack, &ended.stack));
    assert!(Arc::ptr_eq(&thrown.heap, &ended.heap));

    let threw = threw.expect("fault info");
    assert_eq!(threw.exception_type_name, "java.lang.ArithmeticException");
    assert_eq!(threw.message.as_deref(), Some("/ by zero"));

    assert!(run.output().contains("ArithmeticException"));
}

#[test]
fn test_terminate_mid_trace_stops_the_target() {
    init_test_environment();

    let config = TracerConfig::default().with_exit_code(3);
    let run = run_with(programs::simple_locals(), config, |n| {
        if n == 2 {
            Command::Terminate.to_string()
        } else {
            Command::Advance.to_string()
        }
    });

    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);
    assert_eq!(*run.outcome.as_ref().unwrap(), 2);
    assert_eq!(run.snapshots().len(), 2);
    assert_eq!(run.results.last(), Some(&TraceResult::Finished));
    assert_eq!(run.error_results(), 0);
    assert_eq!(run.journal.exit_code, Some(3));
}

#[test]
fn test_unadmitted_threads_are_interrupted() {
    init_test_environment();

    let run = run_to_end(programs::spawned_thread());

    assert!(run.errors.is_empty(), "unexpected errors: {:?}", run.errors);
    assert_eq!(*run.outcome.as_ref().unwrap(), 5);
    assert_eq!(run.journal.interrupted, [ThreadId(10)]);

    // the worker never shows up in a published stack
    for (snapshot, _) in run.snapshots() {
        assert!(snapshot.stack.iter().all(|frame| frame.name == "main"));
    }

    let (last, _) = run.snapshots()[4];
    assert_eq!(local(last, "t"), &Value::Literal(Literal::text("type java.lang.Thread")));
}

#[test]
fn test_garbled_command_is_a_single_error() {
    init_test_environment();

    let run = run_with(programs::simple_locals(), TracerConfig::default(), |n| {
        if n == 3 {
            "step please".to_string()
        } else {
            Command::Advance.to_string()
        }
    });

    assert!(matches!(
        run.outcome,
        Err(TraceError::ProtocolViolation { ref received }) if received == "step please"
    ));
    assert_eq!(run.snapshots().len(), 3);
    assert_eq!(run.error_results(), 1);
    assert!(matches!(run.results.last(), Some(TraceResult::Error { .. })));
    assert_eq!(run.errors.len(), 1);
}

#[test]
fn test_results_wire_layout() {
    init_test_environment();

    let run = run_to_end(programs::uncaught_exception());
    let encoded: Vec<serde_json::Value> =
        run.results.iter().map(|r| serde_json::to_value(r).unwrap()).collect();

    assert_eq!(encoded[0], json!({"kind": "started"}));
    let last_snapshot = encoded
        .iter()
        .rev()
        .find(|r| r["kind"] == "snapshot")
        .expect("a snapshot result");
    assert_eq!(last_snapshot["snapshot"]["kind"], "return");
    assert_eq!(last_snapshot["snapshot"]["stack"][0]["sourceLine"], 3);
    assert_eq!(
        last_snapshot["threw"],
        json!({"exceptionTypeName": "java.lang.ArithmeticException", "message": "/ by zero"})
    );
    assert_eq!(encoded.last(), Some(&json!({"kind": "finished"})));

    let decoded: Vec<TraceResult> =
        encoded.into_iter().map(|r| serde_json::from_value(r).unwrap()).collect();
    assert_eq!(decoded, run.results);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_spawned_tracer_with_async_consumer() {
    init_test_environment();

    let programs::Scenario { vm, artifact, dir } = programs::simple_locals();
    let (handle, mut client) = spawn_tracer(
        ScriptedConnector::new(vm),
        StaticArtifactProducer::new(artifact),
        TracerConfig::default(),
    );

    client.send(Command::Advance).await.unwrap();
    let mut snapshots = 0;
    while let Some(result) = client.recv().await {
        match result {
            TraceResult::Snapshot { .. } => {
                snapshots += 1;
                client.send(Command::Advance).await.unwrap();
            }
            TraceResult::Finished => break,
            other @ TraceResult::Error { .. } => panic!("trace failed: {other:?}"),
            _ => {}
        }
    }

    assert_eq!(snapshots, 7);
    assert_eq!(handle.await.unwrap().unwrap(), 7);
    drop(dir);
}
