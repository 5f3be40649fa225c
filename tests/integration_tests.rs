// tests/integration_tests.rs
//! Integration tests for the scripting bridge

use hookscript::{BudgetConfig, HostValue, ScriptError, Session};

fn mapping(entries: &[(&str, HostValue)]) -> HostValue {
    HostValue::Mapping(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

#[test]
fn test_script_reads_context_values() {
    let mut session = Session::new();
    session
        .set("amount", HostValue::Number(5000.0))
        .set("currency", HostValue::text("EUR"));

    let result = session
        .run("return currency .. ':' .. amount")
        .unwrap();

    assert_eq!(result, HostValue::text("EUR:5000"));
}

#[test]
fn test_mapping_round_trip() {
    let mut session = Session::new();
    session.set(
        "payload",
        mapping(&[
            ("action", HostValue::text("opened")),
            ("number", HostValue::Number(7.0)),
            ("draft", HostValue::Bool(false)),
        ]),
    );

    let result = session.run("return payload").unwrap();

    assert_eq!(
        result,
        mapping(&[
            ("action", HostValue::text("opened")),
            ("number", HostValue::Number(7.0)),
            ("draft", HostValue::Bool(false)),
        ])
    );
}

#[test]
fn test_script_can_inspect_mapping_fields() {
    let mut session = Session::new();
    session.set(
        "payload",
        mapping(&[
            ("action", HostValue::text("opened")),
            ("number", HostValue::Number(7.0)),
        ]),
    );

    let result = session
        .run("return payload.action == 'opened' and payload.number > 5")
        .unwrap();

    assert_eq!(result, HostValue::Bool(true));
}

#[test]
fn test_sequence_round_trip() {
    let mut session = Session::new();
    session.set(
        "labels",
        HostValue::Sequence(vec![
            HostValue::text("bug"),
            HostValue::text("urgent"),
            HostValue::text("backend"),
        ]),
    );

    let result = session.run("return labels").unwrap();

    assert_eq!(
        result,
        HostValue::Sequence(vec![
            HostValue::text("bug"),
            HostValue::text("urgent"),
            HostValue::text("backend"),
        ])
    );
}

#[test]
fn test_sequence_indexing_starts_at_one() {
    let mut session = Session::new();
    session.set(
        "labels",
        HostValue::Sequence(vec![HostValue::text("bug"), HostValue::text("urgent")]),
    );

    assert_eq!(
        session.run("return labels[1]").unwrap(),
        HostValue::text("bug")
    );
    assert_eq!(
        session.run("return labels[2]").unwrap(),
        HostValue::text("urgent")
    );
}

#[test]
fn test_sequence_truncates_at_falsy_element() {
    let mut session = Session::new();
    session.set(
        "values",
        HostValue::Sequence(vec![
            HostValue::Number(1.0),
            HostValue::Number(0.0),
            HostValue::Number(3.0),
        ]),
    );

    // Zero is falsy on the host side, so decoding stops before it
    let result = session.run("return values").unwrap();
    assert_eq!(result, HostValue::Sequence(vec![HostValue::Number(1.0)]));
}

#[test]
fn test_nested_containers_round_trip() {
    let mut session = Session::new();
    session.set(
        "event",
        mapping(&[
            ("name", HostValue::text("push")),
            (
                "commits",
                HostValue::Sequence(vec![
                    mapping(&[("id", HostValue::text("abc"))]),
                    mapping(&[("id", HostValue::text("def"))]),
                ]),
            ),
        ]),
    );

    let result = session.run("return event").unwrap();

    match result {
        HostValue::Mapping(map) => {
            assert_eq!(map.get("name"), Some(&HostValue::text("push")));
            match map.get("commits") {
                Some(HostValue::Sequence(commits)) => {
                    assert_eq!(commits.len(), 2);
                    assert_eq!(commits[1], mapping(&[("id", HostValue::text("def"))]));
                }
                other => panic!("Expected sequence of commits, got {:?}", other),
            }
        }
        other => panic!("Expected mapping, got {:?}", other),
    }
}

#[test]
fn test_host_function_dispatch() {
    let mut session = Session::new();
    session.set_fn("add", |args| {
        match (args.first(), args.get(1)) {
            (Some(HostValue::Number(a)), Some(HostValue::Number(b))) => HostValue::Number(a + b),
            _ => HostValue::Absent,
        }
    });

    let result = session.run("return add(2, 3)").unwrap();
    assert_eq!(result, HostValue::Number(5.0));
}

#[test]
fn test_host_function_inside_mapping() {
    let mut session = Session::new();
    session.set(
        "issue",
        mapping(&[
            ("number", HostValue::Number(42.0)),
            (
                "close",
                HostValue::function(|_| HostValue::text("closed")),
            ),
        ]),
    );

    let result = session.run("return issue.close()").unwrap();
    assert_eq!(result, HostValue::text("closed"));
}

#[test]
fn test_guest_function_promotes_and_invokes() {
    let mut session = Session::new();
    let result = session
        .run("return function(n) return n * 2 end")
        .unwrap();

    assert_eq!(
        result.call(vec![HostValue::Number(3.0)]),
        HostValue::Number(6.0)
    );
    assert_eq!(
        result.call(vec![HostValue::Number(5.0)]),
        HostValue::Number(10.0)
    );
}

#[test]
fn test_promoted_function_sees_later_global_state() {
    let mut session = Session::new();
    let counter = session
        .run("count = 0 return function() count = count + 1 return count end")
        .unwrap();

    assert_eq!(counter.call(vec![]), HostValue::Number(1.0));
    assert_eq!(counter.call(vec![]), HostValue::Number(2.0));

    // The global mutated by the callback is visible to later runs
    assert_eq!(session.run("return count").unwrap(), HostValue::Number(2.0));
}

#[test]
fn test_promoted_functions_are_independent() {
    let mut session = Session::new();
    let pair = session
        .run("return { inc = function(n) return n + 1 end, dec = function(n) return n - 1 end }")
        .unwrap();

    let HostValue::Mapping(map) = pair else {
        panic!("Expected mapping of functions");
    };

    let five = vec![HostValue::Number(5.0)];
    assert_eq!(map["inc"].call(five.clone()), HostValue::Number(6.0));
    assert_eq!(map["dec"].call(five), HostValue::Number(4.0));
}

#[test]
fn test_guest_error_in_callback_is_contained() {
    let mut session = Session::new();
    let boom = session
        .run("return function() error('bad input') end")
        .unwrap();

    // The failure is swallowed at the bridge, not propagated
    assert_eq!(boom.call(vec![]), HostValue::Absent);

    // The session keeps working afterwards
    assert_eq!(session.run("return 1").unwrap(), HostValue::Number(1.0));
    assert_eq!(session.stack_depth(), 0);
}

#[test]
fn test_callback_with_no_return_is_absent() {
    let mut session = Session::new();
    let silent = session.run("return function() end").unwrap();

    assert_eq!(silent.call(vec![]), HostValue::Absent);
}

#[test]
fn test_callback_receives_marshalled_arguments() {
    let mut session = Session::new();
    let describe = session
        .run("return function(m) return m.kind .. '/' .. m.items[1] end")
        .unwrap();

    let arg = mapping(&[
        ("kind", HostValue::text("push")),
        (
            "items",
            HostValue::Sequence(vec![HostValue::text("first")]),
        ),
    ]);

    assert_eq!(describe.call(vec![arg]), HostValue::text("push/first"));
}

#[test]
fn test_stack_balanced_across_runs() {
    let mut session = Session::new();
    session.set("x", HostValue::Number(1.0));

    for _ in 0..50 {
        session.run("return { x, x + 1, name = 'y' }").unwrap();
        assert_eq!(session.stack_depth(), 0);
    }
}

#[test]
fn test_stack_balanced_after_failures() {
    let mut session = Session::new();

    session.run("return (").unwrap_err();
    assert_eq!(session.stack_depth(), 0);

    session.run("error('x')").unwrap_err();
    assert_eq!(session.stack_depth(), 0);
}

#[test]
fn test_run_without_return_is_absent() {
    let mut session = Session::new();
    session.set_fn("notify", |_| HostValue::Absent);

    let result = session.run("notify('hello')").unwrap();
    assert_eq!(result, HostValue::Absent);
}

#[test]
fn test_parse_error_is_typed() {
    let mut session = Session::new();
    let err = session.run("if then end").unwrap_err();
    assert!(matches!(err, ScriptError::Parse(_)));
}

#[test]
fn test_runtime_error_is_typed() {
    let mut session = Session::new();
    let err = session.run("return 1 + 'x'").unwrap_err();
    match err {
        ScriptError::Runtime(msg) => assert!(msg.contains("arithmetic")),
        other => panic!("Expected runtime error, got {:?}", other),
    }
}

#[test]
fn test_budget_exhaustion_is_typed() {
    let budget = BudgetConfig {
        max_steps: 10_000,
        ..BudgetConfig::default()
    };
    let mut session = Session::with_budget(budget);

    let err = session.run("while true do end").unwrap_err();
    assert!(matches!(err, ScriptError::BudgetExhausted(10_000)));

    // The session survives exhaustion
    assert_eq!(session.run("return 1").unwrap(), HostValue::Number(1.0));
}

#[test]
fn test_budget_config_deserializes_with_defaults() {
    let budget: BudgetConfig = serde_json::from_str(r#"{"max_steps": 500}"#).unwrap();
    assert_eq!(budget.max_steps, 500);
    assert_eq!(budget.max_call_depth, BudgetConfig::default().max_call_depth);
}

#[test]
fn test_json_payload_scenario() {
    let payload: serde_json::Value = serde_json::from_str(
        r#"{
            "action": "labeled",
            "issue": { "number": 12, "title": "crash on start" },
            "label": { "name": "bug" }
        }"#,
    )
    .unwrap();

    let mut session = Session::new();
    session.set("event", HostValue::from_json(&payload));
    session.set_fn("reply", |args| {
        match args.first() {
            Some(HostValue::Text(s)) => HostValue::text(format!("sent: {}", s)),
            _ => HostValue::Absent,
        }
    });

    let result = session
        .run(
            r#"
            if event.action == 'labeled' and event.label.name == 'bug' then
                return reply('issue #' .. event.issue.number .. ' triaged')
            end
            "#,
        )
        .unwrap();

    assert_eq!(result, HostValue::text("sent: issue #12 triaged"));
}

#[test]
fn test_opaque_handle_round_trip() {
    let mut session = Session::new();
    session.set("handle", HostValue::Opaque(99));

    // Opaque values pass through untouched and cannot be inspected
    assert_eq!(session.run("return handle").unwrap(), HostValue::Opaque(99));
    assert_eq!(
        session.run("return type(handle)").unwrap(),
        HostValue::text("userdata")
    );
}

#[test]
fn test_absent_context_entry_binds_nothing() {
    let mut session = Session::new();
    session.set("ghost", HostValue::Absent);

    assert_eq!(
        session.run("return ghost == nil").unwrap(),
        HostValue::Bool(true)
    );
}
