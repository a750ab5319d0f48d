// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn priority_ordering() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);

    let mut sorted = vec![Priority::Low, Priority::Critical, Priority::Normal, Priority::High];
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(sorted, Priority::ALL.to_vec());
}

#[parameterized(
    critical = { "CRITICAL", Priority::Critical },
    high = { "high", Priority::High },
    normal = { "Normal", Priority::Normal },
    low = { "LOW", Priority::Low },
)]
fn priority_from_str(input: &str, expected: Priority) {
    assert_eq!(input.parse::<Priority>().unwrap(), expected);
}

#[test]
fn priority_from_str_rejects_unknown() {
    let err = "URGENT".parse::<Priority>().unwrap_err();
    assert!(matches!(err, Error::InvalidPriority(ref s) if s == "URGENT"));
}

#[test]
fn envelope_wire_format() {
    let envelope = Envelope::new("line_status", json!({"lineId": "L1"}), 1_700_000_000_000)
        .with_priority(Priority::High);

    let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "line_status",
            "data": {"lineId": "L1"},
            "timestamp": 1_700_000_000_000u64,
            "priority": "HIGH"
        })
    );
}

#[test]
fn envelope_missing_fields_take_defaults() {
    let envelope = Envelope::from_json(r#"{"type":"alarm"}"#).unwrap();
    assert_eq!(envelope.event_type, "alarm");
    assert_eq!(envelope.data, Value::Null);
    assert_eq!(envelope.timestamp, 0);
    assert_eq!(envelope.priority, Priority::Normal);
}

#[test]
fn heartbeat_envelopes_are_transient() {
    let ping = Envelope::ping(7, 1000);
    assert_eq!(ping.event_type, "ping");
    assert_eq!(ping.data, json!({"id": 7}));
    assert_eq!(ping.priority, Priority::Critical);
    assert!(ping.is_heartbeat());
    assert!(ping.is_transient());

    assert!(Envelope::pong(7, 1000).is_transient());
    assert!(!Envelope::new("alarm", Value::Null, 0).is_transient());
}

#[test]
fn frame_parses_single_object() {
    let frame = Frame::from_json(r#"{"type":"alarm","data":{"code":3}}"#).unwrap();
    assert!(matches!(frame, Frame::Single(_)));
    assert_eq!(frame.len(), 1);
}

#[test]
fn frame_parses_array_in_order() {
    let frame = Frame::from_json(
        r#"[{"type":"a","priority":"CRITICAL"},{"type":"b"},{"type":"c","priority":"LOW"}]"#,
    )
    .unwrap();

    let types: Vec<String> = frame.into_envelopes().into_iter().map(|e| e.event_type).collect();
    assert_eq!(types, vec!["a", "b", "c"]);
}

#[test]
fn frame_from_envelopes_collapses_singletons() {
    let one = Frame::from_envelopes(vec![Envelope::new("a", Value::Null, 0)]).unwrap();
    assert!(matches!(one, Frame::Single(_)));

    let two = Frame::from_envelopes(vec![
        Envelope::new("a", Value::Null, 0),
        Envelope::new("b", Value::Null, 0),
    ])
    .unwrap();
    assert!(matches!(two, Frame::Batch(ref v) if v.len() == 2));

    assert!(Frame::from_envelopes(Vec::new()).is_err());
}

#[test]
fn frame_rejects_garbage() {
    assert!(Frame::from_json("42").is_err());
    assert!(Frame::from_json("not json").is_err());
}
