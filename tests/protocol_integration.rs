use agentmesh::{Message, MessageKind, MessageValidator, Payload, Priority, ValidationError};
use serde_json::json;

fn payload(pairs: &[(&str, serde_json::Value)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_messages_survive_json_round_trip() {
    let messages = vec![
        Message::request("a", "b", payload(&[("code", json!("for(;;){}"))])),
        Message::notification("a", "b", Payload::new()).with_priority(Priority::Low),
        Message::create(
            "b",
            "a",
            MessageKind::Response,
            payload(&[("status", json!("success")), ("result", json!({"n": [1, 2]}))]),
            Priority::High,
            Some("01HZX".to_string()),
        ),
    ];

    for message in messages {
        let decoded = Message::from_json(&message.to_json().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert!(MessageValidator::is_valid(&decoded));
    }
}

#[test]
fn test_response_correlates_to_request() {
    let request = Message::request("client", "server", Payload::new()).with_priority(Priority::High);
    let response = request.create_response("server", payload(&[("status", json!("success"))]));

    assert_eq!(response.correlation_id.as_deref(), Some(request.id.as_str()));
    assert_eq!(response.receiver_id, "client");
    assert_eq!(response.priority, Priority::High);
    assert_eq!(MessageValidator::validate(&response), Ok(()));

    let orphan = Message::new("server", "client", MessageKind::Response, Payload::new());
    assert_eq!(
        MessageValidator::validate(&orphan),
        Err(ValidationError::MissingCorrelationId)
    );
    let blank = orphan.with_correlation_id("");
    assert!(!MessageValidator::is_valid(&blank));
}

#[test]
fn test_wire_form_uses_lowercase_names() {
    let message = Message::notification("a", "b", Payload::new());
    let value = message.to_value().unwrap();
    assert_eq!(value["kind"], json!("notification"));
    assert_eq!(value["priority"], json!("medium"));
    assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
}
