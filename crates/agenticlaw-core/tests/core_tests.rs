//! Comprehensive tests for agenticlaw-core: types and errors

use agenticlaw_core::*;

// ===========================================================================
// SessionKey
// ===========================================================================

#[test]
fn session_key_new_and_display() {
    let key = SessionKey::new("abc-123");
    assert_eq!(key.as_str(), "abc-123");
    assert_eq!(format!("{}", key), "abc-123");
}

#[test]
fn session_key_clone_is_cheap() {
    let key = SessionKey::new("test");
    let cloned = key.clone();
    assert_eq!(key, cloned);
    assert_eq!(key.as_str(), cloned.as_str());
}

#[test]
fn session_key_from_string() {
    let key: SessionKey = "hello".into();
    assert_eq!(key.as_str(), "hello");
    let key2: SessionKey = String::from("world").into();
    assert_eq!(key2.as_str(), "world");
}

#[test]
fn session_key_equality_and_hash() {
    use std::collections::HashSet;
    let a = SessionKey::new("same");
    let b = SessionKey::new("same");
    let c = SessionKey::new("different");
    assert_eq!(a, b);
    assert_ne!(a, c);
    let mut set = HashSet::new();
    set.insert(a.clone());
    assert!(set.contains(&b));
    assert!(!set.contains(&c));
}

// ===========================================================================
// Role
// ===========================================================================

#[test]
fn role_serde_roundtrip() {
    let roles = vec![Role::System, Role::User, Role::Assistant, Role::Tool];
    for role in roles {
        let json = serde_json::to_string(&role).unwrap();
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(role, back);
    }
}

#[test]
fn role_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
    assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
    assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), r#""assistant""#);
    assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), r#""tool""#);
}

// ===========================================================================
// Message
// ===========================================================================

#[test]
fn message_system_constructor() {
    let msg = Message::system("You are helpful");
    assert_eq!(msg.role, Role::System);
    assert_eq!(msg.content, "You are helpful");
    assert!(msg.tool_calls.is_none());
    assert!(msg.tool_call_id.is_none());
}

#[test]
fn message_user_constructor() {
    let msg = Message::user("Hello");
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.content, "Hello");
}

#[test]
fn message_assistant_constructor() {
    let msg = Message::assistant("Hi there");
    assert_eq!(msg.role, Role::Assistant);
    assert_eq!(msg.content, "Hi there");
}

#[test]
fn message_tool_result_constructor() {
    let msg = Message::tool_result("tc-123", "file contents");
    assert_eq!(msg.role, Role::Tool);
    assert_eq!(msg.content, "file contents");
    assert_eq!(msg.tool_call_id.as_deref(), Some("tc-123"));
}

#[test]
fn message_serde_roundtrip() {
    let msg = Message::user("test message");
    let json = serde_json::to_string(&msg).unwrap();
    let back: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(back.role, Role::User);
    assert_eq!(back.content, "test message");
}

#[test]
fn message_tool_calls_skipped_when_none() {
    let msg = Message::user("hi");
    let json = serde_json::to_string(&msg).unwrap();
    assert!(!json.contains("tool_calls"));
    assert!(!json.contains("tool_call_id"));
}

// ===========================================================================
// ToolCall
// ===========================================================================

#[test]
fn tool_call_serde() {
    let tc = ToolCall {
        id: "tc-1".into(),
        name: "read".into(),
        arguments: r#"{"path":"/tmp/foo"}"#.into(),
    };
    let json = serde_json::to_string(&tc).unwrap();
    let back: ToolCall = serde_json::from_str(&json).unwrap();
    assert_eq!(back.id, "tc-1");
    assert_eq!(back.name, "read");
}

// ===========================================================================
// ToolDefinition
// ===========================================================================

#[test]
fn tool_definition_serde() {
    let td = ToolDefinition {
        name: "exec".into(),
        description: "Run a command".into(),
        input_schema: serde_json::json!({"type": "object"}),
    };
    let json = serde_json::to_string(&td).unwrap();
    let back: ToolDefinition = serde_json::from_str(&json).unwrap();
    assert_eq!(back.name, "exec");
    assert_eq!(back.description, "Run a command");
}

// ===========================================================================
// Error
// ===========================================================================

#[test]
fn error_auth_failed() {
    let e = Error::auth_failed("bad creds");
    assert!(e.to_string().contains("bad creds"));
    assert!(matches!(e, Error::AuthFailed { .. }));
}

#[test]
fn error_llm_error() {
    let e = Error::llm_error("anthropic", "rate limited");
    assert!(e.to_string().contains("anthropic"));
    assert!(e.to_string().contains("rate limited"));
}

#[test]
fn error_tool_error() {
    let e = Error::tool_error("read", "file not found");
    assert!(e.to_string().contains("read"));
    assert!(e.to_string().contains("file not found"));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let e: Error = io_err.into();
    assert!(matches!(e, Error::IoError(_)));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let e: Error = json_err.into();
    assert!(matches!(e, Error::JsonError(_)));
}

#[test]
fn error_display_all_variants() {
    let errors: Vec<Error> = vec![
        Error::AuthFailed { reason: "x".into() },
        Error::ConnectionClosed("x".into()),
        Error::InvalidMessage("x".into()),
        Error::SessionNotFound("x".into()),
        Error::MethodNotFound("x".into()),
        Error::LlmError { provider: "p".into(), message: "m".into() },
        Error::ToolError { name: "n".into(), message: "m".into() },
        Error::ConfigError("x".into()),
        Error::Internal("x".into()),
    ];
    for e in errors {
        let _ = format!("{}", e);
    }
}
