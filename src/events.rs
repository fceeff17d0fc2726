use serde::Deserialize;
use serde_json::Value;

/// A JSON event received as a WebSocket text frame.
///
/// Only the kinds the client reacts to are decoded; anything else is kept
/// as [`ServerEvent::Other`] with its type name.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Executing(Executing),
    Progress(Progress),
    ExecutionError(ExecutionError),
    Status(Status),
    Other { kind: String },
}

/// `executing`: a node started, or the whole prompt finished when `node` is null.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Executing {
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub value: u32,
    #[serde(default = "one")]
    pub max: u32,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionError {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub sid: Option<String>,
}

impl Status {
    pub fn queue_remaining(&self) -> Option<u64> {
        self.status
            .pointer("/exec_info/queue_remaining")
            .and_then(Value::as_u64)
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ServerEvent {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawFrame = serde_json::from_str(text)?;
        Ok(match raw.kind.as_str() {
            "executing" => ServerEvent::Executing(serde_json::from_value(raw.data)?),
            "progress" => ServerEvent::Progress(serde_json::from_value(raw.data)?),
            "execution_error" => ServerEvent::ExecutionError(serde_json::from_value(raw.data)?),
            "status" => ServerEvent::Status(serde_json::from_value(raw.data)?),
            _ => ServerEvent::Other { kind: raw.kind },
        })
    }

    /// Prompt id the event refers to, if any.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            ServerEvent::Executing(e) => e.prompt_id.as_deref(),
            ServerEvent::Progress(p) => p.prompt_id.as_deref(),
            ServerEvent::ExecutionError(e) => e.prompt_id.as_deref(),
            ServerEvent::Status(_) | ServerEvent::Other { .. } => None,
        }
    }

    /// True only for `executing` with no active node for exactly this prompt.
    pub fn is_completion_of(&self, prompt_id: &str) -> bool {
        matches!(
            self,
            ServerEvent::Executing(Executing { node: None, prompt_id: Some(pid) }) if pid == prompt_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_frame() {
        let event =
            ServerEvent::parse(r#"{"type": "executing", "data": {"node": null, "prompt_id": "abc"}}"#)
                .unwrap();
        assert!(event.is_completion_of("abc"));
        assert!(!event.is_completion_of("other"));
        assert_eq!(event.prompt_id(), Some("abc"));
    }

    #[test]
    fn test_node_frame_is_never_completion() {
        let event =
            ServerEvent::parse(r#"{"type": "executing", "data": {"node": "1", "prompt_id": "abc"}}"#)
                .unwrap();
        assert!(!event.is_completion_of("abc"));
    }

    #[test]
    fn test_completion_without_prompt_id_matches_nothing() {
        let event = ServerEvent::parse(r#"{"type": "executing", "data": {"node": null}}"#).unwrap();
        assert!(!event.is_completion_of(""));
    }

    #[test]
    fn test_progress_frame() {
        let event = ServerEvent::parse(
            r#"{"type": "progress", "data": {"value": 3, "max": 20, "prompt_id": "abc", "node": "3"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Progress(p) => {
                assert_eq!(p.value, 3);
                assert_eq!(p.max, 20);
                assert_eq!(p.node.as_deref(), Some("3"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_execution_error_frame() {
        let event = ServerEvent::parse(
            r#"{"type": "execution_error", "data": {"prompt_id": "abc", "node_id": "4", "exception_message": "OOM"}}"#,
        )
        .unwrap();
        assert_eq!(event.prompt_id(), Some("abc"));
        assert!(matches!(event, ServerEvent::ExecutionError(ref e) if e.exception_message == "OOM"));
    }

    #[test]
    fn test_status_frame() {
        let event = ServerEvent::parse(
            r#"{"type": "status", "data": {"status": {"exec_info": {"queue_remaining": 2}}, "sid": "me"}}"#,
        )
        .unwrap();
        match event {
            ServerEvent::Status(s) => assert_eq!(s.queue_remaining(), Some(2)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind() {
        let event =
            ServerEvent::parse(r#"{"type": "execution_cached", "data": {"nodes": []}}"#).unwrap();
        assert_eq!(event, ServerEvent::Other { kind: "execution_cached".into() });
    }

    #[test]
    fn test_malformed_frames() {
        assert!(ServerEvent::parse("not json").is_err());
        assert!(ServerEvent::parse(r#"{"data": {}}"#).is_err());
    }
}
