//! Typed domain events produced by the interpreter.
//!
//! These are the shapes the rest of the application consumes. Wire-level
//! ambiguity (a `toolCalls` field that may be a JSON string or a list) is
//! resolved before a value of these types is ever constructed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation attached to an assistant message or a progress event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Arguments as the JSON text the model produced.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A chat message from the legacy dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMessage {
    pub role: MessageRole,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Progress event kinds of the typed dialect.
///
/// Kinds the client does not know are kept verbatim in [`ProgressKind::Other`] so
/// the event still reaches the observer. Only [`ProgressKind::StreamEnd`] changes
/// how a stream is handled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProgressKind {
    PlanCreated,
    PlanProgress,
    StepExecution,
    ToolCall,
    ToolResult,
    ToolResponse,
    StepCompleted,
    NodeOutput,
    StreamEnd,
    Other(String),
}

impl ProgressKind {
    /// The wire name, e.g. `STEP_EXECUTION`.
    pub fn as_str(&self) -> &str {
        match self {
            ProgressKind::PlanCreated => "PLAN_CREATED",
            ProgressKind::PlanProgress => "PLAN_PROGRESS",
            ProgressKind::StepExecution => "STEP_EXECUTION",
            ProgressKind::ToolCall => "TOOL_CALL",
            ProgressKind::ToolResult => "TOOL_RESULT",
            ProgressKind::ToolResponse => "TOOL_RESPONSE",
            ProgressKind::StepCompleted => "STEP_COMPLETED",
            ProgressKind::NodeOutput => "NODE_OUTPUT",
            ProgressKind::StreamEnd => "STREAM_END",
            ProgressKind::Other(name) => name,
        }
    }
}

impl From<String> for ProgressKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "PLAN_CREATED" => ProgressKind::PlanCreated,
            "PLAN_PROGRESS" => ProgressKind::PlanProgress,
            "STEP_EXECUTION" => ProgressKind::StepExecution,
            "TOOL_CALL" => ProgressKind::ToolCall,
            "TOOL_RESULT" => ProgressKind::ToolResult,
            "TOOL_RESPONSE" => ProgressKind::ToolResponse,
            "STEP_COMPLETED" => ProgressKind::StepCompleted,
            "NODE_OUTPUT" => ProgressKind::NodeOutput,
            "STREAM_END" => ProgressKind::StreamEnd,
            _ => ProgressKind::Other(name),
        }
    }
}

impl From<ProgressKind> for String {
    fn from(kind: ProgressKind) -> Self {
        match kind {
            ProgressKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured agent progress event from the typed dialect.
///
/// Well-known fields are lifted into typed members; anything else the server sends
/// is kept untouched in `extra` so the event can be forwarded without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_finished: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressEvent {
    /// Builds a bare event of the given kind, mostly useful in tests.
    pub fn new(kind: ProgressKind) -> Self {
        Self {
            kind,
            node: None,
            content: None,
            plan: None,
            plan_id: None,
            current_step: None,
            total_steps: None,
            percentage: None,
            is_finished: None,
            step_description: None,
            tool_calls: None,
            reasoning: None,
            result: None,
            output: None,
            message: None,
            extra: Map::new(),
        }
    }
}

/// An event delivered to a stream observer.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Message(LegacyMessage),
    Progress(ProgressEvent),
}

impl DomainEvent {
    /// Text carried by the event, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            DomainEvent::Message(message) => Some(message.content.as_str()),
            DomainEvent::Progress(event) => event.content.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_kind_wire_names() {
        let kind: ProgressKind = serde_json::from_str("\"STEP_EXECUTION\"").unwrap();
        assert_eq!(kind, ProgressKind::StepExecution);
        assert_eq!(
            serde_json::to_string(&ProgressKind::PlanCreated).unwrap(),
            "\"PLAN_CREATED\""
        );
    }

    #[test]
    fn test_unlisted_kind_round_trips_verbatim() {
        let kind: ProgressKind = serde_json::from_str("\"SOMETHING_ELSE\"").unwrap();
        assert_eq!(kind, ProgressKind::Other("SOMETHING_ELSE".to_string()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"SOMETHING_ELSE\"");
        assert_eq!(kind.to_string(), "SOMETHING_ELSE");
    }

    #[test]
    fn test_progress_event_keeps_unknown_fields() {
        let json = r#"{"type":"PLAN_PROGRESS","planId":"p-1","currentStep":2,"totalSteps":5,"percentage":40,"history":{"1":"done"}}"#;
        let event: ProgressEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.kind, ProgressKind::PlanProgress);
        assert_eq!(event.plan_id.as_deref(), Some("p-1"));
        assert_eq!(event.current_step, Some(2));
        assert_eq!(event.total_steps, Some(5));
        assert_eq!(event.percentage, Some(40.0));
        assert_eq!(event.extra["history"]["1"], "done");
    }

    #[test]
    fn test_progress_event_serializes_back_to_wire_shape() {
        let mut event = ProgressEvent::new(ProgressKind::StepExecution);
        event.node = Some("n1".to_string());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, serde_json::json!({"type": "STEP_EXECUTION", "node": "n1"}));
    }

    #[test]
    fn test_domain_event_content() {
        let message = DomainEvent::Message(LegacyMessage {
            role: MessageRole::Assistant,
            content: "hi".to_string(),
            tool_calls: vec![],
        });
        assert_eq!(message.content(), Some("hi"));
        assert_eq!(
            DomainEvent::Progress(ProgressEvent::new(ProgressKind::NodeOutput)).content(),
            None
        );
    }
}
