use crate::transport::{Query, query_from};
use agentflow_core::Dialect;

/// A server-push endpoint and the payload dialect it speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub name: &'static str,
    pub path: &'static str,
    pub dialect: Dialect,
    /// Event name the server labels its frames with, when it labels them at all.
    pub event_name: Option<&'static str>,
}

impl StreamEndpoint {
    /// Plain chat replies as `{role, content, toolCalls}` messages.
    pub const LEGACY_CHAT: StreamEndpoint = StreamEndpoint {
        name: "legacy-chat",
        path: "/ai/agent/react",
        dialect: Dialect::Legacy,
        event_name: None,
    };

    /// Reason-and-act agent progress.
    pub const REACT_AGENT: StreamEndpoint = StreamEndpoint {
        name: "react-agent",
        path: "/ai/agent/react",
        dialect: Dialect::Typed,
        event_name: Some("react-agent"),
    };

    /// Planning agent progress: plan, then one step at a time.
    pub const PLAN_EXECUTE: StreamEndpoint = StreamEndpoint {
        name: "plan-execute",
        path: "/ai/agent/plan-execute",
        dialect: Dialect::Typed,
        event_name: Some("plan-execute"),
    };

    /// Execution of a saved agent flow, node by node.
    pub const AGENT_FLOW: StreamEndpoint = StreamEndpoint {
        name: "agent-flow",
        path: "/agent-flow/execute/stream",
        dialect: Dialect::Typed,
        event_name: None,
    };

    /// Whether a frame labelled `event_name` looks like it came from this
    /// endpoint. Unlabelled frames and unlabelled endpoints always match.
    pub fn expects_event(&self, event_name: Option<&str>) -> bool {
        match (self.event_name, event_name) {
            (Some(expected), Some(actual)) => expected == actual,
            _ => true,
        }
    }
}

/// Query parameters for opening a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamQuery(Query);

impl StreamQuery {
    /// `prompt` plus an optional conversation to continue.
    pub fn chat(prompt: &str, conversation_id: Option<&str>) -> Self {
        Self(query_from([
            ("prompt", Some(prompt)),
            ("conversationId", conversation_id),
        ]))
    }

    pub fn flow(flow_id: &str, prompt: &str) -> Self {
        Self(query_from([("flowId", Some(flow_id)), ("prompt", Some(prompt))]))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}
