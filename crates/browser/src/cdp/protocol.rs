//! CDP Protocol Types
//!
//! These are the fundamental types for CDP communication.
//! Keep them minimal - add domain-specific types only when needed.
//! Navigation and dialog payloads are typed because the driver waits on them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID - monotonically increasing
pub type RequestId = u64;

/// Target ID from Chrome
pub type TargetId = String;

/// Session ID for attached targets
pub type SessionId = String;

/// CDP Request sent to browser
#[derive(Debug, Clone, Serialize)]
pub struct CDPRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// CDP Response from browser
#[derive(Debug, Clone, Deserialize)]
pub struct CDPResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CDPError>,
}

/// CDP Error
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CDPError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// CDP Event from browser (no request ID)
#[derive(Debug, Clone, Deserialize)]
pub struct CDPEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Unified CDP Message (request, response, or event)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CDPMessage {
    Response(CDPResponse),
    Event(CDPEvent),
}

/// Target Info from Target.getTargetInfo
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
}

/// Result of Target.attachToTarget
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

/// Result of Page.navigate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    pub frame_id: String,
    /// Absent for same-document navigations
    #[serde(default)]
    pub loader_id: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
}

/// Params of Page.lifecycleEvent
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub frame_id: String,
    pub loader_id: String,
    pub name: String,
}

/// Params of Page.javascriptDialogOpening
#[derive(Debug, Clone, Deserialize)]
pub struct DialogOpening {
    #[serde(rename = "type")]
    pub dialog_type: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_discrimination() {
        let response: CDPMessage =
            serde_json::from_str(r#"{"id":7,"result":{"frameTree":{}}}"#).unwrap();
        assert!(matches!(response, CDPMessage::Response(CDPResponse { id: 7, .. })));

        let event: CDPMessage = serde_json::from_str(
            r#"{"method":"Page.lifecycleEvent","params":{"frameId":"F","loaderId":"L","name":"load","timestamp":1},"sessionId":"S"}"#,
        )
        .unwrap();
        let CDPMessage::Event(event) = event else {
            panic!("expected event");
        };
        assert_eq!(event.session_id.as_deref(), Some("S"));

        let lifecycle: LifecycleEvent = serde_json::from_value(event.params.unwrap()).unwrap();
        assert_eq!(lifecycle.name, "load");
        assert_eq!(lifecycle.loader_id, "L");
    }

    #[test]
    fn test_error_response() {
        let msg: CDPMessage =
            serde_json::from_str(r#"{"id":3,"error":{"code":-32000,"message":"No node"}}"#).unwrap();
        let CDPMessage::Response(response) = msg else {
            panic!("expected response");
        };
        assert_eq!(response.error.unwrap().code, -32000);
    }

    #[test]
    fn test_request_omits_empty_fields() {
        let request = CDPRequest {
            id: 1,
            method: "Page.enable".into(),
            params: None,
            session_id: None,
        };
        assert_eq!(serde_json::to_string(&request).unwrap(), r#"{"id":1,"method":"Page.enable"}"#);
    }

    #[test]
    fn test_navigate_result_same_document() {
        let result: NavigateResult = serde_json::from_str(r#"{"frameId":"F"}"#).unwrap();
        assert!(result.loader_id.is_none());
        assert!(result.error_text.is_none());
    }
}
