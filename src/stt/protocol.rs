//! Wire protocol for the streaming transcription service.
//!
//! Messages are JSON over a persistent duplex socket. The service opens
//! every session with a session-begin message carrying a session id;
//! afterwards the client streams base64 audio payloads and the service
//! streams transcript events.

use serde::{Deserialize, Serialize};

/// Message type sent by the service when a session opens.
pub const SESSION_BEGINS: &str = "SessionBegins";
/// Message type sent when a previous session is resumed.
pub const SESSION_RESUMED: &str = "SessionResumed";
/// Message type sent when the service terminates a session.
pub const SESSION_TERMINATED: &str = "SessionTerminated";
/// Message type carrying an in-progress transcript.
pub const PARTIAL_TRANSCRIPT: &str = "PartialTranscript";
/// Message type carrying a finalized transcript.
pub const FINAL_TRANSCRIPT: &str = "FinalTranscript";

/// Which transcript kind a link forwards to its handler.
///
/// Chosen once per link at construction, never per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    Partial,
    Final,
}

impl TranscriptKind {
    /// The service message type this kind selects.
    pub fn message_type(&self) -> &'static str {
        match self {
            TranscriptKind::Partial => PARTIAL_TRANSCRIPT,
            TranscriptKind::Final => FINAL_TRANSCRIPT,
        }
    }
}

/// Inbound service message. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceMessage {
    pub message_type: Option<String>,
    pub session_id: Option<String>,
    pub text: Option<String>,
    pub error: Option<String>,
}

impl ServiceMessage {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// True when this message carries the selected transcript kind.
    pub fn is_transcript(&self, kind: TranscriptKind) -> bool {
        self.message_type.as_deref() == Some(kind.message_type())
    }
}

/// Outbound audio payload: base64-encoded PCM.
#[derive(Debug, Serialize)]
pub struct AudioPayload {
    pub audio_data: String,
}

impl AudioPayload {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_begins() {
        let msg =
            ServiceMessage::parse(r#"{"message_type": "SessionBegins", "session_id": "abc-123"}"#)
                .unwrap();
        assert_eq!(msg.message_type.as_deref(), Some(SESSION_BEGINS));
        assert_eq!(msg.session_id.as_deref(), Some("abc-123"));
        assert!(msg.error.is_none());
    }

    #[test]
    fn test_parse_transcript_with_unknown_fields() {
        let msg = ServiceMessage::parse(
            r#"{"message_type": "FinalTranscript", "text": "hello", "confidence": 0.99}"#,
        )
        .unwrap();
        assert!(msg.is_transcript(TranscriptKind::Final));
        assert!(!msg.is_transcript(TranscriptKind::Partial));
        assert_eq!(msg.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_parse_error_message() {
        let msg = ServiceMessage::parse(r#"{"error": "quota exceeded"}"#).unwrap();
        assert_eq!(msg.error.as_deref(), Some("quota exceeded"));
        assert!(msg.message_type.is_none());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(ServiceMessage::parse("not json at all").is_err());
    }

    #[test]
    fn test_audio_payload_shape() {
        let payload = AudioPayload {
            audio_data: "AAAA".to_string(),
        };
        assert_eq!(payload.to_json().unwrap(), r#"{"audio_data":"AAAA"}"#);
    }

    #[test]
    fn test_transcript_kind_serde() {
        assert_eq!(
            serde_json::to_string(&TranscriptKind::Final).unwrap(),
            r#""final""#
        );
        let kind: TranscriptKind = serde_json::from_str(r#""partial""#).unwrap();
        assert_eq!(kind, TranscriptKind::Partial);
        assert_eq!(kind.message_type(), PARTIAL_TRANSCRIPT);
    }
}
