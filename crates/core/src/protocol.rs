//! Agent RTM Wire Protocol
//!
//! This module defines the JSON envelopes exchanged over the real-time messaging
//! websocket and the pure functions that encode and decode them. Nothing here
//! performs I/O; the session client in `livechat-rtm` owns the connection.
//!
//! Two envelopes exist on the wire:
//! - [`Request`]: everything the agent sends (`login`, `send_event`, ...).
//! - [`Response`]: everything the server sends, both replies to requests and
//!   unsolicited pushes such as `incoming_event`.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Action names used by the bot.
pub mod action {
    pub const LOGIN: &str = "login";
    pub const INCOMING_EVENT: &str = "incoming_event";
    pub const SEND_EVENT: &str = "send_event";
}

/// Event `type` of a plain chat message.
pub const MESSAGE_EVENT: &str = "message";

/// Errors produced while encoding or decoding protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Failed to encode `{action}` request: {source}")]
    Encoding {
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to decode frame: {0}")]
    Decoding(#[from] serde_json::Error),
}

/// An outbound request envelope.
///
/// `author_id` is only set when the request is sent on behalf of the bot agent
/// rather than the logged-in human agent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request<P = Value> {
    pub action: String,
    pub request_id: String,
    pub payload: P,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

impl<P> Request<P> {
    /// Builds a request with a freshly generated identifier.
    pub fn new(action: impl Into<String>, payload: P) -> Self {
        Self {
            action: action.into(),
            request_id: generate_request_id(),
            payload,
            author_id: None,
        }
    }

    /// Marks the request as authored by the given bot agent.
    pub fn as_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }
}

/// Generates a random request identifier rendered as a decimal string.
///
/// Identifiers are not guaranteed unique; callers that correlate responses
/// must handle the (unlikely) collision themselves.
pub fn generate_request_id() -> String {
    rand::random::<u64>().to_string()
}

/// An inbound envelope: a reply to a request or a server push.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub action: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl Response {
    /// `true` only when the server explicitly reported `success: false`.
    pub fn is_failure(&self) -> bool {
        self.success == Some(false)
    }

    /// Extracts the `payload.error` object of a failed response, if present.
    pub fn error(&self) -> Option<ResponseError> {
        self.payload
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok())
    }

    /// Decodes the opaque payload into an action-specific schema.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(T::deserialize(&self.payload)?)
    }
}

/// Error details attached to a `success: false` response.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ResponseError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// Payload of the `login` request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoginPayload {
    pub token: String,
}

impl LoginPayload {
    /// Wraps a raw access token into the `Bearer <token>` form the server expects.
    pub fn bearer(access_token: &str) -> Self {
        Self {
            token: format!("Bearer {access_token}"),
        }
    }
}

/// Payload of an `incoming_event` push.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct IncomingEvent {
    pub chat_id: String,
    #[serde(default)]
    pub thread_id: String,
    pub event: Event,
}

/// A single chat event as delivered by the server.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Event {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub recipients: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author_id: String,
}

impl IncomingEvent {
    /// Returns the chat message carried by this event, if it is one.
    pub fn as_message(&self) -> Option<ChatMessage<'_>> {
        (self.event.kind == MESSAGE_EVENT).then(|| ChatMessage {
            chat_id: &self.chat_id,
            thread_id: &self.thread_id,
            text: &self.event.text,
            author_id: &self.event.author_id,
        })
    }
}

/// A borrowed view of an incoming chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatMessage<'a> {
    pub chat_id: &'a str,
    pub thread_id: &'a str,
    pub text: &'a str,
    pub author_id: &'a str,
}

/// Payload of the `send_event` request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SendEventPayload {
    pub chat_id: String,
    pub attach_to_last_thread: bool,
    pub event: OutgoingEvent,
}

/// The event body posted by `send_event`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutgoingEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub recipients: String,
    pub author_id: String,
}

impl SendEventPayload {
    /// A text message visible to everyone in the chat, attached to its last thread.
    pub fn message(chat_id: &str, text: &str, author_id: &str) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            attach_to_last_thread: true,
            event: OutgoingEvent {
                kind: MESSAGE_EVENT.to_string(),
                text: text.to_string(),
                recipients: "all".to_string(),
                author_id: author_id.to_string(),
            },
        }
    }
}

/// Serializes a request envelope into a text frame.
pub fn encode_request<P: Serialize>(request: &Request<P>) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(|source| ProtocolError::Encoding {
        action: request.action.clone(),
        source,
    })
}

/// Parses a text frame into a response envelope.
pub fn decode_response(raw: &str) -> Result<Response, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}

/// Decodes the payload of an `incoming_event` response.
pub fn decode_incoming_event(response: &Response) -> Result<IncomingEvent, ProtocolError> {
    response.payload_as()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde_json::json;

    #[test]
    fn request_omits_author_unless_sent_as_bot() {
        let req = Request::new(action::LOGIN, LoginPayload::bearer("abc"));
        let raw = encode_request(&req).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["action"], "login");
        assert_eq!(value["payload"]["token"], "Bearer abc");
        assert!(!value["request_id"].as_str().unwrap().is_empty());
        assert!(value.get("author_id").is_none());

        let raw = encode_request(&req.as_author("BOT1")).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["author_id"], "BOT1");
    }

    #[test]
    fn request_payload_survives_a_trip_through_the_wire() {
        let payload = SendEventPayload::message("C1", "hello", "BOT1");
        let req = Request::new(action::SEND_EVENT, payload.clone()).as_author("BOT1");
        let raw = encode_request(&req).unwrap();

        let decoded: Request<SendEventPayload> = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.action, action::SEND_EVENT);
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded.request_id, req.request_id);
    }

    #[test]
    fn unserializable_payload_is_an_encoding_error() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("nope"))
            }
        }

        let err = encode_request(&Request::new("send_event", Broken)).unwrap_err();
        assert!(matches!(err, ProtocolError::Encoding { ref action, .. } if action == "send_event"));
    }

    #[test]
    fn response_optional_fields_default() {
        let res = decode_response(r#"{"action":"incoming_event","payload":{}}"#).unwrap();
        assert_eq!(res.request_id, None);
        assert_eq!(res.kind, "");
        assert_eq!(res.success, None);
        assert!(!res.is_failure());
    }

    #[test]
    fn failed_response_exposes_error_details() {
        let res = decode_response(
            r#"{"request_id":"7","action":"login","type":"response","success":false,
                "payload":{"error":{"type":"authentication","message":"Invalid access token"}}}"#,
        )
        .unwrap();
        assert!(res.is_failure());
        let error = res.error().unwrap();
        assert_eq!(error.kind, "authentication");
        assert_eq!(error.message, "Invalid access token");
    }

    #[test]
    fn malformed_or_incomplete_frames_fail_to_decode() {
        assert!(matches!(
            decode_response("{not json"),
            Err(ProtocolError::Decoding(_))
        ));
        // `action` is required.
        assert!(decode_response(r#"{"type":"push"}"#).is_err());
    }

    #[test]
    fn incoming_message_event_decodes() {
        let res = decode_response(
            &json!({
                "action": "incoming_event",
                "type": "push",
                "payload": {
                    "chat_id": "C1",
                    "thread_id": "T1",
                    "event": {
                        "id": "E1",
                        "order": 3,
                        "timestamp": 1_700_000_000u64,
                        "recipients": "all",
                        "type": "message",
                        "text": "I want pizza now",
                        "author_id": "U42"
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        let event = decode_incoming_event(&res).unwrap();
        let msg = event.as_message().unwrap();
        assert_eq!(msg.chat_id, "C1");
        assert_eq!(msg.thread_id, "T1");
        assert_eq!(msg.text, "I want pizza now");
        assert_eq!(msg.author_id, "U42");
        assert_eq!(event.event.order, Some(3));
    }

    #[test]
    fn non_message_events_are_not_messages() {
        let event: IncomingEvent = serde_json::from_value(json!({
            "chat_id": "C1",
            "event": { "type": "file", "author_id": "U1" }
        }))
        .unwrap();
        assert!(event.as_message().is_none());
    }

    #[test]
    fn incoming_event_without_chat_id_is_rejected() {
        let res = decode_response(
            r#"{"action":"incoming_event","payload":{"event":{"type":"message"}}}"#,
        )
        .unwrap();
        assert!(decode_incoming_event(&res).is_err());
    }
}
