//! Body classification and the streaming decision.
//!
//! Every body that passes through the relay is classified exactly once into
//! a [`Payload`]. The classification never fails: anything that is not JSON
//! is kept as text, so the recorder always has a best-effort representation.

use serde::{Serialize, Serializer};
use serde_json::Value;

/// A request or response body as seen by the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No body at all
    Empty,
    /// Body that is not valid JSON (decoded permissively)
    Text(String),
    /// Body that parsed as JSON
    Json(Value),
}

impl Payload {
    /// Classify raw body bytes.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected.
    pub fn classify(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }

        let text = String::from_utf8_lossy(bytes);
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(text.into_owned()),
        }
    }

    /// Returns true if the body asks for a streamed response.
    ///
    /// Only a JSON object whose `stream` field is the boolean `true` counts.
    /// `"stream": "true"`, `"stream": 1`, arrays, text and empty bodies all
    /// select the buffered relay.
    pub fn wants_stream(&self) -> bool {
        match self {
            Self::Json(Value::Object(fields)) => matches!(fields.get("stream"), Some(Value::Bool(true))),
            _ => false,
        }
    }

    /// Returns true for [`Payload::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Text view, if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// JSON view, if this payload parsed.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Convert to a plain JSON value: `null`, a string, or the parsed data.
    pub fn into_value(self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(text) => Value::String(text),
            Self::Json(value) => value,
        }
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_none(),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Json(value) => value.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_classify_empty() {
        assert_eq!(Payload::classify(b""), Payload::Empty);
    }

    #[test]
    fn test_classify_json() {
        let payload = Payload::classify(br#"{"model":"x","stream":false}"#);
        assert_eq!(payload, Payload::Json(json!({"model": "x", "stream": false})));
    }

    #[test]
    fn test_classify_text_fallback() {
        let payload = Payload::classify(b"plain text body");
        assert_eq!(payload.as_text(), Some("plain text body"));
    }

    #[test]
    fn test_classify_invalid_utf8_is_lossy() {
        let payload = Payload::classify(&[b'o', b'k', 0xff, 0xfe]);
        assert_eq!(payload.as_text(), Some("ok\u{fffd}\u{fffd}"));
    }

    #[test]
    fn test_wants_stream() {
        assert!(Payload::Json(json!({"stream": true})).wants_stream());
        assert!(Payload::Json(json!({"model": "x", "stream": true})).wants_stream());

        assert!(!Payload::Json(json!({"stream": false})).wants_stream());
        assert!(!Payload::Json(json!({"model": "gpt-4"})).wants_stream());
        assert!(!Payload::Empty.wants_stream());
        assert!(!Payload::Text("string body".into()).wants_stream());
    }

    #[test]
    fn test_wants_stream_requires_boolean() {
        assert!(!Payload::Json(json!({"stream": "true"})).wants_stream());
        assert!(!Payload::Json(json!({"stream": 1})).wants_stream());
        assert!(!Payload::Json(json!([{"stream": true}])).wants_stream());
        assert!(!Payload::Json(json!({"options": {"stream": true}})).wants_stream());
    }

    #[test]
    fn test_serialize_shapes() {
        assert_eq!(serde_json::to_value(Payload::Empty).unwrap(), Value::Null);
        assert_eq!(
            serde_json::to_value(Payload::Text("hi".into())).unwrap(),
            json!("hi")
        );
        assert_eq!(
            serde_json::to_value(Payload::Json(json!({"ok": true}))).unwrap(),
            json!({"ok": true})
        );
    }

    proptest! {
        #[test]
        fn prop_only_literal_true_streams(
            stream in prop_oneof![
                Just(json!(true)),
                Just(json!(false)),
                Just(Value::Null),
                any::<i64>().prop_map(|n| json!(n)),
                "[a-z]{0,6}".prop_map(|s| json!(s)),
            ],
            model in "[a-z0-9-]{1,12}",
        ) {
            let payload = Payload::Json(json!({"model": model, "stream": stream.clone()}));
            prop_assert_eq!(payload.wants_stream(), stream == Value::Bool(true));
        }

        #[test]
        fn prop_text_never_streams(body in "\\PC{0,64}") {
            let payload = Payload::classify(body.as_bytes());
            if payload.as_json().is_none() {
                prop_assert!(!payload.wants_stream());
            }
        }
    }
}
