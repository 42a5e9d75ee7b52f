//! Envelope - the common wrapper for all channel traffic.

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The pub/sub channel every participant subscribes to.
pub const CHANNEL: &str = "ch_dr";

/// The reserved sender tag of the handler.
pub const HANDLER_SENDER: &str = "#";

/// Separator between template name and ordinal in droplet identifiers.
pub const IDENTIFIER_SEPARATOR: char = '-';

/// Action code carried in the `a` field.
///
/// Unknown codes are preserved through decode/encode so that newer peers
/// can publish actions this build does not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create a droplet from a template.
    Create,
    /// Delete a droplet by identifier.
    Delete,
    /// A droplet proving liveness after boot.
    Identify,
    /// Query the set of identified droplets.
    Query,
    /// Any action code this build does not know.
    Other(String),
}

impl Action {
    /// The single-character wire code for this action.
    pub fn code(&self) -> &str {
        match self {
            Action::Create => "c",
            Action::Delete => "d",
            Action::Identify => "i",
            Action::Query => "q",
            Action::Other(code) => code,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: &str) -> Self {
        match code {
            "c" => Action::Create,
            "d" => Action::Delete,
            "i" => Action::Identify,
            "q" => Action::Query,
            other => Action::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CodeVisitor;

        impl Visitor<'_> for CodeVisitor {
            type Value = Action;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an action code string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Action, E> {
                Ok(Action::from_code(value))
            }
        }

        deserializer.deserialize_str(CodeVisitor)
    }
}

/// The envelope - common wrapper for every message on the channel.
///
/// Action data stays raw JSON until the receiver knows the action; see
/// [`Envelope::data_as`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The action. The shape of `data` depends on this.
    #[serde(rename = "a")]
    pub action: Action,

    /// The sender tag.
    #[serde(rename = "s")]
    pub sender: String,

    /// Raw action data, decoded per action.
    #[serde(rename = "d", default)]
    pub data: serde_json::Value,

    /// The shared channel token.
    #[serde(rename = "t", default)]
    pub token: String,
}

impl Envelope {
    /// Build an envelope with typed action data.
    pub fn new<D: Serialize>(
        action: Action,
        sender: impl Into<String>,
        data: &D,
        token: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            action,
            sender: sender.into(),
            data: serde_json::to_value(data).map_err(ProtocolError::Encode)?,
            token: token.into(),
        })
    }

    /// Decode an envelope from raw channel bytes.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(raw).map_err(ProtocolError::MalformedEnvelope)
    }

    /// Encode the envelope for publishing.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Decode the action data as a typed payload.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.data.clone()).map_err(|source| ProtocolError::MalformedData {
            action: self.action.code().to_string(),
            source,
        })
    }
}

/// Format a droplet identifier from a template name and ordinal.
pub fn format_identifier(template: &str, ordinal: u32) -> String {
    format!("{template}{IDENTIFIER_SEPARATOR}{ordinal}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CreateRequest;

    #[test]
    fn action_codes_round_trip() {
        for code in ["c", "d", "i", "q", "z"] {
            assert_eq!(Action::from_code(code).code(), code);
        }
        assert_eq!(Action::from_code("c"), Action::Create);
        assert_eq!(Action::from_code("zz"), Action::Other("zz".to_string()));
    }

    #[test]
    fn action_serializes_as_bare_code() {
        assert_eq!(serde_json::to_string(&Action::Create).unwrap(), "\"c\"");
        assert_eq!(serde_json::to_string(&Action::Query).unwrap(), "\"q\"");
        assert_eq!(
            serde_json::to_string(&Action::Other("x".into())).unwrap(),
            "\"x\""
        );
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = Envelope::new(
            Action::Create,
            "proxy-1",
            &CreateRequest {
                template: "arena".to_string(),
                data: "map=nether".to_string(),
            },
            "secret",
        )
        .unwrap();

        let encoded = envelope.encode().unwrap();
        let decoded = Envelope::decode(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, envelope);

        let request: CreateRequest = decoded.data_as().unwrap();
        assert_eq!(request.template, "arena");
        assert_eq!(request.data, "map=nether");
    }

    #[test]
    fn envelope_uses_single_character_keys() {
        let envelope = Envelope::new(Action::Query, HANDLER_SENDER, &(), "tok").unwrap();
        let encoded = envelope.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["a"], "q");
        assert_eq!(value["s"], "#");
        assert_eq!(value["t"], "tok");
    }

    #[test]
    fn unknown_action_decodes_and_round_trips() {
        let raw = br#"{"a":"m","s":"peer","d":{"k":1},"t":"tok"}"#;
        let envelope = Envelope::decode(raw).unwrap();
        assert_eq!(envelope.action, Action::Other("m".to_string()));

        let again = Envelope::decode(envelope.encode().unwrap().as_bytes()).unwrap();
        assert_eq!(again, envelope);
    }

    #[test]
    fn malformed_envelope_is_an_error() {
        assert!(Envelope::decode(b"not json").is_err());
    }

    #[test]
    fn missing_data_defaults_to_null() {
        let envelope = Envelope::decode(br#"{"a":"q","s":"peer","t":"tok"}"#).unwrap();
        assert!(envelope.data.is_null());
    }

    #[test]
    fn identifier_format() {
        assert_eq!(format_identifier("arena", 1), "arena-1");
        assert_eq!(format_identifier("sky-wars", 12), "sky-wars-12");
    }
}
