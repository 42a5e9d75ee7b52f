//! Typed action data, one shape per action code.

use serde::{Deserialize, Serialize};

/// Data for the `c` (create) action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Name of the template to instantiate.
    #[serde(rename = "x")]
    pub template: String,

    /// Opaque per-droplet data, relayed into the droplet.
    #[serde(rename = "v", default)]
    pub data: String,
}

/// Data for the `d` (delete) action.
///
/// The handler's own delete announcements carry the full droplet shape;
/// only the identifier matters on the inbound path, so extra fields are
/// ignored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Identifier of the droplet to delete.
    #[serde(rename = "i")]
    pub identifier: String,
}

/// A droplet as it appears on the wire: `i` (identify) data, delete
/// announcements, and the entries of a query reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropletEntity {
    /// The droplet identifier.
    #[serde(rename = "i")]
    pub identifier: String,

    /// Host address clients connect to.
    #[serde(rename = "h")]
    pub host: String,

    /// Port the droplet binds on the host.
    #[serde(rename = "p")]
    pub port: u16,

    /// Opaque per-droplet data.
    #[serde(rename = "v", default)]
    pub data: String,
}

/// Data for the handler's reply to a `q` (query) action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryReply {
    /// The currently identified droplets.
    #[serde(rename = "l")]
    pub droplets: Vec<DropletEntity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_keys() {
        let request: CreateRequest =
            serde_json::from_str(r#"{"x":"arena","v":"map=nether"}"#).unwrap();
        assert_eq!(request.template, "arena");
        assert_eq!(request.data, "map=nether");
    }

    #[test]
    fn create_request_data_is_optional() {
        let request: CreateRequest = serde_json::from_str(r#"{"x":"arena"}"#).unwrap();
        assert_eq!(request.data, "");
    }

    #[test]
    fn delete_request_ignores_droplet_shape_extras() {
        let request: DeleteRequest =
            serde_json::from_str(r#"{"i":"arena-1","h":"1.2.3.4","p":25565,"v":""}"#).unwrap();
        assert_eq!(request.identifier, "arena-1");
    }

    #[test]
    fn droplet_entity_round_trips() {
        let entity = DropletEntity {
            identifier: "arena-1".to_string(),
            host: "1.2.3.4".to_string(),
            port: 25565,
            data: "map=nether".to_string(),
        };
        let encoded = serde_json::to_string(&entity).unwrap();
        assert!(encoded.contains("\"i\":\"arena-1\""));
        assert!(encoded.contains("\"p\":25565"));
        let decoded: DropletEntity = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, entity);
    }

    #[test]
    fn query_reply_lists_droplets_under_l() {
        let reply = QueryReply {
            droplets: vec![DropletEntity {
                identifier: "arena-1".to_string(),
                host: "1.2.3.4".to_string(),
                port: 25565,
                data: String::new(),
            }],
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["l"][0]["i"], "arena-1");
    }
}
