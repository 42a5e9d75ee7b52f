//! The droplet value object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use droplets_protocol::DropletEntity;

use crate::template::Template;

/// A managed runtime instance derived from a template.
///
/// Immutable after construction except for the identified flag, which is
/// set true exactly once when the droplet proves liveness. The internal id
/// is a generation token: identifiers are reused after removal, internal
/// ids never are.
#[derive(Debug)]
pub struct Droplet {
    identifier: String,
    internal_id: u64,
    template: Arc<Template>,
    ip: String,
    port: u16,
    data: String,
    identified: AtomicBool,
}

impl Droplet {
    pub fn new(
        identifier: String,
        internal_id: u64,
        template: Arc<Template>,
        ip: String,
        port: u16,
        data: String,
    ) -> Self {
        Self {
            identifier,
            internal_id,
            template,
            ip,
            port,
            data,
            identified: AtomicBool::new(false),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Generation token, strictly increasing in creation order.
    pub fn internal_id(&self) -> u64 {
        self.internal_id
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn identified(&self) -> bool {
        self.identified.load(Ordering::SeqCst)
    }

    /// Mark the droplet identified. Returns false if it already was.
    pub fn mark_identified(&self) -> bool {
        !self.identified.swap(true, Ordering::SeqCst)
    }

    /// The droplet as it appears on the wire.
    pub fn to_entity(&self) -> DropletEntity {
        DropletEntity {
            identifier: self.identifier.clone(),
            host: self.ip.clone(),
            port: self.port,
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_template() -> Arc<Template> {
        Arc::new(serde_json::from_str(r#"{"name":"arena"}"#).unwrap())
    }

    fn test_droplet() -> Droplet {
        Droplet::new(
            "arena-1".to_string(),
            7,
            test_template(),
            "1.2.3.4".to_string(),
            25565,
            "map=nether".to_string(),
        )
    }

    #[test]
    fn identified_flag_is_write_once() {
        let droplet = test_droplet();
        assert!(!droplet.identified());
        assert!(droplet.mark_identified());
        assert!(droplet.identified());
        // A second identify is a no-op.
        assert!(!droplet.mark_identified());
        assert!(droplet.identified());
    }

    #[test]
    fn entity_carries_endpoint_and_data() {
        let entity = test_droplet().to_entity();
        assert_eq!(entity.identifier, "arena-1");
        assert_eq!(entity.host, "1.2.3.4");
        assert_eq!(entity.port, 25565);
        assert_eq!(entity.data, "map=nether");
    }
}
