//! Droplet lifecycle coordinator.
//!
//! The handler owns everything the lifecycle touches: the template
//! catalogue, the registry, the bus publisher, the materializer, and the
//! internal-id counter. One value, built in `main`, passed to every loop.
//!
//! Lifecycle of a droplet:
//! - `on_create` registers it, materializes it, boots it, and arms the
//!   reaper
//! - `on_identify` flips its identified flag when it proves liveness
//! - `destroy` (from a bus delete, the reaper, or shutdown) announces if
//!   self-initiated, waits out the grace delay, then removes and tears
//!   down

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use droplets_protocol::{Action, DropletEntity, Envelope, QueryReply, HANDLER_SENDER};

use crate::bus::Bus;
use crate::config::Config;
use crate::droplet::Droplet;
use crate::host;
use crate::materializer::Materializer;
use crate::registry::Registry;
use crate::template::Template;

/// Destruction failure: the droplet was gone before the destroy started.
#[derive(Debug, Error)]
pub enum DestroyError {
    #[error("droplet {identifier} no longer exists")]
    AlreadyDeleted { identifier: String },
}

/// The node-local droplet handler.
pub struct Handler {
    config: Config,
    templates: Vec<Arc<Template>>,
    registry: Registry,
    bus: Arc<dyn Bus>,
    materializer: Arc<dyn Materializer>,
    advertised_ip: String,
    next_internal_id: AtomicU64,
}

impl Handler {
    pub fn new(
        config: Config,
        templates: Vec<Template>,
        bus: Arc<dyn Bus>,
        materializer: Arc<dyn Materializer>,
        advertised_ip: String,
    ) -> Self {
        Self {
            config,
            templates: templates.into_iter().map(Arc::new).collect(),
            registry: Registry::new(),
            bus,
            materializer,
            advertised_ip,
            next_internal_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn template(&self, name: &str) -> Option<Arc<Template>> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .map(Arc::clone)
    }

    /// Handle a create action: register a fresh droplet, materialize and
    /// boot it, and arm the reaper.
    pub async fn on_create(self: &Arc<Self>, template_name: &str, data: String) {
        let Some(template) = self.template(template_name) else {
            debug!(template = template_name, "Ignoring create for unknown template");
            return;
        };
        info!(template = %template.name, "Starting droplet generation");

        // The port probe happens before the registry lock; registry
        // operations never wait on I/O.
        let port = match host::free_port().await {
            Ok(port) => port,
            Err(e) => {
                error!(error = %e, "Could not obtain a free port");
                return;
            }
        };

        let internal_id = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        let ip = self.advertised_ip.clone();
        let template_name = template.name.clone();
        let droplet = self
            .registry
            .allocate(&template_name, move |identifier| {
                Arc::new(Droplet::new(identifier, internal_id, template, ip, port, data))
            })
            .await;
        info!(
            identifier = %droplet.identifier(),
            internal_id,
            ip = %droplet.ip(),
            port = droplet.port(),
            "Registered droplet"
        );

        // A failed prepare or boot does not remove the droplet; the
        // artifact may still come up and identify, and the reaper
        // collects it if it never does.
        if let Err(e) = self.materializer.prepare(&droplet).await {
            error!(identifier = %droplet.identifier(), error = %e, "Error preparing droplet");
        } else if let Err(e) = self.materializer.boot(droplet.identifier()).await {
            error!(identifier = %droplet.identifier(), error = %e, "Error booting droplet");
        } else {
            info!(identifier = %droplet.identifier(), "Droplet booted");
        }

        self.arm_reaper(droplet.identifier().to_string(), internal_id);
    }

    /// Arm the identify-timeout reaper for a freshly created droplet.
    ///
    /// The reaper captures `(identifier, internal_id)`; identifiers are
    /// reused, internal ids are not, so the pair proves the droplet it
    /// finds later is still the one it was armed for.
    fn arm_reaper(self: &Arc<Self>, identifier: String, generation: u64) {
        let handler = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(handler.config.timings.identify_timeout()).await;
            let Some(current) = handler.registry.get(&identifier).await else {
                return;
            };
            if current.identified() || current.internal_id() != generation {
                return;
            }
            info!(identifier = %identifier, "No identify received in time, starting delete");
            if let Err(e) = handler.destroy(&current, true).await {
                debug!(identifier = %identifier, error = %e, "Reaped droplet was already gone");
            }
        });
    }

    /// Handle a delete action from the bus: destroy locally, without
    /// re-announcing (the announcement is what we just received).
    pub async fn on_delete(self: &Arc<Self>, identifier: &str) {
        let Some(droplet) = self.registry.get(identifier).await else {
            warn!(identifier, "Ignoring delete for unknown droplet");
            return;
        };
        let handler = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = handler.destroy(&droplet, false).await {
                debug!(error = %e, "Delete raced with another destroy");
            }
        });
    }

    /// Handle an identify from a droplet. The sender tag names the
    /// droplet; the payload endpoint is advisory (the handler chose it).
    pub async fn on_identify(&self, sender: &str, entity: &DropletEntity) {
        let Some(droplet) = self.registry.get(sender).await else {
            warn!(
                sender,
                identifier = %entity.identifier,
                "Ignoring identify for unknown droplet"
            );
            return;
        };
        droplet.mark_identified();
        info!(identifier = %droplet.identifier(), port = droplet.port(), "Droplet identified");
    }

    /// Handle a query: reply with every identified droplet.
    pub async fn on_query(&self) {
        let droplets: Vec<DropletEntity> = self
            .registry
            .snapshot()
            .await
            .iter()
            .filter(|droplet| droplet.identified())
            .map(|droplet| droplet.to_entity())
            .collect();
        self.publish(Action::Query, &QueryReply { droplets }).await;
    }

    /// Destroy a droplet.
    ///
    /// When `announce` is set (reaper and shutdown paths) the delete is
    /// published before the grace delay, giving the routing proxy the
    /// whole delay to drain clients. Bus-initiated deletes pass false so
    /// the announcement is not echoed back out.
    pub async fn destroy(&self, droplet: &Droplet, announce: bool) -> Result<(), DestroyError> {
        let identifier = droplet.identifier();
        if !self.registry.contains(identifier).await {
            return Err(DestroyError::AlreadyDeleted {
                identifier: identifier.to_string(),
            });
        }

        if announce {
            self.publish(Action::Delete, &droplet.to_entity()).await;
        }

        let delay = self.config.timings.destroy_delay();
        info!(identifier, delay_secs = delay.as_secs(), "Deleting droplet after grace delay");
        tokio::time::sleep(delay).await;

        self.registry.remove(identifier).await;
        if let Err(e) = self.materializer.destroy(identifier).await {
            // The entry is already out of the registry either way.
            error!(identifier, error = %e, "Error destroying droplet artifacts");
        }
        info!(identifier, "Deleted droplet");
        Ok(())
    }

    /// Destroy every registered droplet, announcing each so peers learn
    /// of the teardown. Runs the destroys concurrently; settling time is
    /// one grace delay, not one per droplet.
    pub async fn shutdown(self: &Arc<Self>) {
        let snapshot = self.registry.snapshot().await;
        info!(count = snapshot.len(), "Destroying all droplets");
        let destroys = snapshot.iter().map(|droplet| {
            let handler = Arc::clone(self);
            let droplet = Arc::clone(droplet);
            async move {
                if let Err(e) = handler.destroy(&droplet, true).await {
                    debug!(identifier = %droplet.identifier(), error = %e, "Droplet already destroyed");
                }
            }
        });
        futures_util::future::join_all(destroys).await;
    }

    /// Publish an envelope as the handler. Publish failures are logged,
    /// never propagated; the channel is best-effort.
    pub async fn publish<D: Serialize>(&self, action: Action, data: &D) {
        let envelope = match Envelope::new(action, HANDLER_SENDER, data, &self.config.token) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Error building payload");
                return;
            }
        };
        let encoded = match envelope.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(error = %e, "Error encoding payload");
                return;
            }
        };
        if let Err(e) = self.bus.publish(encoded).await {
            error!(error = %e, "Error publishing payload");
        }
    }
}
