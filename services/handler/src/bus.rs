//! Bus interface, receive loop, and in-memory implementation.
//!
//! The bus is the handler's only inbound surface: a single pub/sub
//! channel shared with the routing proxy and the droplets. The handler
//! holds two capabilities, a publisher and a subscription, mirroring the
//! two underlying transport connections.
//!
//! An in-memory implementation is provided for testing and development;
//! the production Redis driver lives in [`crate::redis_bus`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::codec;
use crate::handler::Handler;

/// Errors from bus transports.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("subscription lagged, {missed} messages dropped")]
    Lagged { missed: u64 },
}

/// Outbound half of the bus.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a message to the shared channel.
    async fn publish(&self, payload: String) -> Result<(), BusError>;
}

/// Inbound half of the bus.
#[async_trait]
pub trait BusSubscription: Send {
    /// The next message, an error, or `None` once the subscription has
    /// closed cleanly.
    async fn receive(&mut self) -> Option<Result<Vec<u8>, BusError>>;
}

/// Receive loop: feeds every message to the codec until the subscription
/// ends. A transport error logs and terminates the loop; a clean close
/// terminates it quietly. Either way the supervisor proceeds to shutdown.
pub async fn run_receive_loop(handler: Arc<Handler>, mut subscription: Box<dyn BusSubscription>) {
    while let Some(next) = subscription.receive().await {
        match next {
            Ok(raw) => codec::dispatch(&handler, &raw).await,
            Err(BusError::Lagged { missed }) => {
                // Lagging loses messages but the subscription is still up.
                error!(missed, "Bus subscription lagged");
            }
            Err(e) => {
                error!(error = %e, "Bus subscription failed");
                break;
            }
        }
    }
    info!("Bus subscription ended");
}

/// In-memory bus over a broadcast channel, for testing and development.
///
/// Every publish is delivered to every subscription, including the
/// publisher's own - the same loopback the production transport has, so
/// self-suppression is exercised for real.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<Vec<u8>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// A new subscription seeing everything published from now on.
    pub fn subscribe(&self) -> MemorySubscription {
        MemorySubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Inject a message as if a peer published it.
    pub fn inject(&self, payload: impl Into<Vec<u8>>) {
        let _ = self.tx.send(payload.into());
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, payload: String) -> Result<(), BusError> {
        // No receivers means nobody is listening yet; not an error.
        let _ = self.tx.send(payload.into_bytes());
        Ok(())
    }
}

/// Subscription half of [`MemoryBus`].
pub struct MemorySubscription {
    rx: broadcast::Receiver<Vec<u8>>,
}

#[async_trait]
impl BusSubscription for MemorySubscription {
    async fn receive(&mut self) -> Option<Result<Vec<u8>, BusError>> {
        match self.rx.recv().await {
            Ok(payload) => Some(Ok(payload)),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                Some(Err(BusError::Lagged { missed }))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
