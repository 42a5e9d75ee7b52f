//! Materializer interface and mock implementation.
//!
//! The materializer abstracts the runtime artifact behind a droplet:
//! - `prepare` does all setup that must happen before boot
//! - `boot` makes the droplet start running
//! - `destroy` force-stops it and reclaims artifacts
//!
//! A mock implementation is provided for testing and development; the
//! production filesystem backend lives in [`crate::workdir`].

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::droplet::Droplet;

/// Errors from materializer backends.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("prepare failed for {identifier}: {detail}")]
    Prepare { identifier: String, detail: String },

    #[error("boot failed for {identifier}: {detail}")]
    Boot { identifier: String, detail: String },

    #[error("destroy failed for {identifier}: {detail}")]
    Destroy { identifier: String, detail: String },
}

/// Droplet runtime artifact lifecycle.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Create everything the droplet needs before boot. The droplet
    /// carries its template, endpoint, and per-instance data.
    async fn prepare(&self, droplet: &Droplet) -> Result<(), MaterializeError>;

    /// Start the prepared droplet.
    async fn boot(&self, identifier: &str) -> Result<(), MaterializeError>;

    /// Force-stop the droplet and reclaim its artifacts. Must be
    /// idempotent: destroying an already-destroyed droplet succeeds.
    async fn destroy(&self, identifier: &str) -> Result<(), MaterializeError>;
}

/// A recorded mock call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Prepare(String),
    Boot(String),
    Destroy(String),
}

/// Mock materializer for testing and development.
#[derive(Debug, Default)]
pub struct MockMaterializer {
    calls: Mutex<Vec<MockCall>>,
    fail_prepare: bool,
    fail_boot: bool,
}

impl MockMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose prepare calls all fail.
    pub fn failing_prepare() -> Self {
        Self {
            fail_prepare: true,
            ..Self::default()
        }
    }

    /// A mock whose boot calls all fail.
    pub fn failing_boot() -> Self {
        Self {
            fail_boot: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prepare_count(&self, identifier: &str) -> usize {
        self.count(|c| matches!(c, MockCall::Prepare(id) if id == identifier))
    }

    pub fn boot_count(&self, identifier: &str) -> usize {
        self.count(|c| matches!(c, MockCall::Boot(id) if id == identifier))
    }

    pub fn destroy_count(&self, identifier: &str) -> usize {
        self.count(|c| matches!(c, MockCall::Destroy(id) if id == identifier))
    }

    fn count(&self, matches: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Materializer for MockMaterializer {
    async fn prepare(&self, droplet: &Droplet) -> Result<(), MaterializeError> {
        self.record(MockCall::Prepare(droplet.identifier().to_string()));
        if self.fail_prepare {
            return Err(MaterializeError::Prepare {
                identifier: droplet.identifier().to_string(),
                detail: "mock configured to fail".to_string(),
            });
        }
        Ok(())
    }

    async fn boot(&self, identifier: &str) -> Result<(), MaterializeError> {
        self.record(MockCall::Boot(identifier.to_string()));
        if self.fail_boot {
            return Err(MaterializeError::Boot {
                identifier: identifier.to_string(),
                detail: "mock configured to fail".to_string(),
            });
        }
        Ok(())
    }

    async fn destroy(&self, identifier: &str) -> Result<(), MaterializeError> {
        self.record(MockCall::Destroy(identifier.to_string()));
        Ok(())
    }
}
