//! Droplet templates.
//!
//! A template is a named recipe. The handler core reads only the name;
//! every other field flows opaquely to the materializer backend, which
//! decides what the parameters mean (memory bounds, image names, and so
//! on for the filesystem backend's boot scripts).

use serde::Deserialize;
use serde_json::{Map, Value};

/// A named droplet recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    /// The template name. Doubles as the template directory name for the
    /// filesystem backend.
    pub name: String,

    /// Backend-specific parameters the core never inspects.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Template {
    /// Whether this template can produce droplets at all.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}
