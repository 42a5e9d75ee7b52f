//! # droplets-protocol
//!
//! Wire protocol for the droplets control channel.
//!
//! Every participant on the channel (the handler, the routing proxy, and
//! the droplets themselves) exchanges JSON envelopes over a single pub/sub
//! channel. An envelope carries:
//!
//! - an action code (`a`): create / delete / identify / query
//! - a sender tag (`s`): `#` for the handler, the droplet identifier for
//!   droplets, any other tag for peers
//! - action-specific data (`d`)
//! - the shared channel token (`t`)
//!
//! ## Design Principles
//!
//! - Envelopes decode without knowledge of the action: unknown action codes
//!   are preserved, not rejected, so newer peers can speak on the channel
//! - Action data stays raw JSON until the action is known
//! - Key names are single characters

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::ProtocolError;
pub use types::*;
