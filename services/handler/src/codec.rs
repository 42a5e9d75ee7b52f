//! Protocol dispatch: raw channel bytes in, handler invocations out.
//!
//! Filtering happens here, in order: undecodable envelopes are dropped
//! with a log line, the handler's own messages are dropped (the channel
//! loops every publish back), and envelopes without the shared token are
//! dropped silently.

use std::sync::Arc;

use tracing::{debug, warn};

use droplets_protocol::{
    Action, CreateRequest, DeleteRequest, DropletEntity, Envelope, HANDLER_SENDER,
};

use crate::handler::Handler;

/// Decode one message and fan it out to the handler.
pub async fn dispatch(handler: &Arc<Handler>, raw: &[u8]) {
    let envelope = match Envelope::decode(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable message");
            return;
        }
    };

    if envelope.sender == HANDLER_SENDER {
        return;
    }
    if envelope.token != handler.config().token {
        return;
    }

    match envelope.action {
        Action::Create => match envelope.data_as::<CreateRequest>() {
            Ok(CreateRequest { template, data }) => {
                let handler = Arc::clone(handler);
                tokio::spawn(async move {
                    handler.on_create(&template, data).await;
                });
            }
            Err(e) => warn!(error = %e, "Dropping malformed create data"),
        },
        Action::Delete => match envelope.data_as::<DeleteRequest>() {
            Ok(request) => handler.on_delete(&request.identifier).await,
            Err(e) => warn!(error = %e, "Dropping malformed delete data"),
        },
        Action::Identify => match envelope.data_as::<DropletEntity>() {
            Ok(entity) => handler.on_identify(&envelope.sender, &entity).await,
            Err(e) => warn!(error = %e, "Dropping malformed identify data"),
        },
        Action::Query => handler.on_query().await,
        Action::Other(code) => debug!(code = %code, "Dropping unknown action"),
    }
}
