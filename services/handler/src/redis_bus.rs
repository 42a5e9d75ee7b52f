//! Redis pub/sub transport driver.
//!
//! The handler connects twice: a multiplexed connection for `PUBLISH` and
//! a dedicated connection upgraded to the subscription, since a Redis
//! connection in subscriber mode cannot issue regular commands.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use tracing::info;

use droplets_protocol::CHANNEL;

use crate::bus::{Bus, BusError, BusSubscription};
use crate::config::BusConfig;

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::Transport(e.to_string())
    }
}

/// Publisher half over a multiplexed Redis connection.
pub struct RedisBus {
    conn: redis::aio::MultiplexedConnection,
}

/// Subscription half over a dedicated pub/sub connection.
pub struct RedisSubscription {
    pubsub: redis::aio::PubSub,
}

/// Connect both halves and subscribe to the shared channel.
pub async fn connect(config: &BusConfig) -> Result<(RedisBus, RedisSubscription), BusError> {
    let client = redis::Client::open(connection_info(config))?;

    info!("Establishing publish connection");
    let conn = client.get_multiplexed_async_connection().await?;

    info!("Establishing subscription connection");
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(CHANNEL).await?;
    info!(channel = CHANNEL, "Subscribed");

    Ok((RedisBus { conn }, RedisSubscription { pubsub }))
}

fn connection_info(config: &BusConfig) -> redis::ConnectionInfo {
    let (host, port) = match config.host.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (config.host.clone(), 6379),
        },
        None => (config.host.clone(), 6379),
    };
    redis::ConnectionInfo {
        addr: redis::ConnectionAddr::Tcp(host, port),
        redis: redis::RedisConnectionInfo {
            password: (!config.auth.is_empty()).then(|| config.auth.clone()),
            ..Default::default()
        },
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, payload: String) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        // The reply is the receiver count; the handler does not care.
        let _: i64 = conn.publish(CHANNEL, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl BusSubscription for RedisSubscription {
    async fn receive(&mut self) -> Option<Result<Vec<u8>, BusError>> {
        // The message stream ends when the connection is lost; the redis
        // driver surfaces no per-message errors.
        self.pubsub
            .on_message()
            .next()
            .await
            .map(|msg| Ok(msg.get_payload_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_info_splits_host_and_port() {
        let info = connection_info(&BusConfig {
            host: "redis.internal:6380".to_string(),
            auth: String::new(),
        });
        assert_eq!(
            info.addr,
            redis::ConnectionAddr::Tcp("redis.internal".to_string(), 6380)
        );
        assert_eq!(info.redis.password, None);
    }

    #[test]
    fn connection_info_defaults_the_port() {
        let info = connection_info(&BusConfig {
            host: "redis.internal".to_string(),
            auth: "hunter2".to_string(),
        });
        assert_eq!(
            info.addr,
            redis::ConnectionAddr::Tcp("redis.internal".to_string(), 6379)
        );
        assert_eq!(info.redis.password.as_deref(), Some("hunter2"));
    }
}
