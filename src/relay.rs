use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::options::RedisConnection;
use crate::protocol::messages::{EventMessage, RelayEnvelope};
use crate::registry::ConnectionRegistry;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Standing subscriber on the backend pub/sub channel. Every message is an
/// envelope `{event, message, room?}`: with `room` set it is delivered to
/// that room's current members, without it to every connected socket. Each
/// message is forwarded immediately and independently; there is no batching
/// or backpressure.
pub struct EventRelay {
    client: redis::Client,
    channel: String,
    registry: Arc<ConnectionRegistry>,
}

impl EventRelay {
    pub fn new(options: &RedisConnection, registry: Arc<ConnectionRegistry>) -> Result<Self> {
        let client = redis::Client::open(options.connection_url())?;
        Ok(Self {
            client,
            channel: options.channel.clone(),
            registry,
        })
    }

    /// Subscribes and spawns the forwarding loop. The initial connection
    /// failure is returned to the caller so a bad broker address fails
    /// startup; drops after that reconnect with a fixed delay.
    pub async fn start(&self) -> Result<()> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&[self.channel.as_str()]).await?;
        info!(channel = %self.channel, "listening on event channel");

        let client = self.client.clone();
        let channel = self.channel.clone();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            loop {
                {
                    let mut message_stream = pubsub.on_message();
                    while let Some(msg) = message_stream.next().await {
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(error = %e, "unreadable pub/sub payload, skipping");
                                continue;
                            }
                        };
                        Self::dispatch(&registry, &payload);
                    }
                }
                warn!(channel = %channel, "pub/sub connection lost, reconnecting");
                loop {
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    match resubscribe(&client, &channel).await {
                        Ok(fresh) => {
                            info!(channel = %channel, "pub/sub connection re-established");
                            pubsub = fresh;
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "pub/sub reconnect failed, retrying");
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Routes one raw envelope to its room or to everyone. Malformed
    /// envelopes are logged and skipped so the subscriber stays alive.
    pub fn dispatch(registry: &ConnectionRegistry, payload: &str) {
        let envelope: RelayEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed relay envelope, skipping");
                return;
            }
        };
        if envelope.event.is_empty() {
            warn!("relay envelope without an event name, skipping");
            return;
        }
        let message = EventMessage::relayed(envelope.event, envelope.message);
        match envelope.room {
            Some(room) => {
                let delivered = registry.send_to_room(&room, &message);
                debug!(room = %room, event = %message.event, delivered, "relayed to room");
            }
            None => {
                let delivered = registry.broadcast_all(&message);
                debug!(event = %message.event, delivered, "broadcast relay event");
            }
        }
    }
}

async fn resubscribe(client: &redis::Client, channel: &str) -> Result<redis::aio::PubSub> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(&[channel]).await?;
    Ok(pubsub)
}
