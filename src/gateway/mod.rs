pub mod auth;
pub mod events;
mod presence;
mod subscriptions;

use std::sync::Arc;
use std::time::Duration;

use fastwebsockets::upgrade::UpgradeFut;
use fastwebsockets::{Frame, FragmentCollectorRead, OpCode, Payload, WebSocketError};
use tracing::{debug, info};

use crate::error::Result;
use crate::options::ServerOptions;
use crate::protocol::messages::EventMessage;
use crate::registry::ConnectionRegistry;
use crate::rooms::Room;
use crate::session::{AuthContext, MessageSender, Session, SocketReader};
use events::ClientEvent;

/// Per-process connection handler: authenticates upgrades, owns each
/// socket's lifecycle, and routes client events into the registry.
pub struct GatewayHandler {
    pub registry: Arc<ConnectionRegistry>,
    pub backend: crate::backend::BackendClient,
    pub options: ServerOptions,
}

impl GatewayHandler {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        backend: crate::backend::BackendClient,
        options: ServerOptions,
    ) -> Self {
        Self {
            registry,
            backend,
            options,
        }
    }

    /// Drives one connection from upgrade completion to cleanup. Runs on its
    /// own task; frames from this client are handled strictly in order, so a
    /// `doc_open` is always fully processed before a following `doc_close`.
    pub async fn handle_socket(&self, fut: UpgradeFut, context: AuthContext) -> Result<()> {
        let mut ws = fut.await?;
        ws.set_max_message_size(self.options.websocket.max_payload_kb * 1024);
        let (rx, tx) = ws.split(tokio::io::split);
        let sender = MessageSender::spawn(tx, self.options.websocket.outbound_queue_depth);

        let session = Arc::new(Session::new(context, sender));
        self.registry.add_socket(session.clone());
        self.join_default_rooms(&session);
        info!(
            socket_id = %session.socket_id,
            site = %session.site,
            user = %session.user,
            "socket connected"
        );

        self.run_read_loop(rx, &session).await;

        self.cleanup_socket(&session);
        info!(
            socket_id = %session.socket_id,
            site = %session.site,
            "socket disconnected"
        );
        Ok(())
    }

    /// Every admitted socket lands in its user room and the site's website
    /// room; system users additionally join the site-wide room.
    fn join_default_rooms(&self, session: &Arc<Session>) {
        let socket_id = &session.socket_id;
        self.registry
            .join(&Room::user(session.user.as_str()).key(&session.site), socket_id);
        self.registry
            .join(&Room::Website.key(&session.site), socket_id);
        if session.is_system_user() {
            self.registry.join(&Room::All.key(&session.site), socket_id);
        }
    }

    async fn run_read_loop(&self, rx: SocketReader, session: &Arc<Session>) {
        let mut reader = FragmentCollectorRead::new(rx);

        // Control frames the read machinery is obligated to answer (pong
        // replies, close echoes) are queued on the writer task like any
        // other outbound frame.
        let obligated_sender = session.sender().clone();
        let mut send_fn = move |frame: Frame<'_>| {
            let result = obligated_sender
                .send_frame(owned_frame(frame))
                .map_err(|_| WebSocketError::ConnectionClosed);
            async move { result }
        };

        loop {
            let frame = match reader.read_frame(&mut send_fn).await {
                Ok(frame) => frame,
                Err(error) => {
                    debug!(socket_id = %session.socket_id, error = %error, "read loop ended");
                    break;
                }
            };
            match frame.opcode {
                OpCode::Close => break,
                OpCode::Text | OpCode::Binary => {
                    if let Err(error) = self.handle_frame(session, &frame.payload).await {
                        debug!(
                            socket_id = %session.socket_id,
                            error = %error,
                            "dropping invalid frame"
                        );
                    }
                }
                // Ping never surfaces here: the read machinery answers it
                // through the obligated send path above.
                _ => {}
            }
        }
    }

    async fn handle_frame(&self, session: &Arc<Session>, payload: &[u8]) -> Result<()> {
        let message: EventMessage = serde_json::from_slice(payload)?;
        match ClientEvent::from_message(&message)? {
            Some(event) => self.dispatch(session, event).await,
            None => {
                debug!(
                    socket_id = %session.socket_id,
                    event = %message.event,
                    "ignoring unknown event"
                );
                Ok(())
            }
        }
    }

    /// Routes one validated client event.
    pub async fn dispatch(&self, session: &Arc<Session>, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Ping => session.send_event(&EventMessage::pong()),
            ClientEvent::DoctypeSubscribe(target) => {
                self.handle_doctype_subscribe(session, target).await
            }
            ClientEvent::DoctypeUnsubscribe(target) => {
                self.handle_doctype_unsubscribe(session, &target);
                Ok(())
            }
            ClientEvent::TaskSubscribe(target) => {
                self.handle_task_subscribe(session, &target);
                Ok(())
            }
            ClientEvent::TaskUnsubscribe(target) => {
                self.handle_task_unsubscribe(session, &target);
                Ok(())
            }
            ClientEvent::DocSubscribe(target) => self.handle_doc_subscribe(session, target).await,
            ClientEvent::DocUnsubscribe(target) => {
                self.handle_doc_unsubscribe(session, &target);
                Ok(())
            }
            ClientEvent::DocOpen(target) => self.handle_doc_open(session, target).await,
            ClientEvent::DocClose(target) => {
                self.handle_doc_close(session, &target);
                Ok(())
            }
        }
    }

    /// Retracts every membership the socket held, then replays presence for
    /// the documents it had open so remaining viewers see it leave.
    pub fn cleanup_socket(&self, session: &Arc<Session>) {
        let open_docs = session.open_docs();
        self.registry.disconnect(&session.socket_id);
        for doc in &open_docs {
            self.notify_doc_viewers(session, doc);
        }
    }

    pub async fn shutdown(&self) {
        let connections = self.registry.socket_count();
        if connections == 0 {
            return;
        }
        info!(connections, "closing active connections");
        self.registry.close_all(1001, "server shutting down");
        tokio::time::sleep(Duration::from_secs(self.options.shutdown_grace_period_secs)).await;
    }
}

fn owned_frame(frame: Frame<'_>) -> Frame<'static> {
    Frame::new(
        frame.fin,
        frame.opcode,
        None,
        Payload::Owned(frame.payload.to_vec()),
    )
}
