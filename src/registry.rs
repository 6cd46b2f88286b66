use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::protocol::messages::EventMessage;
use crate::session::{Session, SocketId};

/// Owns every connected session and the full room-membership table. Rooms
/// are implicit: created on first join, dropped when their last member
/// leaves. All methods are lock-free for callers; membership updates are
/// atomic per room so concurrent joins and disconnect cleanup cannot strand
/// an empty set or lose a member.
#[derive(Default)]
pub struct ConnectionRegistry {
    sockets: DashMap<SocketId, Arc<Session>>,
    rooms: DashMap<String, DashSet<SocketId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_socket(&self, session: Arc<Session>) {
        self.sockets.insert(session.socket_id.clone(), session);
    }

    pub fn get_socket(&self, socket_id: &SocketId) -> Option<Arc<Session>> {
        self.sockets
            .get(socket_id)
            .map(|entry| entry.value().clone())
    }

    pub fn join(&self, room: &str, socket_id: &SocketId) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(socket_id.clone());
    }

    pub fn leave(&self, room: &str, socket_id: &SocketId) {
        if let Some(members) = self.rooms.get(room) {
            members.remove(socket_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    pub fn is_member(&self, room: &str, socket_id: &SocketId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains(socket_id))
    }

    /// Sessions currently in `room`. Membership is snapshotted first so the
    /// room lock is not held while sessions are resolved.
    pub fn members_of(&self, room: &str) -> Vec<Arc<Session>> {
        let member_ids: Vec<SocketId> = match self.rooms.get(room) {
            Some(members) => members.iter().map(|id| id.clone()).collect(),
            None => return Vec::new(),
        };
        member_ids
            .iter()
            .filter_map(|id| self.sockets.get(id).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Rooms this socket currently belongs to.
    pub fn rooms_of(&self, socket_id: &SocketId) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().contains(socket_id))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Removes the socket from every room it is in, then drops the session.
    /// Returns the session so callers can run presence recomputation for the
    /// documents it had open.
    pub fn disconnect(&self, socket_id: &SocketId) -> Option<Arc<Session>> {
        for room in self.rooms_of(socket_id) {
            self.leave(&room, socket_id);
        }
        self.sockets.remove(socket_id).map(|(_, session)| session)
    }

    /// Serializes `message` once and fans it out to every member of `room`.
    /// Returns the number of sockets the frame was queued for.
    pub fn send_to_room(&self, room: &str, message: &EventMessage) -> usize {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(error) => {
                debug!(room, error = %error, "failed to serialize room message");
                return 0;
            }
        };
        let mut delivered = 0;
        for session in self.members_of(room) {
            match session.send_payload(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    debug!(
                        socket_id = %session.socket_id,
                        room,
                        error = %error,
                        "failed to queue room message"
                    );
                }
            }
        }
        delivered
    }

    /// Delivers `message` to every connected socket across all sites.
    pub fn broadcast_all(&self, message: &EventMessage) -> usize {
        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(error) => {
                debug!(error = %error, "failed to serialize broadcast message");
                return 0;
            }
        };
        let mut delivered = 0;
        for entry in self.sockets.iter() {
            match entry.value().send_payload(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(error) => {
                    debug!(
                        socket_id = %entry.value().socket_id,
                        error = %error,
                        "failed to queue broadcast message"
                    );
                }
            }
        }
        delivered
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Queues a close frame on every connection. Used during shutdown.
    pub fn close_all(&self, code: u16, reason: &str) {
        for entry in self.sockets.iter() {
            if let Err(error) = entry.value().send_close(code, reason) {
                debug!(
                    socket_id = %entry.value().socket_id,
                    error = %error,
                    "failed to queue close frame"
                );
            }
        }
    }
}
