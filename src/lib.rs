//! Multi-tenant realtime gateway.
//!
//! Browsers open a WebSocket against a per-site namespace, are authenticated
//! against that site's web backend, and subscribe to rooms: documents being
//! viewed, doctype lists, long-running task progress. A Redis pub/sub channel
//! feeds backend-originated events into those rooms or broadcasts them to
//! every connected socket.

pub mod backend;
pub mod error;
pub mod gateway;
pub mod http_handler;
pub mod options;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod session;
pub mod ws_handler;
