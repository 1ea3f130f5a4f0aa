//! Roomcast Relay Server library.
//!
//! Exposes the relay server for use in tests and embedding. The relay
//! accepts WebSocket connections, tracks room membership, and bridges
//! client events to room-scoped broadcasts.

pub mod config;
pub mod relay;
pub mod rooms;
