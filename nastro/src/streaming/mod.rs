//! WebSocket streaming base: connection lifecycle, subscriptions, heartbeat,
//! and gated reconnection with channel-based gap notifications.

mod adapter;
mod client;
mod resilience;

pub use adapter::{ParsedEvent, StreamAdapter, WsSocket};
pub use client::{
    ConnectionState, DEFAULT_SUBSCRIPTION_ID_BASE, RECONNECT_CHANNEL_CAPACITY, StreamClient,
    StreamClientBuilder, StreamSubscriptions,
};
pub use resilience::ConnectBreaker;
