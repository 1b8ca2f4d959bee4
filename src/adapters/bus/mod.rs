//! Broadcast bus adapters.
//!
//! - `BroadcastBus` - Publishes dashboard events and relays received ones to the local registry
//! - `RedisTransport` - Redis pub/sub for multi-server deployments
//! - `InMemoryTransport` - Process-local pub/sub for tests

mod broadcast_bus;
mod in_memory_transport;
mod redis_transport;

pub use broadcast_bus::{BroadcastBus, Delivery, LOCAL_MODE};
pub use in_memory_transport::InMemoryTransport;
pub use redis_transport::RedisTransport;
