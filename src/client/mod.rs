//! Display-side consumer of the push channel: connection lifecycle with
//! bounded reconnects, a local cursor over the received playlist, an on-disk
//! cache for offline starts, and the slideshow and schedule drivers.

pub mod backoff;
pub mod cache;
pub mod connection;
pub mod consumer;
pub mod fetch;
pub mod schedule;
pub mod slideshow;
pub mod transport;

pub use cache::CacheStore;
pub use connection::{ConnectionState, LinkStatus};
pub use consumer::{ConsumerHandle, ConsumerSettings, ConsumerView, MediaConsumer};
pub use fetch::CachedFetcher;
pub use transport::{HttpApi, WsTransport};
