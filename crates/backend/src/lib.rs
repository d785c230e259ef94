//! Client side of the messaging backend: REST calls, the live message feed,
//! the HTTP bulk transport and session polling.

pub mod client;
pub mod live;
pub mod transport;
pub mod watcher;

pub use client::{BackendClient, OutboundMessage};
pub use transport::HttpTransport;
pub use watcher::SessionWatcher;
