// pvwatch-api: Async Rust clients for the EPICS HTTP gateway and history service

pub mod error;
pub mod gateway;
pub mod history;
pub mod transport;
pub mod types;

pub use error::Error;
pub use gateway::GatewayClient;
pub use history::HistoryClient;
pub use transport::TransportConfig;
pub use types::{Aggregation, AlarmEvent, GatewayHealth, HistoryPoint, RawPvReading};
