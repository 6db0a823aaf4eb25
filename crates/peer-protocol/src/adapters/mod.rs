//! # Adapters Layer
//!
//! Concrete implementations of the outbound ports.
//!
//! - `SystemTimeSource`, `StaticPeerDiscovery`, `StaticChainState`,
//!   `LoggingApplication`: always available
//! - `TcpTransport`, `TomlConfigProvider`: require the `network` feature

pub mod local;

#[cfg(feature = "network")]
pub mod config;
#[cfg(feature = "network")]
pub mod tcp;

pub use local::{LoggingApplication, StaticChainState, StaticPeerDiscovery, SystemTimeSource};

#[cfg(feature = "network")]
pub use config::{ConfigError, LoggingSettings, TomlConfigProvider};
#[cfg(feature = "network")]
pub use tcp::{TcpConnection, TcpTransport};
