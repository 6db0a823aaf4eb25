//! # Peer-Net Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Multi-node flows over real TCP sockets
//!     ├── support.rs    # Node spawning and polling helpers
//!     └── tcp_network.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p pn-tests
//! RUST_LOG=peer_protocol=debug cargo test -p pn-tests -- --nocapture
//! ```

pub mod integration;
