//! Cross-node integration tests.

pub mod support;

#[cfg(test)]
mod tcp_network;
