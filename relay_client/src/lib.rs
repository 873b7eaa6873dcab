//! `relay_client`
//!
//! Client-side pieces:
//! - Connection and handshake with the relay
//! - Local view of remote players
//! - WASD input to movement reports

pub mod client;
pub mod input;

pub use client::RelayClient;
