//! `relay_server`
//!
//! Real-time player-state relay:
//! - `registry`: live connection ids and their positions
//! - `session`: connect/disconnect transitions
//! - `mutation`: position reports and combat hits
//! - `broadcast`: fan-out to all, all-but-sender, or one connection
//! - `gateway`: per-connection state machine and wire boundary
//! - `hub`: single-writer task owning all of the above
//!
//! Networking model:
//! - TCP, one ordered stream per client
//! - Length-prefixed JSON frames (see `relay_shared::net`)

pub mod broadcast;
pub mod gateway;
pub mod hub;
pub mod mutation;
pub mod registry;
pub mod server;
pub mod session;

pub use hub::{Hub, HubHandle, HubState};
pub use server::RelayServer;
