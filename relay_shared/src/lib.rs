//! `relay_shared`
//!
//! Shared libraries used by both the relay server and its clients.
//!
//! Design goals:
//! - One wire protocol definition, used verbatim on both ends.
//! - Explicit framing and serialization so the protocol stays versionable.
//! - Domain events cross out of the core through a trait, not a direct call.
//! - No `unsafe`.

pub mod config;
pub mod event;
pub mod math;
pub mod net;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::event::*;
    pub use crate::math::*;
    pub use crate::net::*;
}
