//! Data model shared by the framestat wire protocol and server.
//!
//! A profiled client describes a tree of named collectors, a set of
//! threads, and then streams one [`FrameData`] per thread per tick.

mod api;
mod collector;
mod frame;

pub use api::*;
pub use collector::*;
pub use frame::*;

use facet::Facet;

/// First message of every session: who is connecting, and which protocol
/// revision they speak.
#[derive(Facet, Clone, Debug, PartialEq, Eq)]
pub struct ClientHello {
    pub hostname: String,
    pub progname: String,
    pub pid: u32,
    pub major_version: u32,
    pub minor_version: u32,
}
