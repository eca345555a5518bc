//! Server side of framestat: per-session collector and thread registries,
//! per-thread frame histories, connection dispatch, and an HTTP query API.

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod ids;
pub mod listener;
pub mod monitor;
pub mod reader;
pub mod registry;
pub mod server;
pub mod session;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{ReaderError, RegistryError};
pub use history::{FrameHistory, RecordOutcome};
pub use ids::SessionId;
pub use listener::SessionListener;
pub use monitor::{Monitor, MonitorFactory, TracingMonitor, TracingMonitorFactory};
pub use reader::{FrameReader, Reader};
pub use registry::{CollectorRegistry, ThreadData, ThreadRegistry};
pub use server::{DispatchMode, Server, ServerSettings};
pub use session::{ReaderHandle, SessionData};
