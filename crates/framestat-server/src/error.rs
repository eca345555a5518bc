use framestat_types::{CollectorIndex, ThreadIndex};
use framestat_wire::WireError;
use thiserror::Error;

/// A single malformed registration from the client. The registration is
/// dropped; the session carries on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("collector index {index} outside 0..{max}")]
    CollectorOutOfRange { index: CollectorIndex, max: i32 },

    #[error("thread index {index} outside 0..{max}")]
    ThreadOutOfRange { index: ThreadIndex, max: i32 },

    #[error("collector {index} names itself as its parent")]
    SelfParent { index: CollectorIndex },

    #[error("collector {index} with parent {parent} would close a cycle")]
    ParentCycle {
        index: CollectorIndex,
        parent: CollectorIndex,
    },
}

/// Conditions that end a session's connection.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("transport: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire: {0}")]
    Wire(#[from] WireError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("unsupported protocol version {client_major}.{client_minor}")]
    BadVersion { client_major: u32, client_minor: u32 },
}

impl From<framestat_wire::FrameCodecError> for ReaderError {
    fn from(value: framestat_wire::FrameCodecError) -> Self {
        Self::Wire(WireError::Frame(value))
    }
}
