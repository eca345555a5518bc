use facet::Facet;
pub use framestat_types::{ClientHello, CollectorDef, FrameData, FrameNumber, ThreadIndex};
use std::fmt;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
pub const PROTOCOL_MAGIC: u32 = 0x4653_5441;

/// Protocol revision spoken by this server. Clients must match the major
/// version and may not be newer in the minor version.
pub const SERVER_MAJOR_VERSION: u32 = 3;
pub const SERVER_MINOR_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameCodecError {
    PayloadTooLarge { len: usize, max: usize },
    FrameTooShort { len: usize },
    FrameTooLarge { len: usize, max: usize },
    FrameTruncated { expected: usize, actual: usize },
}

impl fmt::Display for FrameCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload too large: {len} > {max}")
            }
            Self::FrameTooShort { len } => write!(f, "frame too short: {len}"),
            Self::FrameTooLarge { len, max } => write!(f, "frame too large: {len} > {max}"),
            Self::FrameTruncated { expected, actual } => {
                write!(
                    f,
                    "truncated frame payload: expected {expected}, got {actual}"
                )
            }
        }
    }
}

impl std::error::Error for FrameCodecError {}

#[derive(Debug)]
pub enum WireError {
    Frame(FrameCodecError),
    Json(String),
    MagicMismatch { expected: u32, actual: u32 },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
            Self::MagicMismatch { expected, actual } => {
                write!(
                    f,
                    "protocol magic mismatch: expected 0x{expected:08x}, got 0x{actual:08x}"
                )
            }
        }
    }
}

impl std::error::Error for WireError {}

impl From<FrameCodecError> for WireError {
    fn from(value: FrameCodecError) -> Self {
        Self::Frame(value)
    }
}

pub fn encode_frame(payload: &[u8], max_payload_bytes: usize) -> Result<Vec<u8>, FrameCodecError> {
    if payload.len() > max_payload_bytes {
        return Err(FrameCodecError::PayloadTooLarge {
            len: payload.len(),
            max: max_payload_bytes,
        });
    }

    let payload_len =
        u32::try_from(payload.len()).map_err(|_| FrameCodecError::PayloadTooLarge {
            len: payload.len(),
            max: u32::MAX as usize,
        })?;

    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&payload_len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn decode_frame(frame: &[u8], max_payload_bytes: usize) -> Result<&[u8], FrameCodecError> {
    if frame.len() < 4 {
        return Err(FrameCodecError::FrameTooShort { len: frame.len() });
    }

    let mut prefix = [0u8; 4];
    prefix.copy_from_slice(&frame[..4]);
    let payload_len = u32::from_be_bytes(prefix) as usize;
    if payload_len > max_payload_bytes {
        return Err(FrameCodecError::FrameTooLarge {
            len: payload_len,
            max: max_payload_bytes,
        });
    }

    let actual_payload_len = frame.len() - 4;
    if actual_payload_len != payload_len {
        return Err(FrameCodecError::FrameTruncated {
            expected: payload_len,
            actual: actual_payload_len,
        });
    }

    Ok(&frame[4..])
}

/// Checks a length prefix read off a stream before the payload is read.
pub fn check_frame_len(payload_len: usize, max_payload_bytes: usize) -> Result<(), FrameCodecError> {
    if payload_len > max_payload_bytes {
        return Err(FrameCodecError::FrameTooLarge {
            len: payload_len,
            max: max_payload_bytes,
        });
    }
    Ok(())
}

pub fn encode_protocol_magic() -> [u8; 4] {
    PROTOCOL_MAGIC.to_be_bytes()
}

pub fn decode_protocol_magic(bytes: [u8; 4]) -> Result<(), WireError> {
    let actual = u32::from_be_bytes(bytes);
    if actual != PROTOCOL_MAGIC {
        return Err(WireError::MagicMismatch {
            expected: PROTOCOL_MAGIC,
            actual,
        });
    }
    Ok(())
}

/// Whether a client speaking `major.minor` can be served.
pub fn is_version_compatible(major: u32, minor: u32) -> bool {
    major == SERVER_MAJOR_VERSION && minor <= SERVER_MINOR_VERSION
}

/// Names for a contiguous run of thread indices starting at `first_index`.
#[derive(Facet, Clone, Debug, PartialEq)]
pub struct ThreadDefs {
    pub first_index: ThreadIndex,
    pub names: Vec<String>,
}

#[derive(Facet, Clone, Debug, PartialEq)]
pub struct FrameMessage {
    pub thread: ThreadIndex,
    pub frame_number: FrameNumber,
    pub data: FrameData,
}

#[derive(Facet, Clone, Debug, PartialEq)]
#[repr(u8)]
#[facet(rename_all = "snake_case")]
pub enum ClientMessage {
    Hello(ClientHello),
    CollectorDefs(Vec<CollectorDef>),
    ThreadDefs(ThreadDefs),
    Frame(FrameMessage),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::CollectorDefs(_) => "collector_defs",
            Self::ThreadDefs(_) => "thread_defs",
            Self::Frame(_) => "frame",
        }
    }
}

pub fn encode_client_message(
    message: &ClientMessage,
    max_payload_bytes: usize,
) -> Result<Vec<u8>, WireError> {
    let payload = facet_json::to_vec(message).map_err(|e| WireError::Json(e.to_string()))?;
    Ok(encode_frame(&payload, max_payload_bytes)?)
}

pub fn encode_client_message_default(message: &ClientMessage) -> Result<Vec<u8>, WireError> {
    encode_client_message(message, DEFAULT_MAX_FRAME_BYTES)
}

/// Decodes the JSON body of a frame whose length prefix was already consumed.
pub fn decode_client_payload(payload: &[u8]) -> Result<ClientMessage, WireError> {
    facet_json::from_slice(payload).map_err(|e| WireError::Json(e.to_string()))
}

pub fn decode_client_message(
    frame: &[u8],
    max_payload_bytes: usize,
) -> Result<ClientMessage, WireError> {
    let payload = decode_frame(frame, max_payload_bytes)?;
    decode_client_payload(payload)
}

pub fn decode_client_message_default(frame: &[u8]) -> Result<ClientMessage, WireError> {
    decode_client_message(frame, DEFAULT_MAX_FRAME_BYTES)
}
