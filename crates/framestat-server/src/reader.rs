//! Decode side of a session: turns client messages into `SessionData`
//! mutations and monitor events.

use std::sync::Arc;

use framestat_wire::{
    ClientMessage, FrameMessage, ThreadDefs, check_frame_len, decode_client_payload,
    decode_protocol_magic, is_version_compatible,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::error::ReaderError;
use crate::history::RecordOutcome;
use crate::monitor::Monitor;
use crate::session::SessionData;

/// Reads the protocol magic and then length-prefixed client messages.
pub struct FrameReader<R> {
    inner: R,
    max_frame_bytes: usize,
    magic_seen: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            max_frame_bytes,
            magic_seen: false,
        }
    }

    /// The next message, or `None` on a clean end of stream between frames.
    pub async fn next_message(&mut self) -> Result<Option<ClientMessage>, ReaderError> {
        if !self.magic_seen {
            let mut magic = [0u8; 4];
            self.inner.read_exact(&mut magic).await?;
            decode_protocol_magic(magic)?;
            self.magic_seen = true;
        }

        let mut len_buf = [0u8; 4];
        if let Err(e) = self.inner.read_exact(&mut len_buf).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Ok(None);
            }
            return Err(e.into());
        }

        let payload_len = u32::from_be_bytes(len_buf) as usize;
        check_frame_len(payload_len, self.max_frame_bytes)?;

        let mut payload = vec![0u8; payload_len];
        self.inner.read_exact(&mut payload).await?;
        Ok(Some(decode_client_payload(&payload)?))
    }
}

/// Applies one connection's messages to its session.
pub struct Reader {
    session: Arc<SessionData>,
    monitor: Arc<dyn Monitor>,
    got_hello: bool,
}

impl Reader {
    pub fn new(session: Arc<SessionData>, monitor: Arc<dyn Monitor>) -> Self {
        Self {
            session,
            monitor,
            got_hello: false,
        }
    }

    pub fn session(&self) -> &Arc<SessionData> {
        &self.session
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    /// Reads until the stream ends or fails. Does not mark the session
    /// closed; call `finish` for that.
    pub async fn run<R: AsyncRead + Unpin>(
        &mut self,
        frames: &mut FrameReader<R>,
    ) -> Result<(), ReaderError> {
        while let Some(message) = frames.next_message().await? {
            self.handle_message(message)?;
        }
        debug!(session_id = %self.session.id(), "connection closed (EOF)");
        Ok(())
    }

    /// Malformed registrations are logged and skipped. Errors returned
    /// from here end the connection.
    pub fn handle_message(&mut self, message: ClientMessage) -> Result<(), ReaderError> {
        if !self.got_hello && !matches!(message, ClientMessage::Hello(_)) {
            return Err(ReaderError::Protocol(format!(
                "{} before hello",
                message.kind()
            )));
        }

        match message {
            ClientMessage::Hello(hello) => {
                if self.got_hello {
                    return Err(ReaderError::Protocol("duplicate hello".to_string()));
                }
                let (major, minor) = (hello.major_version, hello.minor_version);
                if !is_version_compatible(major, minor) {
                    self.monitor.got_bad_version(&self.session, major, minor);
                    return Err(ReaderError::BadVersion {
                        client_major: major,
                        client_minor: minor,
                    });
                }
                self.session.set_client(hello);
                self.got_hello = true;
                self.monitor.got_hello(&self.session);
            }
            ClientMessage::CollectorDefs(defs) => {
                for def in defs {
                    let index = def.index;
                    match self.session.add_collector(def) {
                        Ok(true) => self.monitor.new_collector(&self.session, index),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(session_id = %self.session.id(), %e, "rejected collector definition");
                        }
                    }
                }
            }
            ClientMessage::ThreadDefs(ThreadDefs { first_index, names }) => {
                for (offset, name) in names.iter().enumerate() {
                    let Some(index) = i32::try_from(offset)
                        .ok()
                        .and_then(|offset| first_index.checked_add(offset))
                    else {
                        warn!(session_id = %self.session.id(), first_index, "thread index overflow");
                        break;
                    };
                    match self.session.define_thread(index, name) {
                        Ok(true) => self.monitor.new_thread(&self.session, index),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(session_id = %self.session.id(), %e, "rejected thread definition");
                        }
                    }
                }
            }
            ClientMessage::Frame(FrameMessage {
                thread,
                frame_number,
                data,
            }) => match self.session.record_new_frame(thread, frame_number, data) {
                Ok(Some(RecordOutcome::Untimed)) => {
                    debug!(
                        session_id = %self.session.id(),
                        thread, frame_number, "discarded frame without time samples"
                    );
                }
                Ok(Some(RecordOutcome::Expired)) => {
                    debug!(
                        session_id = %self.session.id(),
                        thread, frame_number, "discarded frame older than history window"
                    );
                }
                Ok(Some(_)) => self.monitor.new_data(&self.session, thread, frame_number),
                Ok(None) => {}
                Err(e) => {
                    warn!(session_id = %self.session.id(), %e, "rejected frame");
                }
            },
        }
        Ok(())
    }

    /// The connection is over: the session goes dead and the monitor hears
    /// about it.
    pub fn finish(&self) {
        self.session.connection_closed();
        self.monitor.lost_connection(&self.session);
    }
}
