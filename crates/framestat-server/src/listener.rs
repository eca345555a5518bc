use std::fmt::Display;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::ids::SessionId;
use crate::reader::Reader;
use crate::server::Server;

/// Accepts client connections and turns each into a session. Holds no
/// per-session state of its own.
pub struct SessionListener {
    server: Arc<Server>,
}

impl SessionListener {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }

    pub async fn run(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "TCP connection accepted");
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%addr, %e, "failed to set TCP_NODELAY");
                    }
                    self.connection_opened(stream, addr);
                }
                Err(e) => error!(%e, "TCP accept failed"),
            }
        }
    }

    /// Sets up a session for a freshly accepted stream. Returns `None`, and
    /// drops the stream, when the server's factory refuses a monitor.
    pub fn connection_opened<S>(&self, stream: S, peer: impl Display) -> Option<SessionId>
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let Some(monitor) = self.server.make_monitor() else {
            warn!(%peer, "no monitor available, dropping connection");
            return None;
        };
        let session = self.server.open_session(Arc::clone(&monitor));
        let reader = Reader::new(Arc::clone(&session), Arc::clone(&monitor));
        monitor.initialized(&session);
        info!(%peer, session_id = %session.id(), dispatch = %self.server.dispatch(), "session started");
        self.server.add_reader(reader, stream);
        Some(session.id())
    }
}
