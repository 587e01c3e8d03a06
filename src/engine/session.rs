//! Per-connection session state and the read/write paths that drive it.
//!
//! A session serializes all I/O on its connection: the connection task owns
//! the socket, so at most one read and one write are ever in flight, and
//! response buffers queued by the protocol handler are delivered strictly in
//! call order. The keep-alive decision is threaded through every exchange:
//! a new read is armed only after the write queue has fully drained.

use bytes::{Bytes, BytesMut};
use slab::Slab;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::engine::handler::Handler;

/// State for one accepted connection.
///
/// The socket itself stays with the connection task; the session holds the
/// shared pieces the protocol handler interacts with: the ordered write
/// queue, the keep-alive flag, and the closed flag.
pub struct Session {
    remote_addr: String,
    queue: Mutex<VecDeque<Bytes>>,
    keep_alive: AtomicBool,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new(remote_addr: String) -> Self {
        Self {
            remote_addr,
            queue: Mutex::new(VecDeque::new()),
            keep_alive: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Peer address snapshot taken at accept time. Diagnostics only.
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Queue a buffer for delivery to the peer.
    ///
    /// Buffers reach the peer in the order they were queued, each exactly
    /// once. Writes on a closed session are discarded.
    pub fn write(&self, buf: Bytes) {
        if self.is_closed() {
            trace!(peer = %self.remote_addr, "write on closed session discarded");
            return;
        }
        self.queue.lock().unwrap().push_back(buf);
    }

    /// Whether another request should be awaited once the current response
    /// has fully drained. Defaults to false; the handler decides per request.
    pub fn set_keep_alive(&self, keep_alive: bool) {
        self.keep_alive.store(keep_alive, Ordering::Release);
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffers waiting in the write queue.
    #[allow(dead_code)]
    pub fn pending_writes(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Mark the session closed, discarding any queued writes.
    ///
    /// Only the first call transitions; later calls are no-ops and return
    /// false.
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.queue.lock().unwrap().clear();
            debug!(peer = %self.remote_addr, "session closed");
        }
        first
    }

    fn head(&self) -> Option<Bytes> {
        self.queue.lock().unwrap().front().cloned()
    }

    fn pop_head(&self) {
        self.queue.lock().unwrap().pop_front();
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> Vec<Bytes> {
        self.queue.lock().unwrap().iter().cloned().collect()
    }
}

/// Read path: drive one connection until it closes.
///
/// Each iteration arms exactly one read into the leased buffer (cleared
/// first), hands the payload to the handler, drains the write queue, and
/// only then decides between re-arming the read (keep-alive) and shutting
/// the connection down. A zero-length read is the peer-closed signal.
pub(crate) async fn drive<S>(
    mut stream: S,
    session: Arc<Session>,
    handler: Arc<dyn Handler>,
    buf: &mut BytesMut,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        buf.clear();

        // Resolve the select into a plain value before any further await so
        // the `watch::Ref` guard from `wait_for` is not held across the
        // shutdown await below (which would make this future non-`Send`).
        enum Armed {
            Read(usize),
            Shutdown,
        }
        let armed = tokio::select! {
            read = stream.read_buf(buf) => Armed::Read(read?),
            _ = shutdown.wait_for(|stopped| *stopped) => Armed::Shutdown,
        };
        let n = match armed {
            Armed::Read(n) => n,
            Armed::Shutdown => {
                trace!(peer = %session.remote_addr(), "shutdown while read armed");
                let _ = stream.shutdown().await;
                session.close();
                return Ok(());
            }
        };

        if n == 0 {
            trace!(peer = %session.remote_addr(), "peer closed connection");
            session.close();
            return Ok(());
        }

        trace!(peer = %session.remote_addr(), bytes = n, "read completed");
        handler.on_message(&session, &buf[..n]);

        drain(&mut stream, &session).await?;

        if session.is_closed() || !session.keep_alive() {
            let _ = stream.shutdown().await;
            session.close();
            return Ok(());
        }
        // Keep-alive: loop around and arm the next read.
    }
}

/// Write path: drain the session's queue one buffer at a time.
///
/// The head buffer stays queued until every byte of it has been accepted by
/// the transport; short writes resume at the remainder. Draining stops when
/// the queue is observed empty, leaving the keep-alive decision to the
/// caller.
async fn drain<S>(stream: &mut S, session: &Session) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    while let Some(head) = session.head() {
        let mut written = 0;
        while written < head.len() {
            let n = stream.write(&head[written..]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting bytes",
                ));
            }
            written += n;
            if written < head.len() {
                trace!(
                    peer = %session.remote_addr(),
                    written,
                    total = head.len(),
                    "partial write, resuming"
                );
            }
        }
        session.pop_head();
    }
    stream.flush().await
}

/// Registry of live sessions.
///
/// The engine inserts on accept and removes when the connection task ends;
/// shutdown closes whatever is still registered.
pub struct SessionRegistry {
    sessions: Mutex<Slab<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Slab::new()),
        }
    }

    pub fn insert(&self, session: Arc<Session>) -> usize {
        self.sessions.lock().unwrap().insert(session)
    }

    pub fn remove(&self, id: usize) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains(id) {
            Some(sessions.remove(id))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().unwrap().is_empty()
    }

    /// Close every registered session. Used by engine shutdown.
    pub fn close_all(&self) {
        for (_, session) in self.sessions.lock().unwrap().iter() {
            session.close();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
