//! Asynchronous connection engine.
//!
//! The engine owns the listening socket and the pieces shared by every
//! connection: the buffer pool, the session registry, and the shutdown
//! latch. Accepted connections each get a session and a task driving the
//! read/write paths in `session`; protocol meaning is supplied by the
//! injected [`Handler`].

mod buffer;
mod handler;
mod session;

pub use buffer::BufferPool;
pub use handler::Handler;
pub use session::{Session, SessionRegistry};

use crate::config::Config;
use socket2::SockRef;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Errors that stop the engine from starting.
///
/// Everything after a successful bind is contained per connection and never
/// surfaces here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// The server engine: acceptor, shutdown latch, and session lifecycle.
pub struct Engine {
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    pool: Arc<BufferPool>,
    registry: Arc<SessionRegistry>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl Engine {
    /// Bind the listening socket. A bind failure is fatal and propagated.
    pub async fn bind(config: &Config, handler: Arc<dyn Handler>) -> Result<Self, EngineError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| EngineError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(addr = %addr, "listening");

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            listener,
            handler,
            pool: Arc::new(BufferPool::new(config.pool_buffers, config.buffer_size)),
            registry: Arc::new(SessionRegistry::new()),
            shutdown,
            stopped: AtomicBool::new(false),
        })
    }

    /// Address the listener is bound to. With port 0 this is where the
    /// ephemeral port shows up.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Returns once [`Engine::stop`] releases the shutdown
    /// latch, after closing every session still registered.
    ///
    /// Accept failures are transient: they are logged and the loop re-arms
    /// unconditionally, so a slow or misbehaving client never starves new
    /// connections.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(stream, peer),
                    Err(e) => error!(error = %e, "accept failed"),
                },
                _ = shutdown.wait_for(|stopped| *stopped) => break,
            }
        }
        self.registry.close_all();
        info!("engine stopped");
    }

    /// Release the shutdown latch.
    ///
    /// Idempotent: the first caller wins, concurrent and repeated calls are
    /// no-ops. Both external signals and internal fatal paths may call this.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
            // send_replace stores the value even with no subscribers, so a
            // stop() that races engine startup is not lost.
            self.shutdown.send_replace(true);
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = configure_socket(&stream) {
            debug!(peer = %peer, error = %e, "failed to set socket options");
        }

        let session = Arc::new(Session::new(peer.to_string()));
        let id = self.registry.insert(Arc::clone(&session));
        debug!(peer = %peer, active = self.registry.len(), "connection accepted");

        let handler = Arc::clone(&self.handler);
        let pool = Arc::clone(&self.pool);
        let registry = Arc::clone(&self.registry);
        let shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut buf = pool.acquire();
            let result =
                session::drive(stream, Arc::clone(&session), handler, &mut buf, shutdown).await;
            if let Err(e) = result {
                debug!(peer = %session.remote_addr(), error = %e, "connection error");
            }
            session.close();
            registry.remove(id);
            pool.release(buf);
        });
    }
}

/// Socket options for accepted connections: SO_KEEPALIVE to detect dead
/// peers, TCP_NODELAY so small header writes are not delayed.
fn configure_socket(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    SockRef::from(stream).set_keepalive(true)
}
