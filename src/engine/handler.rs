//! Protocol handler seam.
//!
//! The engine moves bytes; a `Handler` gives them meaning. Handlers are
//! injected at engine construction and shared by every session.

use crate::engine::session::Session;

/// Protocol logic plugged into the connection engine.
///
/// `on_message` is invoked synchronously from the session's read path with
/// the payload of one completed read. The implementation may call
/// [`Session::write`] any number of times (the engine delivers the buffers
/// to the peer in call order, exactly once each) and must leave
/// [`Session::set_keep_alive`] reflecting whether another request should be
/// awaited on this connection.
pub trait Handler: Send + Sync {
    fn on_message(&self, session: &Session, payload: &[u8]);
}
