use crate::{
    conn::{port_pool::PortPool, ServerAddress},
    protocol::CMD_COLLECTION,
    BdocResult, Document, Message, Response,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

// Pin identity must hold across pools, so ids are process-wide.
static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_port_id() -> u64 {
    NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed)
}

/// A single wire connection to one server address.
///
/// A port is never shared: exactly one holder uses it at a time, and all I/O
/// happens on the holder's thread.
pub trait Port: Send + std::fmt::Debug {
    /// Writes the message without awaiting an answer.
    fn send(&mut self, message: &Message) -> BdocResult<()>;

    /// Writes the message and reads the framed response. `collection` names
    /// the target for diagnostics only.
    fn call(&mut self, message: &Message, collection: &str) -> BdocResult<Response>;

    /// Ensures this port is authenticated for `db`; repeated calls are cheap.
    fn check_auth(&mut self, db: &str) -> BdocResult<()>;

    fn address(&self) -> &ServerAddress;

    /// Destroys the socket; the port must not be used afterwards.
    fn close(&mut self);

    fn is_closed(&self) -> bool;

    /// Runs a command against `db` and returns the server's reply document.
    fn run_command(&mut self, db: &str, command: &Document) -> BdocResult<Document> {
        let message = Message::command(db, command)?;
        let response = self.call(&message, CMD_COLLECTION)?;
        response
            .into_first_document()
            .ok_or(crate::BdocError::Impl("empty command reply"))
    }
}

/// Opens ports for server addresses.
pub trait PortFactory: Send + Sync + std::fmt::Debug {
    fn open(&self, addr: &ServerAddress) -> BdocResult<Box<dyn Port>>;
}

/// A pool-issued port handle.
///
/// Every handle obtained from [`PortPool::get`] must end its life in exactly
/// one of [`PortPool::done`] (healthy, may be reissued) or [`PortPool::error`]
/// (fenced, never reissued). A handle that is simply dropped closes its
/// socket with a complaint in the log.
#[derive(Debug)]
pub struct PooledPort {
    id: u64,
    inner: Option<Box<dyn Port>>,
    pool: Arc<PortPool>,
}

impl PooledPort {
    pub(crate) fn new(id: u64, inner: Box<dyn Port>, pool: Arc<PortPool>) -> Self {
        Self {
            id,
            inner: Some(inner),
            pool,
        }
    }

    /// Identity of this handle, stable for its lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn pool(&self) -> &Arc<PortPool> {
        &self.pool
    }

    pub(crate) fn take_inner(&mut self) -> Option<Box<dyn Port>> {
        self.inner.take()
    }
}

impl std::ops::Deref for PooledPort {
    type Target = dyn Port;

    fn deref(&self) -> &Self::Target {
        self.inner
            .as_deref()
            .expect("pooled port used after being returned")
    }
}

impl std::ops::DerefMut for PooledPort {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner
            .as_deref_mut()
            .expect("pooled port used after being returned")
    }
}

impl Drop for PooledPort {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            warn!(
                "port to {} dropped without done/error; closing it",
                inner.address()
            );
            inner.close();
        }
    }
}
