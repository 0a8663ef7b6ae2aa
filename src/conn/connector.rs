use crate::{
    conn::{
        pool_registry::PoolRegistry,
        port::PooledPort,
        port_pool::PortPool,
        thread_port::{self, ThreadPort},
        Authenticator, PoolOptions, PortFactory, ReplicaSetStatus, ServerAddress,
        WireFactory,
    },
    protocol::CMD_COLLECTION,
    usage_err, BdocError, BdocResult, Document, Message, Response, WriteConcern, WriteResult,
    DEFAULT_RETRIES,
};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

static NEXT_CONNECTOR_ID: AtomicU64 = AtomicU64::new(1);

// Address and pool of the node currently accepting writes. Always read and
// replaced as a unit, under the one mutex.
#[derive(Clone, Debug)]
struct PrimaryPair {
    address: ServerAddress,
    pool: Arc<PortPool>,
}

/// The connection coordinator.
///
/// Dispatches calls and writes to the current primary, authenticates ports
/// per database, redispatches after I/O failures and "not master" refusals,
/// and keeps one port pinned per thread for the duration of a caller-declared
/// request (`request_start` ... `request_done`) so that causally dependent
/// operations traverse the same socket.
///
/// All methods take `&self`; a connector is meant to be shared across many
/// threads for its whole life.
#[derive(Debug)]
pub struct Connector {
    id: u64,
    registry: PoolRegistry,
    replica_set: Option<ReplicaSetStatus>,
    primary: Mutex<Option<PrimaryPair>>,
    closed: AtomicBool,
    seeds: Vec<ServerAddress>,
}

impl Connector {
    /// A connector for a single stand-alone server.
    pub fn new(address: ServerAddress) -> BdocResult<Self> {
        Self::with_options(vec![address], &PoolOptions::default(), None)
    }

    /// A connector for a replicated cluster, seeded with some of its members.
    pub fn replica_set(seeds: Vec<ServerAddress>) -> BdocResult<Self> {
        Self::with_options(seeds, &PoolOptions::default(), None)
    }

    /// Like [`new`](Self::new)/[`replica_set`](Self::replica_set) (one
    /// address = stand-alone, several = replica set), with tuned pool options
    /// and an optional authenticator for the default TCP ports.
    pub fn with_options(
        addresses: Vec<ServerAddress>,
        options: &PoolOptions,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> BdocResult<Self> {
        let factory = Arc::new(WireFactory::new(options.clone(), authenticator));
        Self::with_factory(addresses, factory, options.clone())
    }

    /// Fully parameterized construction with a caller-supplied port factory.
    pub fn with_factory(
        addresses: Vec<ServerAddress>,
        factory: Arc<dyn PortFactory>,
        options: PoolOptions,
    ) -> BdocResult<Self> {
        if addresses.is_empty() {
            return Err(usage_err!("at least one server address is required"));
        }
        let id = NEXT_CONNECTOR_ID.fetch_add(1, Ordering::Relaxed);
        let registry = PoolRegistry::new(Arc::clone(&factory), options);
        if addresses.len() == 1 {
            let address = addresses[0].clone();
            debug!("connector {id} for stand-alone server {address}");
            let pool = registry.get(&address)?;
            Ok(Self {
                id,
                registry,
                replica_set: None,
                primary: Mutex::new(Some(PrimaryPair { address, pool })),
                closed: AtomicBool::new(false),
                seeds: addresses,
            })
        } else {
            debug!("connector {id} for replica set {addresses:?}");
            let replica_set = ReplicaSetStatus::new(addresses.clone(), factory)?;
            Ok(Self {
                id,
                registry,
                replica_set: Some(replica_set),
                primary: Mutex::new(None),
                closed: AtomicBool::new(false),
                seeds: addresses,
            })
        }
    }

    /// Fire-and-maybe-confirm write path.
    ///
    /// Sends the message on a (request-pinned) port to the primary; when the
    /// write concern asks for acknowledgement, runs the acknowledgement
    /// command on the same port and classifies its outcome. Network failures
    /// fence the port and either raise or are reported in-band, as the write
    /// concern directs.
    pub fn say(
        &self,
        db: &str,
        message: &Message,
        write_concern: &WriteConcern,
    ) -> BdocResult<WriteResult> {
        self.assert_open()?;
        let mut port = self.acquire(true, false)?;
        let outcome = send_and_confirm(&mut port, db, message, write_concern);
        match outcome {
            Ok(o_ack) => {
                self.with_thread_port(|tp| tp.release(port));
                match o_ack {
                    Some(ack) => evaluate_acknowledgement(&ack),
                    None => Ok(WriteResult::unacknowledged()),
                }
            }
            Err(e) if e.is_network() => {
                self.with_thread_port(|tp| tp.fail(port, &e));
                self.primary_suspect();
                if write_concern.raises_network_errors() {
                    Err(e.into_network(false))
                } else {
                    debug!("write concern swallows network error: {e}");
                    Ok(WriteResult::network_error())
                }
            }
            Err(e) => {
                self.with_thread_port(|tp| tp.fail(port, &e));
                Err(e)
            }
        }
    }

    /// Request/response path with up to [`DEFAULT_RETRIES`] redispatches.
    pub fn call(&self, db: &str, collection: &str, message: &Message) -> BdocResult<Response> {
        self.call_with_retries(db, collection, message, DEFAULT_RETRIES)
    }

    /// Request/response path.
    ///
    /// I/O failures fence the port and redispatch (never for the command
    /// pseudo-collection); "not master" refusals trigger a topology refresh
    /// and redispatch against the re-discovered primary. Other embedded
    /// server errors surface immediately.
    pub fn call_with_retries(
        &self,
        db: &str,
        collection: &str,
        message: &Message,
        retries: u32,
    ) -> BdocResult<Response> {
        self.assert_open()?;
        let slave_ok = message.has_option(Message::SLAVE_OK);
        let mut port = self.acquire(true, slave_ok)?;
        let outcome = port
            .check_auth(db)
            .and_then(|()| port.call(message, collection));
        match outcome {
            Ok(response) => {
                self.with_thread_port(|tp| tp.release(port));
                if let Some(server_error) = response.get_error() {
                    if server_error.is_not_master() {
                        warn!("primary refused {db}.{collection}: {server_error}");
                        self.primary_suspect();
                        if retries > 0 {
                            return self.call_with_retries(db, collection, message, retries - 1);
                        }
                        return Err(BdocError::NotMasterExhausted);
                    }
                    return Err(BdocError::Db {
                        source: server_error,
                    });
                }
                Ok(response)
            }
            Err(e) if e.is_network() => {
                self.with_thread_port(|tp| tp.fail(port, &e));
                self.primary_suspect();
                if collection != CMD_COLLECTION && retries > 0 {
                    debug!("redispatching call to {db}.{collection} after: {e}");
                    self.call_with_retries(db, collection, message, retries - 1)
                } else {
                    Err(e.into_network(collection != CMD_COLLECTION))
                }
            }
            Err(e) => {
                self.with_thread_port(|tp| tp.fail(port, &e));
                Err(e)
            }
        }
    }

    /// Declares the beginning of a request: from here to
    /// [`request_done`](Self::request_done), operations of this thread share
    /// one port. Idempotent.
    pub fn request_start(&self) {
        self.with_thread_port(ThreadPort::request_start);
    }

    /// Ends the calling thread's request and unpins its port.
    pub fn request_done(&self) {
        self.with_thread_port(ThreadPort::request_done);
    }

    /// Pins a port for the calling thread's request right away, so even the
    /// first operation uses the socket all later ones will.
    pub fn request_ensure_connection(&self) -> BdocResult<()> {
        self.assert_open()?;
        let pair = self.current_primary()?;
        self.with_thread_port(|tp| tp.request_ensure_connection(&pair.pool))
    }

    /// True while the calling thread holds a pinned port. Diagnostic.
    pub fn has_pinned_port(&self) -> bool {
        self.with_thread_port(|tp| tp.has_pinned())
    }

    /// The address of the node currently treated as primary, if known.
    pub fn address(&self) -> Option<ServerAddress> {
        self.primary
            .lock()
            .ok()
            .and_then(|primary| primary.clone())
            .map(|pair| pair.address)
    }

    /// Every server address this connector knows about.
    pub fn all_addresses(&self) -> Vec<ServerAddress> {
        match &self.replica_set {
            Some(replica_set) => replica_set.addresses(),
            None => self.seeds.clone(),
        }
    }

    /// `host:port` of the current primary, if known.
    pub fn connect_point(&self) -> Option<String> {
        self.address().map(|address| address.to_string())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shuts the connector down: all pools close, the topology tracker
    /// stops, and every further operation fails fast with `Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing connector {}", self.id);
        self.registry.close();
        if let Some(replica_set) = &self.replica_set {
            replica_set.close();
        }
    }

    fn assert_open(&self) -> BdocResult<()> {
        if self.is_closed() {
            Err(BdocError::Closed)
        } else {
            Ok(())
        }
    }

    fn with_thread_port<T>(&self, f: impl FnOnce(&mut ThreadPort) -> T) -> T {
        thread_port::with_thread_port(self.id, f)
    }

    fn acquire(&self, keep: bool, slave_ok: bool) -> BdocResult<PooledPort> {
        let o_secondary_pool = if slave_ok {
            match &self.replica_set {
                Some(replica_set) => match replica_set.a_secondary() {
                    Some(address) => Some(self.registry.get(&address)?),
                    None => None,
                },
                None => None,
            }
        } else {
            None
        };
        let pair = self.current_primary()?;
        self.with_thread_port(|tp| tp.acquire(keep, &pair.pool, o_secondary_pool.as_ref()))
    }

    // The current primary pair, discovering it first when unknown.
    fn current_primary(&self) -> BdocResult<PrimaryPair> {
        if let Some(pair) = self.primary.lock()?.clone() {
            return Ok(pair);
        }
        let replica_set = self
            .replica_set
            .as_ref()
            .ok_or(BdocError::Impl("stand-alone connector lost its address"))?;
        let node = replica_set
            .ensure_master()
            .ok_or(BdocError::Impl("no reachable primary in the replica set"))?;
        self.set_primary(node.address().clone())
    }

    // Swaps address and pool together; readers always observe a matched pair.
    fn set_primary(&self, address: ServerAddress) -> BdocResult<PrimaryPair> {
        let pool = self.registry.get(&address)?;
        let pair = PrimaryPair { address, pool };
        let mut primary = self.primary.lock()?;
        match primary.as_ref() {
            Some(previous) if previous.address == pair.address => {}
            _ => debug!("primary is now {}", pair.address),
        }
        *primary = Some(pair.clone());
        Ok(pair)
    }

    // The node we believed primary misbehaved: in replica mode, rediscover
    // before the next dispatch. Stand-alone connectors keep their address and
    // simply reconnect.
    fn primary_suspect(&self) {
        let Some(replica_set) = &self.replica_set else {
            return;
        };
        replica_set.refresh_now();
        match replica_set.ensure_master() {
            Some(node) => {
                if let Err(e) = self.set_primary(node.address().clone()) {
                    warn!("cannot adopt rediscovered primary: {e}");
                }
            }
            None => {
                warn!("no primary reachable after topology refresh");
                if let Ok(mut primary) = self.primary.lock() {
                    *primary = None;
                }
            }
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.close();
    }
}

fn send_and_confirm(
    port: &mut PooledPort,
    db: &str,
    message: &Message,
    write_concern: &WriteConcern,
) -> BdocResult<Option<Document>> {
    port.check_auth(db)?;
    port.send(message)?;
    if write_concern.call_get_last_error() {
        Ok(Some(port.run_command(db, &write_concern.command())?))
    } else {
        Ok(None)
    }
}

// Classifies the acknowledgement command's reply. A non-null `err` means the
// write failed; duplicate-key violations get their own error type.
fn evaluate_acknowledgement(ack: &Document) -> BdocResult<WriteResult> {
    if ack.has_value("err") {
        let message = ack.get_str("err").unwrap_or_default().to_string();
        let code = ack.get_i32("code").unwrap_or(-1);
        if code == 11000
            || code == 11001
            || message.starts_with("E11000")
            || message.starts_with("E11001")
        {
            return Err(BdocError::DuplicateKey { code, message });
        }
        return Err(BdocError::WriteFailure { code, message });
    }
    Ok(WriteResult::from_acknowledgement(ack))
}
