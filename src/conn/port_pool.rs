use crate::{
    conn::{
        port::{next_port_id, PooledPort},
        PoolOptions, Port, PortFactory, ServerAddress,
    },
    BdocError, BdocResult,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// A reservoir of reusable ports for one server address.
///
/// At most one holder sees a given port at a time: `get` hands a port out,
/// and it only becomes available again through `done`. Ports handed to
/// `error` are closed and never reissued.
#[derive(Debug)]
pub struct PortPool {
    addr: ServerAddress,
    factory: Arc<dyn PortFactory>,
    options: PoolOptions,
    idle: Mutex<Vec<Box<dyn Port>>>,
    closed: AtomicBool,
}

impl PortPool {
    pub(crate) fn new(
        addr: ServerAddress,
        factory: Arc<dyn PortFactory>,
        options: PoolOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            addr,
            factory,
            options,
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Hands out an idle port, opening a fresh one when none is available.
    pub fn get(self: &Arc<Self>) -> BdocResult<PooledPort> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BdocError::Closed);
        }
        let o_idle = self.idle.lock()?.pop();
        let inner = match o_idle {
            Some(inner) => {
                trace!("reissuing idle port to {}", self.addr);
                inner
            }
            None => self.factory.open(&self.addr)?,
        };
        Ok(PooledPort::new(next_port_id(), inner, Arc::clone(self)))
    }

    /// Takes a healthy port back for reissue. Ports beyond the idle ceiling,
    /// and any port returned after the pool closed, are closed instead.
    pub fn done(&self, mut port: PooledPort) {
        let Some(mut inner) = port.take_inner() else {
            return;
        };
        if self.closed.load(Ordering::SeqCst) || inner.is_closed() {
            inner.close();
            return;
        }
        match self.idle.lock() {
            Ok(mut idle) if idle.len() < self.options.max_idle_per_address() => {
                idle.push(inner);
            }
            _ => inner.close(),
        }
    }

    /// Fences a failed port: closed, discarded, never reissued.
    pub fn error(&self, mut port: PooledPort) {
        if let Some(mut inner) = port.take_inner() {
            warn!("fencing port to {}", self.addr);
            inner.close();
        }
    }

    /// Closes the idle ports and refuses further `get`s.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut idle) = self.idle.lock() {
            debug!("closing pool for {} ({} idle ports)", self.addr, idle.len());
            for mut inner in idle.drain(..) {
                inner.close();
            }
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of ports currently parked for reissue.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::PortPool;
    use crate::{
        conn::{PoolOptions, Port, PortFactory, ServerAddress},
        BdocError, BdocResult, Document, Message, Response,
    };
    use std::sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    };

    // An in-memory port that remembers its serial number and scripted
    // command replies.
    #[derive(Debug)]
    pub(crate) struct FakePort {
        pub serial: u64,
        pub addr: ServerAddress,
        pub closed: bool,
        pub replies: Arc<Mutex<Vec<Document>>>,
    }

    impl Port for FakePort {
        fn send(&mut self, _message: &Message) -> BdocResult<()> {
            Ok(())
        }
        fn call(&mut self, _message: &Message, _collection: &str) -> BdocResult<Response> {
            Err(BdocError::Impl("fake port has no wire"))
        }
        fn run_command(&mut self, _db: &str, _command: &Document) -> BdocResult<Document> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or(BdocError::Impl("no scripted reply"))
        }
        fn check_auth(&mut self, _db: &str) -> BdocResult<()> {
            Ok(())
        }
        fn address(&self) -> &ServerAddress {
            &self.addr
        }
        fn close(&mut self) {
            self.closed = true;
        }
        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct FakeFactory {
        pub opened: AtomicU64,
        pub replies: Arc<Mutex<Vec<Document>>>,
    }

    impl PortFactory for FakeFactory {
        fn open(&self, addr: &ServerAddress) -> BdocResult<Box<dyn Port>> {
            let serial = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Box::new(FakePort {
                serial,
                addr: addr.clone(),
                closed: false,
                replies: Arc::clone(&self.replies),
            }))
        }
    }

    pub(crate) fn fake_pool(max_idle: usize) -> (Arc<PortPool>, Arc<FakeFactory>) {
        let factory = Arc::new(FakeFactory::default());
        let pool = PortPool::new(
            "fake:1".parse().unwrap(),
            Arc::clone(&factory) as Arc<dyn PortFactory>,
            PoolOptions::default().with_max_idle_per_address(max_idle),
        );
        (pool, factory)
    }

    #[test]
    fn done_ports_are_reissued() {
        let (pool, factory) = fake_pool(10);
        let first = pool.get().unwrap();
        let first_id = first.id();
        pool.done(first);
        assert_eq!(pool.idle_count(), 1);

        let second = pool.get().unwrap();
        // same underlying port, fresh handle identity
        assert_ne!(second.id(), first_id);
        assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
        pool.done(second);
    }

    #[test]
    fn errored_ports_are_never_reissued() {
        let (pool, factory) = fake_pool(10);
        let port = pool.get().unwrap();
        pool.error(port);
        assert_eq!(pool.idle_count(), 0);

        let _fresh = pool.get().unwrap();
        assert_eq!(factory.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn idle_ceiling_is_enforced() {
        let (pool, _factory) = fake_pool(1);
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        pool.done(a);
        pool.done(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn closed_pool_refuses_get() {
        let (pool, _factory) = fake_pool(10);
        let port = pool.get().unwrap();
        pool.close();
        assert!(matches!(pool.get(), Err(BdocError::Closed)));
        // in-flight ports can still come home; they are closed on arrival
        pool.done(port);
        assert_eq!(pool.idle_count(), 0);
    }
}
