use crate::{
    conn::{port::PooledPort, port_pool::PortPool},
    BdocError, BdocResult,
};
use std::{cell::RefCell, collections::HashMap, sync::Arc};

thread_local! {
    // One ThreadPort per (thread, connector). Keyed by connector id so
    // several connectors in one process stay independent.
    static THREAD_PORTS: RefCell<HashMap<u64, ThreadPort>> = RefCell::new(HashMap::new());
}

// Runs `f` on the calling thread's ThreadPort for the given connector,
// creating it lazily. Nothing here is ever touched by another thread.
pub(crate) fn with_thread_port<T>(connector_id: u64, f: impl FnOnce(&mut ThreadPort) -> T) -> T {
    THREAD_PORTS.with(|cell| f(cell.borrow_mut().entry(connector_id).or_default()))
}

/// Per-thread pinning state.
///
/// While a request is active, the first port acquired with `keep` is pinned:
/// it parks here between operations and every subsequent acquire returns it,
/// so all traffic of the request traverses one socket. A pinned port that
/// turns out to belong to a superseded pool (the primary moved) is quietly
/// returned to that pool and replaced.
#[derive(Debug, Default)]
pub(crate) struct ThreadPort {
    parked: Option<PooledPort>,
    pinned_id: Option<u64>,
    in_request: bool,
}

impl ThreadPort {
    pub fn acquire(
        &mut self,
        keep: bool,
        primary_pool: &Arc<PortPool>,
        secondary_pool: Option<&Arc<PortPool>>,
    ) -> BdocResult<PooledPort> {
        if let Some(pool) = secondary_pool {
            // one-shot, never pinned
            return pool.get();
        }
        if let Some(parked) = self.parked.take() {
            if Arc::ptr_eq(parked.pool(), primary_pool) {
                return Ok(parked);
            }
            trace!("pinned port belongs to a superseded pool, replacing it");
            self.pinned_id = None;
            let pool = Arc::clone(parked.pool());
            pool.done(parked);
        }
        let port = primary_pool.get()?;
        if keep && self.in_request {
            self.pinned_id = Some(port.id());
        }
        Ok(port)
    }

    /// Hands a port back: pinned ports park here, everything else returns to
    /// its pool.
    pub fn release(&mut self, port: PooledPort) {
        if self.pinned_id == Some(port.id()) {
            self.parked = Some(port);
        } else {
            let pool = Arc::clone(port.pool());
            pool.done(port);
        }
    }

    /// Fences a failed port and drops any pin on it.
    pub fn fail(&mut self, port: PooledPort, cause: &BdocError) {
        warn!("fencing port to {} after: {cause}", port.pool().address());
        if self.pinned_id == Some(port.id()) {
            self.pinned_id = None;
            self.parked = None;
        }
        let pool = Arc::clone(port.pool());
        pool.error(port);
    }

    pub fn request_start(&mut self) {
        self.in_request = true;
    }

    /// Pins a port up front so even the first operation of the request sees
    /// the socket every later one will use.
    pub fn request_ensure_connection(&mut self, primary_pool: &Arc<PortPool>) -> BdocResult<()> {
        if self.in_request && self.pinned_id.is_none() {
            let port = self.acquire(true, primary_pool, None)?;
            self.release(port);
        }
        Ok(())
    }

    pub fn request_done(&mut self) {
        if let Some(parked) = self.parked.take() {
            let pool = Arc::clone(parked.pool());
            pool.done(parked);
        }
        self.pinned_id = None;
        self.in_request = false;
    }

    pub fn has_pinned(&self) -> bool {
        self.pinned_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadPort;
    use crate::conn::port_pool::tests::fake_pool;

    #[test]
    fn acquire_without_request_never_pins() {
        let (pool, _) = fake_pool(10);
        let mut tp = ThreadPort::default();
        let port = tp.acquire(true, &pool, None).unwrap();
        assert!(!tp.has_pinned());
        tp.release(port);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn request_pins_and_reuses_one_port() {
        let (pool, factory) = fake_pool(10);
        let mut tp = ThreadPort::default();
        tp.request_start();

        let first = tp.acquire(true, &pool, None).unwrap();
        let first_id = first.id();
        assert!(tp.has_pinned());
        tp.release(first);
        // parked, not returned to the pool
        assert_eq!(pool.idle_count(), 0);

        let second = tp.acquire(true, &pool, None).unwrap();
        assert_eq!(second.id(), first_id);
        tp.release(second);

        tp.request_done();
        assert!(!tp.has_pinned());
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(
            factory.opened.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[test]
    fn pinned_port_from_superseded_pool_is_replaced() {
        let (old_pool, _) = fake_pool(10);
        let (new_pool, _) = fake_pool(10);
        let mut tp = ThreadPort::default();
        tp.request_start();

        let port = tp.acquire(true, &old_pool, None).unwrap();
        tp.release(port);

        let replacement = tp.acquire(true, &new_pool, None).unwrap();
        assert!(std::sync::Arc::ptr_eq(replacement.pool(), &new_pool));
        // the old pin went home to its own pool
        assert_eq!(old_pool.idle_count(), 1);
        tp.release(replacement);
        tp.request_done();
    }

    #[test]
    fn failed_pin_is_fenced_and_forgotten() {
        let (pool, factory) = fake_pool(10);
        let mut tp = ThreadPort::default();
        tp.request_start();

        let port = tp.acquire(true, &pool, None).unwrap();
        tp.fail(port, &crate::BdocError::Impl("wire broke"));
        assert!(!tp.has_pinned());
        assert_eq!(pool.idle_count(), 0);

        // the next acquire opens a fresh port
        let fresh = tp.acquire(true, &pool, None).unwrap();
        tp.release(fresh);
        tp.request_done();
        assert_eq!(
            factory.opened.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }

    #[test]
    fn secondary_acquire_is_one_shot() {
        let (primary, _) = fake_pool(10);
        let (secondary, _) = fake_pool(10);
        let mut tp = ThreadPort::default();
        tp.request_start();

        let port = tp.acquire(true, &primary, Some(&secondary)).unwrap();
        assert!(std::sync::Arc::ptr_eq(port.pool(), &secondary));
        assert!(!tp.has_pinned());
        tp.release(port);
        assert_eq!(secondary.idle_count(), 1);
        tp.request_done();
    }

    #[test]
    fn request_ensure_connection_pins_up_front() {
        let (pool, _) = fake_pool(10);
        let mut tp = ThreadPort::default();

        // outside a request it is a no-op
        tp.request_ensure_connection(&pool).unwrap();
        assert!(!tp.has_pinned());

        tp.request_start();
        tp.request_ensure_connection(&pool).unwrap();
        assert!(tp.has_pinned());
        tp.request_done();
        assert!(!tp.has_pinned());
        assert_eq!(pool.idle_count(), 1);
    }
}
