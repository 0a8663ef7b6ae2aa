use crate::{
    conn::{port_pool::PortPool, PoolOptions, PortFactory, ServerAddress},
    BdocError, BdocResult,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// The server-address → port-pool map of one connector.
///
/// Pools come into existence on first request for their address and share one
/// set of options. Closing the registry closes every pool; afterwards `get`
/// fails fast.
#[derive(Debug)]
pub struct PoolRegistry {
    factory: Arc<dyn PortFactory>,
    options: PoolOptions,
    pools: Mutex<PoolMap>,
}

#[derive(Debug, Default)]
struct PoolMap {
    by_addr: HashMap<ServerAddress, Arc<PortPool>>,
    closed: bool,
}

impl PoolRegistry {
    pub fn new(factory: Arc<dyn PortFactory>, options: PoolOptions) -> Self {
        Self {
            factory,
            options,
            pools: Mutex::new(PoolMap::default()),
        }
    }

    /// The pool for `addr`, created on first use.
    pub fn get(&self, addr: &ServerAddress) -> BdocResult<Arc<PortPool>> {
        let mut pools = self.pools.lock()?;
        if pools.closed {
            return Err(BdocError::Closed);
        }
        if let Some(pool) = pools.by_addr.get(addr) {
            return Ok(Arc::clone(pool));
        }
        debug!("opening port pool for {addr}");
        let pool = PortPool::new(
            addr.clone(),
            Arc::clone(&self.factory),
            self.options.clone(),
        );
        pools.by_addr.insert(addr.clone(), Arc::clone(&pool));
        Ok(pool)
    }

    /// Closes all pools; further `get`s fail with `Closed`.
    pub fn close(&self) {
        let drained: Vec<Arc<PortPool>> = match self.pools.lock() {
            Ok(mut pools) => {
                pools.closed = true;
                pools.by_addr.drain().map(|(_, pool)| pool).collect()
            }
            Err(_) => return,
        };
        for pool in drained {
            pool.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pools.lock().map(|pools| pools.closed).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::PoolRegistry;
    use crate::{
        conn::{port_pool::tests::FakeFactory, PoolOptions, PortFactory},
        BdocError, ServerAddress,
    };
    use std::sync::Arc;

    fn registry() -> PoolRegistry {
        PoolRegistry::new(
            Arc::new(FakeFactory::default()) as Arc<dyn PortFactory>,
            PoolOptions::default(),
        )
    }

    #[test]
    fn pools_are_created_lazily_and_shared() {
        let registry = registry();
        let a: ServerAddress = "a:1".parse().unwrap();
        let b: ServerAddress = "b:1".parse().unwrap();

        let pool_a1 = registry.get(&a).unwrap();
        let pool_a2 = registry.get(&a).unwrap();
        let pool_b = registry.get(&b).unwrap();
        assert!(Arc::ptr_eq(&pool_a1, &pool_a2));
        assert!(!Arc::ptr_eq(&pool_a1, &pool_b));
    }

    #[test]
    fn close_closes_pools_and_refuses_further_gets() {
        let registry = registry();
        let a: ServerAddress = "a:1".parse().unwrap();
        let pool = registry.get(&a).unwrap();

        registry.close();
        assert!(pool.is_closed());
        assert!(matches!(registry.get(&a), Err(BdocError::Closed)));
    }
}
