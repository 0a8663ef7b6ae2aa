pub(crate) mod authentication;
pub(crate) mod connector;
pub(crate) mod pool_options;
pub(crate) mod pool_registry;
pub(crate) mod port;
pub(crate) mod port_pool;
pub(crate) mod replica_set_status;
pub(crate) mod server_address;
pub(crate) mod thread_port;
pub(crate) mod wire_port;

pub use self::authentication::Authenticator;
pub use self::connector::Connector;
pub use self::pool_options::PoolOptions;
pub use self::pool_registry::PoolRegistry;
pub use self::port::{Port, PortFactory, PooledPort};
pub use self::port_pool::PortPool;
pub use self::replica_set_status::{Node, ReplicaSetStatus};
pub use self::server_address::{ServerAddress, DEFAULT_PORT};
pub use self::wire_port::{WireFactory, WirePort};
