use std::time::Duration;

const DEFAULT_MAX_IDLE_PER_ADDRESS: usize = 10;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by every pool of one connector.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PoolOptions {
    #[serde(default = "default_max_idle")]
    max_idle_per_address: usize,
    #[serde(default = "default_connect_timeout")]
    connect_timeout: Duration,
    #[serde(default)]
    read_timeout: Option<Duration>,
}

fn default_max_idle() -> usize {
    DEFAULT_MAX_IDLE_PER_ADDRESS
}
fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

impl PoolOptions {
    /// How many returned ports a pool keeps around for reissue; ports beyond
    /// the ceiling are closed on return.
    #[must_use]
    pub fn with_max_idle_per_address(mut self, max_idle_per_address: usize) -> Self {
        self.max_idle_per_address = max_idle_per_address;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// A read timeout for the underlying sockets; `None` blocks indefinitely.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn max_idle_per_address(&self) -> usize {
        self.max_idle_per_address
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_idle_per_address: DEFAULT_MAX_IDLE_PER_ADDRESS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
        }
    }
}
