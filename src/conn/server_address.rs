use crate::{usage_err, BdocError, BdocResult};

/// Port a server is assumed to listen on when the address does not name one.
pub const DEFAULT_PORT: u16 = 27017;

/// Host identity of one database server.
///
/// Addresses compare and hash by value, so equivalent addresses arriving from
/// different sources (seed lists, topology probes) always select the same
/// pool.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Display for ServerAddress {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for ServerAddress {
    type Err = BdocError;

    fn from_str(s: &str) -> BdocResult<Self> {
        let (host, o_port) = match s.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (s, None),
        };
        if host.is_empty() {
            return Err(usage_err!("server address \"{s}\" has no host"));
        }
        let port = match o_port {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| usage_err!("server address \"{s}\" has a malformed port"))?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for ServerAddress {
    type Error = BdocError;

    fn try_from(s: String) -> BdocResult<Self> {
        s.parse()
    }
}

impl From<ServerAddress> for String {
    fn from(addr: ServerAddress) -> Self {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{ServerAddress, DEFAULT_PORT};
    use std::collections::HashMap;

    #[test]
    fn parsing() {
        let addr: ServerAddress = "db1.example.com:4711".parse().unwrap();
        assert_eq!(addr.host(), "db1.example.com");
        assert_eq!(addr.port(), 4711);
        assert_eq!(addr.to_string(), "db1.example.com:4711");

        let defaulted: ServerAddress = "localhost".parse().unwrap();
        assert_eq!(defaulted.port(), DEFAULT_PORT);

        assert!("".parse::<ServerAddress>().is_err());
        assert!(":4711".parse::<ServerAddress>().is_err());
        assert!("host:notaport".parse::<ServerAddress>().is_err());
    }

    #[test]
    fn equality_is_by_value() {
        let a: ServerAddress = "host:1".parse().unwrap();
        let b = ServerAddress::new("host".to_string(), 1);
        assert_eq!(a, b);

        let mut pools = HashMap::new();
        pools.insert(a, "pool");
        assert_eq!(pools.get(&b), Some(&"pool"));
    }

    #[test]
    fn serde_uses_the_text_form() {
        let addr: ServerAddress = "db1:27018".parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"db1:27018\"");
        let back: ServerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
