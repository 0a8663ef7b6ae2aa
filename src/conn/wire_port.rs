use crate::{
    conn::{Authenticator, PoolOptions, Port, PortFactory, ServerAddress},
    BdocError, BdocResult, Message, Response,
};
use std::{
    collections::HashSet,
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Instant,
};

/// The default [`Port`]: a plain blocking TCP connection.
#[derive(Debug)]
pub struct WirePort {
    addr: ServerAddress,
    reader: TcpStream,
    writer: TcpStream,
    authenticated_dbs: HashSet<String>,
    authenticator: Option<Arc<dyn Authenticator>>,
    closed: bool,
}

impl WirePort {
    pub fn try_new(
        addr: &ServerAddress,
        options: &PoolOptions,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> BdocResult<Self> {
        let start = Instant::now();
        trace!("WirePort: connecting to {addr}");
        let socket_addr = (addr.host(), addr.port())
            .to_socket_addrs()
            .map_err(network)?
            .next()
            .ok_or_else(|| {
                network(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    format!("{addr} does not resolve"),
                ))
            })?;
        let tcpstream =
            TcpStream::connect_timeout(&socket_addr, options.connect_timeout()).map_err(network)?;
        tcpstream
            .set_read_timeout(options.read_timeout())
            .map_err(network)?;
        trace!(
            "WirePort to {addr} initialized ({} µs)",
            Instant::now().duration_since(start).as_micros(),
        );
        Ok(Self {
            addr: addr.clone(),
            writer: tcpstream.try_clone().map_err(network)?,
            reader: tcpstream,
            authenticated_dbs: HashSet::new(),
            authenticator,
            closed: false,
        })
    }
}

impl Port for WirePort {
    fn send(&mut self, message: &Message) -> BdocResult<()> {
        use std::io::Write;
        self.writer.write_all(message.bytes()).map_err(network)?;
        self.writer.flush().map_err(network)
    }

    fn call(&mut self, message: &Message, collection: &str) -> BdocResult<Response> {
        trace!(
            "WirePort {}: request {} against {collection}",
            self.addr,
            message.request_id()
        );
        self.send(message)?;
        let response = Response::parse(&mut self.reader)?;
        if response.response_to() != message.request_id() {
            return Err(crate::impl_err!(
                "reply to request {} arrived while awaiting {}",
                response.response_to(),
                message.request_id()
            ));
        }
        Ok(response)
    }

    fn check_auth(&mut self, db: &str) -> BdocResult<()> {
        if self.authenticated_dbs.contains(db) {
            return Ok(());
        }
        if let Some(authenticator) = self.authenticator.clone() {
            debug!("authenticating port to {} for \"{db}\"", self.addr);
            authenticator.authenticate(db, self)?;
        }
        self.authenticated_dbs.insert(db.to_string());
        Ok(())
    }

    fn address(&self) -> &ServerAddress {
        &self.addr
    }

    fn close(&mut self) {
        if !self.closed {
            self.reader.shutdown(Shutdown::Both).ok();
            self.closed = true;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for WirePort {
    fn drop(&mut self) {
        trace!("Drop of WirePort to {}", self.addr);
        self.close();
    }
}

fn network(source: std::io::Error) -> BdocError {
    BdocError::Network {
        source,
        retried: false,
    }
}

/// Opens [`WirePort`]s; the factory a connector uses unless told otherwise.
#[derive(Clone, Debug, Default)]
pub struct WireFactory {
    options: PoolOptions,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl WireFactory {
    pub fn new(options: PoolOptions, authenticator: Option<Arc<dyn Authenticator>>) -> Self {
        Self {
            options,
            authenticator,
        }
    }
}

impl PortFactory for WireFactory {
    fn open(&self, addr: &ServerAddress) -> BdocResult<Box<dyn Port>> {
        Ok(Box::new(WirePort::try_new(
            addr,
            &self.options,
            self.authenticator.clone(),
        )?))
    }
}
