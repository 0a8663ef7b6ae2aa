use crate::{
    conn::{PortFactory, ServerAddress},
    usage_err, BdocResult, Document,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

// Cadence of the background topology probe.
const REFRESH_EVERY: Duration = Duration::from_secs(5);
// Probes older than this say nothing about the present.
const STALE_AFTER: Duration = Duration::from_secs(10);

/// One member's most recent probe outcome.
#[derive(Clone, Debug)]
pub struct Node {
    address: ServerAddress,
    is_primary: bool,
    is_secondary: bool,
    probed_at: Instant,
}

impl Node {
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn is_secondary(&self) -> bool {
        self.is_secondary
    }

    fn is_fresh(&self) -> bool {
        self.probed_at.elapsed() < STALE_AFTER
    }
}

#[derive(Debug, Default)]
struct RsState {
    // seed list plus everything discovered since, in discovery order
    addresses: Vec<ServerAddress>,
    members: Vec<Node>,
}

#[derive(Debug)]
struct RsInner {
    factory: Arc<dyn PortFactory>,
    state: Mutex<RsState>,
    // serializes whole probe rounds; a slow round must not overwrite the
    // results of a newer forced one
    refresh_gate: Mutex<()>,
    stop: AtomicBool,
    secondary_cursor: AtomicUsize,
}

/// Background tracker of a replica set's topology.
///
/// One refresher thread probes every known member on a fixed cadence; callers
/// can force a refresh when the cluster contradicts the cached view. A node
/// is offered as primary only while its latest probe self-reports primary and
/// is younger than the staleness window.
#[derive(Debug)]
pub struct ReplicaSetStatus {
    inner: Arc<RsInner>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicaSetStatus {
    pub fn new(seeds: Vec<ServerAddress>, factory: Arc<dyn PortFactory>) -> BdocResult<Self> {
        if seeds.is_empty() {
            return Err(usage_err!("a replica set needs at least one seed address"));
        }
        debug!("tracking replica set seeded with {seeds:?}");
        let inner = Arc::new(RsInner {
            factory,
            state: Mutex::new(RsState {
                addresses: seeds,
                members: Vec::new(),
            }),
            refresh_gate: Mutex::new(()),
            stop: AtomicBool::new(false),
            secondary_cursor: AtomicUsize::new(0),
        });
        let refresher_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("bdoc-replica-refresh".to_string())
            .spawn(move || {
                while !refresher_inner.stop.load(Ordering::SeqCst) {
                    refresher_inner.refresh();
                    std::thread::park_timeout(REFRESH_EVERY);
                }
                trace!("replica set refresher stopped");
            })
            .map_err(|e| crate::impl_err!("cannot spawn the refresher thread: {e}"))?;
        Ok(Self {
            inner,
            refresher: Mutex::new(Some(handle)),
        })
    }

    /// The current primary, refreshing first if it is unknown or stale.
    /// `None` means no reachable member claims to be primary.
    pub fn ensure_master(&self) -> Option<Node> {
        if let Some(node) = self.fresh_primary() {
            return Some(node);
        }
        debug!("primary unknown or stale, probing the replica set");
        self.inner.refresh();
        self.fresh_primary()
    }

    /// Discards the cached view and probes every member now.
    pub fn refresh_now(&self) {
        self.inner.refresh();
    }

    /// Any healthy secondary, rotating through them for fairness.
    pub fn a_secondary(&self) -> Option<ServerAddress> {
        let state = self.inner.state.lock().ok()?;
        let secondaries: Vec<&Node> = state
            .members
            .iter()
            .filter(|m| m.is_secondary && m.is_fresh())
            .collect();
        if secondaries.is_empty() {
            return None;
        }
        let idx = self.inner.secondary_cursor.fetch_add(1, Ordering::Relaxed) % secondaries.len();
        Some(secondaries[idx].address.clone())
    }

    /// Every member address this tracker knows about.
    pub fn addresses(&self) -> Vec<ServerAddress> {
        self.inner
            .state
            .lock()
            .map(|state| state.addresses.clone())
            .unwrap_or_default()
    }

    /// Stops and joins the refresher thread.
    pub fn close(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Ok(mut o_handle) = self.refresher.lock() {
            if let Some(handle) = o_handle.take() {
                handle.thread().unpark();
                handle.join().ok();
            }
        }
    }

    fn fresh_primary(&self) -> Option<Node> {
        self.inner
            .state
            .lock()
            .ok()?
            .members
            .iter()
            .find(|m| m.is_primary && m.is_fresh())
            .cloned()
    }
}

impl Drop for ReplicaSetStatus {
    fn drop(&mut self) {
        self.close();
    }
}

struct ProbeReply {
    is_primary: bool,
    is_secondary: bool,
    hosts: Vec<ServerAddress>,
    primary: Option<ServerAddress>,
}

impl RsInner {
    // Probes every known member, following discovered hosts in the same pass,
    // then swaps the member view in one step. No lock is held during I/O.
    fn refresh(&self) {
        let Ok(_gate) = self.refresh_gate.lock() else {
            return;
        };
        let mut queue = match self.state.lock() {
            Ok(state) => state.addresses.clone(),
            Err(_) => return,
        };
        let mut members = Vec::new();
        let mut i = 0;
        while i < queue.len() {
            let address = queue[i].clone();
            i += 1;
            let node = match self.probe(&address) {
                Ok(probe) => {
                    for discovered in probe
                        .hosts
                        .into_iter()
                        .chain(probe.primary.into_iter())
                    {
                        if !queue.contains(&discovered) {
                            debug!("discovered replica set member {discovered}");
                            queue.push(discovered);
                        }
                    }
                    Node {
                        address,
                        is_primary: probe.is_primary,
                        is_secondary: probe.is_secondary,
                        probed_at: Instant::now(),
                    }
                }
                Err(e) => {
                    debug!("probe of {address} failed: {e}");
                    Node {
                        address,
                        is_primary: false,
                        is_secondary: false,
                        probed_at: Instant::now(),
                    }
                }
            };
            members.push(node);
        }
        if let Some(primary) = members.iter().find(|m| m.is_primary) {
            trace!("replica set view: primary {}", primary.address);
        } else {
            warn!("replica set view: no primary among {queue:?}");
        }
        if let Ok(mut state) = self.state.lock() {
            state.addresses = queue;
            state.members = members;
        }
    }

    // One-shot connection; member state comes from the node's self-report.
    fn probe(&self, address: &ServerAddress) -> BdocResult<ProbeReply> {
        let mut port = self.factory.open(address)?;
        let command = Document::new().with("ismaster", 1_i32);
        let outcome = port.run_command("admin", &command);
        port.close();
        let reply = outcome?;
        Ok(ProbeReply {
            is_primary: reply.get_bool("ismaster").unwrap_or(false),
            is_secondary: reply.get_bool("secondary").unwrap_or(false),
            hosts: reply
                .get_array("hosts")
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
                        .collect()
                })
                .unwrap_or_default(),
            primary: reply.get_str("primary").and_then(|s| s.parse().ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ReplicaSetStatus;
    use crate::{
        conn::{Port, PortFactory, ServerAddress},
        BdocResult, Document, Message, Response,
    };
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    // Replies keyed by address, with infinite supply; the background
    // refresher may probe concurrently without draining anything.
    #[derive(Debug, Default)]
    struct ScriptedFactory {
        replies: Mutex<HashMap<String, Document>>,
    }

    impl ScriptedFactory {
        fn set_reply(&self, addr: &str, reply: Document) {
            self.replies
                .lock()
                .unwrap()
                .insert(addr.to_string(), reply);
        }
    }

    #[derive(Debug)]
    struct ScriptedPort {
        addr: ServerAddress,
        reply: Option<Document>,
        closed: bool,
    }

    impl Port for ScriptedPort {
        fn send(&mut self, _message: &Message) -> BdocResult<()> {
            Ok(())
        }
        fn call(&mut self, _message: &Message, _collection: &str) -> BdocResult<Response> {
            Err(crate::BdocError::Impl("scripted port answers commands only"))
        }
        fn run_command(&mut self, _db: &str, _command: &Document) -> BdocResult<Document> {
            self.reply
                .take()
                .ok_or(crate::BdocError::Impl("no reply scripted for this address"))
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

    impl PortFactory for ScriptedFactory {
        fn open(&self, addr: &ServerAddress) -> BdocResult<Box<dyn Port>> {
            let reply = self.replies.lock().unwrap().get(&addr.to_string()).cloned();
            Ok(Box::new(ScriptedPort {
                addr: addr.clone(),
                reply,
                closed: false,
            }))
        }
    }

    fn ismaster(primary: bool, secondary: bool, primary_addr: Option<&str>) -> Document {
        let mut doc = Document::new()
            .with("ismaster", primary)
            .with("secondary", secondary)
            .with("ok", 1.0_f64);
        if let Some(addr) = primary_addr {
            doc.push("primary", addr);
        }
        doc
    }

    #[test]
    fn empty_seed_list_is_rejected() {
        let factory = Arc::new(ScriptedFactory::default());
        assert!(ReplicaSetStatus::new(Vec::new(), factory).is_err());
    }

    #[test]
    fn primary_and_secondaries_follow_the_probes() {
        let factory = Arc::new(ScriptedFactory::default());
        factory.set_reply("a:1", ismaster(true, false, None));
        factory.set_reply("b:1", ismaster(false, true, Some("a:1")));

        let rs = ReplicaSetStatus::new(
            vec!["a:1".parse().unwrap(), "b:1".parse().unwrap()],
            Arc::clone(&factory) as Arc<dyn PortFactory>,
        )
        .unwrap();

        let primary = rs.ensure_master().unwrap();
        assert_eq!(primary.address().to_string(), "a:1");
        assert_eq!(rs.a_secondary().unwrap().to_string(), "b:1");

        // the cluster elects b; the next forced refresh must follow
        factory.set_reply("a:1", ismaster(false, true, Some("b:1")));
        factory.set_reply("b:1", ismaster(true, false, None));
        rs.refresh_now();
        let primary = rs.ensure_master().unwrap();
        assert_eq!(primary.address().to_string(), "b:1");

        rs.close();
    }

    #[test]
    fn discovered_hosts_join_the_candidate_list() {
        let factory = Arc::new(ScriptedFactory::default());
        let hosts: Vec<crate::BdocValue> = vec!["a:1".into(), "c:1".into()];
        factory.set_reply(
            "a:1",
            ismaster(true, false, None).with("hosts", hosts),
        );
        factory.set_reply("c:1", ismaster(false, true, Some("a:1")));

        let rs = ReplicaSetStatus::new(
            vec!["a:1".parse().unwrap()],
            Arc::clone(&factory) as Arc<dyn PortFactory>,
        )
        .unwrap();

        rs.refresh_now();
        let addresses: Vec<String> = rs.addresses().iter().map(ToString::to_string).collect();
        assert!(addresses.contains(&"c:1".to_string()));
        assert_eq!(rs.a_secondary().unwrap().to_string(), "c:1");
        rs.close();
    }

    #[test]
    fn unreachable_members_offer_no_primary() {
        let factory = Arc::new(ScriptedFactory::default());
        // no replies scripted: every probe fails
        let rs = ReplicaSetStatus::new(
            vec!["a:1".parse().unwrap()],
            Arc::clone(&factory) as Arc<dyn PortFactory>,
        )
        .unwrap();
        assert!(rs.ensure_master().is_none());
        assert!(rs.a_secondary().is_none());
        rs.close();
    }
}
