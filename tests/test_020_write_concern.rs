
use bdocconnect::{
    BdocError, BdocResult, Connector, Document, Message, PoolOptions, Port, PortFactory, Response,
    ServerAddress, WriteConcern,
};
use log::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use test_utils::{MockReply, MockRequest, MockServer};

#[test]
fn test_020_write_concern() -> BdocResult<()> {
    let _log_handle = test_utils::init_logger();
    duplicate_key_is_classified_and_port_survives()?;
    unacknowledged_say_sends_no_confirmation()?;
    network_errors_follow_the_concern()?;
    Ok(())
}

fn duplicate_key_is_classified_and_port_survives() -> BdocResult<()> {
    info!("duplicate key surfaces as DuplicateKey; the port goes back to the pool");
    let gle_count = Arc::new(AtomicUsize::new(0));
    let handler_gle_count = Arc::clone(&gle_count);
    let server = MockServer::start(Arc::new(move |request: &MockRequest| {
        if request.is_command("getlasterror") {
            let n = handler_gle_count.fetch_add(1, Ordering::SeqCst);
            return if n == 0 {
                MockReply::Documents(test_utils::gle_reply(
                    Some("E11000 duplicate key error index: t.c.$a_1"),
                    Some(11000),
                    0,
                ))
            } else {
                MockReply::Documents(test_utils::gle_reply(None, None, 1))
            };
        }
        MockReply::None
    }));

    let connector = Connector::with_options(
        vec![server.address()],
        &test_utils::test_pool_options(),
        None,
    )?;
    let insert = Message::insert("t.c", &[Document::new().with("a", 1_i32)])?;

    match connector.say("t", &insert, &WriteConcern::ACKNOWLEDGED) {
        Err(BdocError::DuplicateKey { code, message }) => {
            assert_eq!(code, 11000);
            assert!(message.starts_with("E11000"));
        }
        other => panic!("expected DuplicateKey, got {other:?}"),
    }

    // not fenced: the second write travels over the same connection
    let result = connector.say("t", &insert, &WriteConcern::ACKNOWLEDGED)?;
    assert!(result.ok());
    assert_eq!(result.n(), 1);
    assert_eq!(server.connection_count(), 1);
    connector.close();
    Ok(())
}

fn unacknowledged_say_sends_no_confirmation() -> BdocResult<()> {
    info!("w=0 sends the write and never asks for acknowledgement");
    let inserts = Arc::new(AtomicUsize::new(0));
    let confirmations = Arc::new(AtomicUsize::new(0));
    let handler_inserts = Arc::clone(&inserts);
    let handler_confirmations = Arc::clone(&confirmations);
    let server = MockServer::start(Arc::new(move |request: &MockRequest| {
        if request.opcode == test_utils::OP_INSERT {
            handler_inserts.fetch_add(1, Ordering::SeqCst);
        }
        if request.is_command("getlasterror") {
            handler_confirmations.fetch_add(1, Ordering::SeqCst);
            return MockReply::Documents(test_utils::gle_reply(None, None, 0));
        }
        MockReply::None
    }));

    let connector = Connector::with_options(
        vec![server.address()],
        &test_utils::test_pool_options(),
        None,
    )?;
    let insert = Message::insert("t.c", &[Document::new().with("b", 2_i32)])?;
    let result = connector.say("t", &insert, &WriteConcern::UNACKNOWLEDGED)?;
    assert!(!result.acknowledged());
    assert!(result.ok());

    // the send is fire-and-forget; give the server a moment to read it
    for _ in 0..50 {
        if inserts.load(Ordering::SeqCst) > 0 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(inserts.load(Ordering::SeqCst), 1);
    assert_eq!(confirmations.load(Ordering::SeqCst), 0);
    connector.close();
    Ok(())
}

// A port whose wire broke before the first byte.
#[derive(Debug)]
struct BrokenPort {
    addr: ServerAddress,
    closed: bool,
}

impl Port for BrokenPort {
    fn send(&mut self, _message: &Message) -> BdocResult<()> {
        Err(BdocError::Network {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "wire broke"),
            retried: false,
        })
    }
    fn call(&mut self, message: &Message, _collection: &str) -> BdocResult<Response> {
        self.send(message).map(|()| unreachable!())
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

#[derive(Debug)]
struct BrokenFactory;

impl PortFactory for BrokenFactory {
    fn open(&self, addr: &ServerAddress) -> BdocResult<Box<dyn Port>> {
        Ok(Box::new(BrokenPort {
            addr: addr.clone(),
            closed: false,
        }))
    }
}

fn network_errors_follow_the_concern() -> BdocResult<()> {
    info!("network failures raise or are reported in-band, as the concern asks");
    let connector = Connector::with_factory(
        vec!["unreachable:27017".parse()?],
        Arc::new(BrokenFactory),
        PoolOptions::default(),
    )?;
    let insert = Message::insert("t.c", &[Document::new()])?;

    // w = -1 swallows the failure into a synthetic result
    let result = connector.say("t", &insert, &WriteConcern::NONE)?;
    assert!(!result.ok());
    assert_eq!(result.err(), Some("NETWORK ERROR"));

    // w = 0 surfaces it
    assert!(matches!(
        connector.say("t", &insert, &WriteConcern::UNACKNOWLEDGED),
        Err(BdocError::Network { .. })
    ));
    connector.close();
    Ok(())
}
