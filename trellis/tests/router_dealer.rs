//! Identity routing and registry lifecycle.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use trellis::prelude::*;

fn setup() -> (Rc<Reactor>, Registry) {
    trellis::dev_tracing::init_tracing();
    let reactor = Rc::new(Reactor::new());
    let registry = Registry::new(MemContext::new(), reactor.clone());
    (reactor, registry)
}

type Inbox = Rc<RefCell<Vec<Vec<Bytes>>>>;

fn dealer(registry: &Registry, address: &str, identity: &'static str) -> (DealerConnection, Inbox) {
    let inbox: Inbox = Rc::new(RefCell::new(Vec::new()));
    let sink = inbox.clone();
    let dealer = DealerConnection::open(
        registry,
        vec![Endpoint::connect(address)],
        &SocketOptions::default().with_identity(identity),
        Rc::new(move |_: &DealerConnection, parts: Vec<Bytes>| {
            sink.borrow_mut().push(parts);
        }),
    )
    .unwrap();
    (dealer, inbox)
}

#[test]
fn test_router_answers_each_dealer_by_identity() {
    let (reactor, registry) = setup();
    let _router = RouterConnection::open(
        &registry,
        vec![Endpoint::bind("inproc://hub")],
        &SocketOptions::default(),
        Rc::new(|conn: &RouterConnection, sender: Bytes, parts: Vec<Bytes>| {
            let mut greeting = b"hello ".to_vec();
            greeting.extend_from_slice(&sender);
            let mut reply = vec![Bytes::from(greeting)];
            reply.extend(parts);
            conn.send_multipart(sender, reply).unwrap();
        }),
    )
    .unwrap();

    let (alice, alice_inbox) = dealer(&registry, "inproc://hub", "alice");
    let (bob, bob_inbox) = dealer(&registry, "inproc://hub", "bob");

    alice.send_multipart([Bytes::from("a"), Bytes::from("b")]).unwrap();
    bob.send_msg("c").unwrap();
    reactor.run_for(Duration::from_millis(30));

    assert_eq!(
        *alice_inbox.borrow(),
        vec![vec![Bytes::from("hello alice"), Bytes::from("a"), Bytes::from("b")]]
    );
    assert_eq!(
        *bob_inbox.borrow(),
        vec![vec![Bytes::from("hello bob"), Bytes::from("c")]]
    );
}

#[test]
fn test_router_drops_messages_for_unknown_identity() {
    let (reactor, registry) = setup();
    let router = RouterConnection::open(
        &registry,
        vec![Endpoint::bind("inproc://strict")],
        &SocketOptions::default(),
        Rc::new(|_: &RouterConnection, _: Bytes, _: Vec<Bytes>| {}),
    )
    .unwrap();
    let (known, inbox) = dealer(&registry, "inproc://strict", "known");
    known.send_msg("register").unwrap();
    reactor.run_for(Duration::from_millis(20));

    router.send_msg("nobody", "lost").unwrap();
    router.send_msg("known", "kept").unwrap();
    reactor.run_for(Duration::from_millis(20));

    assert_eq!(*inbox.borrow(), vec![vec![Bytes::from("kept")]]);
    assert_eq!(router.connection().state(), ConnectionState::Active);
}

#[test]
fn test_registry_shutdown_closes_everything() {
    let (reactor, registry) = setup();
    let server = RepConnection::open(
        &registry,
        vec![Endpoint::bind("inproc://lifecycle")],
        &SocketOptions::default(),
        Rc::new(|_: &RepConnection, _: CorrelationId, _: Vec<Bytes>| {}),
    )
    .unwrap();
    let client = ReqConnection::open(
        &registry,
        vec![Endpoint::connect("inproc://lifecycle")],
        &SocketOptions::default(),
        ReqConfig::default(),
    )
    .unwrap();
    let pending = client.send_request("never answered").unwrap();
    reactor.run_for(Duration::from_millis(20));
    assert_eq!(registry.connection_count(), 2);
    assert_eq!(server.pending_replies(), 1);

    registry.shutdown().unwrap();

    assert!(registry.is_shut_down());
    assert_eq!(registry.connection_count(), 0);
    assert_eq!(reactor.reader_count(), 0);
    assert_eq!(client.connection().state(), ConnectionState::Closed);
    assert_eq!(server.connection().state(), ConnectionState::Closed);
    assert_eq!(server.pending_replies(), 0);
    assert!(matches!(
        reactor.run_until(pending, Some(Duration::from_secs(1))),
        Some(Err(TrellisError::ConnectionClosed))
    ));

    registry.shutdown().unwrap();
    assert!(DealerConnection::open(
        &registry,
        vec![Endpoint::connect("inproc://lifecycle")],
        &SocketOptions::default(),
        Rc::new(|_: &DealerConnection, _: Vec<Bytes>| {}),
    )
    .is_err());
}

#[test]
fn test_connection_shutdown_leaves_others_running() {
    let (reactor, registry) = setup();
    let router = RouterConnection::open(
        &registry,
        vec![Endpoint::bind("inproc://partial")],
        &SocketOptions::default(),
        Rc::new(|conn: &RouterConnection, sender: Bytes, parts: Vec<Bytes>| {
            conn.send_multipart(sender, parts).unwrap();
        }),
    )
    .unwrap();
    let (first, _) = dealer(&registry, "inproc://partial", "first");
    let (second, second_inbox) = dealer(&registry, "inproc://partial", "second");

    first.shutdown().unwrap();
    assert_eq!(registry.connection_count(), 2);

    second.send_msg("still here").unwrap();
    reactor.run_for(Duration::from_millis(20));

    assert_eq!(*second_inbox.borrow(), vec![vec![Bytes::from("still here")]]);
    assert!(router.connection().is_listening());
}
