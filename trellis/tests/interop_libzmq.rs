//! The same patterns over real libzmq sockets on loopback TCP.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use trellis::prelude::*;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn setup() -> (Rc<Reactor>, Registry, String) {
    trellis::dev_tracing::init_tracing();
    let reactor = Rc::new(Reactor::new());
    let registry = Registry::new(ZmqContext::new(), reactor.clone());
    let port = portpicker::pick_unused_port().expect("no free port");
    (reactor, registry, format!("tcp://127.0.0.1:{port}"))
}

#[test]
fn test_request_reply_over_tcp() {
    let (reactor, registry, address) = setup();
    let _server = RepConnection::open(
        &registry,
        vec![Endpoint::bind(address.clone())],
        &SocketOptions::default(),
        Rc::new(|conn: &RepConnection, id: CorrelationId, payload: Vec<Bytes>| {
            let body = String::from_utf8_lossy(&payload[0]).into_owned();
            conn.reply(id, Bytes::from(format!("REP: {body}"))).unwrap();
        }),
    )
    .unwrap();
    let client = ReqConnection::open(
        &registry,
        vec![Endpoint::connect(address)],
        &SocketOptions::default(),
        ReqConfig::default(),
    )
    .unwrap();

    let replies: Vec<ReplyFuture> = (0..10)
        .map(|i| client.send_request(Bytes::from(format!("REQ{i}"))).unwrap())
        .collect();
    let results = reactor
        .run_until(futures::future::join_all(replies), WAIT)
        .unwrap();
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap(), vec![Bytes::from(format!("REP: REQ{i}"))]);
    }

    registry.shutdown().unwrap();
}

#[test]
fn test_router_dealer_over_tcp() {
    let (reactor, registry, address) = setup();
    let _router = RouterConnection::open(
        &registry,
        vec![Endpoint::bind(address.clone())],
        &SocketOptions::default(),
        Rc::new(|conn: &RouterConnection, sender: Bytes, parts: Vec<Bytes>| {
            assert_eq!(sender, "CLIENT_A");
            assert_eq!(parts, vec![Bytes::from("Hello")]);
            conn.send_msg(sender, "World").unwrap();
        }),
    )
    .unwrap();

    let inbox = Rc::new(RefCell::new(Vec::new()));
    let sink = inbox.clone();
    let dealer = DealerConnection::open(
        &registry,
        vec![Endpoint::connect(address)],
        &SocketOptions::default().with_identity("CLIENT_A"),
        Rc::new(move |_: &DealerConnection, parts: Vec<Bytes>| {
            sink.borrow_mut().push(parts);
        }),
    )
    .unwrap();

    dealer.send_msg("Hello").unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while inbox.borrow().is_empty() && std::time::Instant::now() < deadline {
        reactor.run_for(Duration::from_millis(10));
    }

    assert_eq!(*inbox.borrow(), vec![vec![Bytes::from("World")]]);
    registry.shutdown().unwrap();
}

#[test]
fn test_publish_subscribe_over_tcp() {
    let (reactor, registry, address) = setup();
    let publisher = PubConnection::open(
        &registry,
        vec![Endpoint::bind(address.clone())],
        &SocketOptions::default(),
    )
    .unwrap();

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let sub = SubConnection::open(
        &registry,
        vec![Endpoint::connect(address)],
        &SocketOptions::default(),
        Rc::new(move |_: &SubConnection, message: Bytes, tag: Bytes| {
            sink.borrow_mut().push((tag, message));
        }),
    )
    .unwrap();
    sub.subscribe("tag").unwrap();

    // Subscriptions travel to the publisher asynchronously; keep publishing
    // until the first one gets through.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while received.borrow().is_empty() && std::time::Instant::now() < deadline {
        publisher.publish("xyz", "other").unwrap();
        publisher.publish("abcd", "tag1").unwrap();
        reactor.run_for(Duration::from_millis(20));
    }

    let received = received.borrow();
    assert!(!received.is_empty());
    assert!(received
        .iter()
        .all(|(tag, message)| tag == "tag1" && message == "abcd"));
    drop(received);
    registry.shutdown().unwrap();
}
