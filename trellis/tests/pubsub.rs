//! Tagged publish/subscribe over in-process sockets.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use trellis::prelude::*;

type Received = Rc<RefCell<Vec<(Bytes, Bytes)>>>;

fn setup() -> (Rc<Reactor>, Registry) {
    trellis::dev_tracing::init_tracing();
    let reactor = Rc::new(Reactor::new());
    let registry = Registry::new(MemContext::new(), reactor.clone());
    (reactor, registry)
}

fn subscriber(registry: &Registry, endpoints: Vec<Endpoint>) -> (SubConnection, Received) {
    let received: Received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let sub = SubConnection::open(
        registry,
        endpoints,
        &SocketOptions::default(),
        Rc::new(move |_: &SubConnection, message: Bytes, tag: Bytes| {
            sink.borrow_mut().push((tag, message));
        }),
    )
    .unwrap();
    (sub, received)
}

fn publisher(registry: &Registry, endpoint: Endpoint) -> PubConnection {
    PubConnection::open(registry, vec![endpoint], &SocketOptions::default()).unwrap()
}

fn pairs(items: &[(&'static str, &'static str)]) -> Vec<(Bytes, Bytes)> {
    items
        .iter()
        .map(|(tag, message)| (Bytes::from(*tag), Bytes::from(*message)))
        .collect()
}

#[test]
fn test_tag_filter_across_two_publishers() {
    let (reactor, registry) = setup();
    let pub1 = publisher(&registry, Endpoint::bind("inproc://pub-1"));
    let pub2 = publisher(&registry, Endpoint::bind("inproc://pub-2"));
    let (sub, received) = subscriber(
        &registry,
        vec![
            Endpoint::connect("inproc://pub-1"),
            Endpoint::connect("inproc://pub-2"),
        ],
    );
    sub.subscribe("tag").unwrap();

    pub1.publish("abcd", "tag1").unwrap();
    pub2.publish("efgh", "tag2").unwrap();
    pub1.publish("xyz", "other").unwrap();
    reactor.run_for(Duration::from_millis(30));

    let mut got = received.borrow().clone();
    got.sort();
    assert_eq!(got, pairs(&[("tag1", "abcd"), ("tag2", "efgh")]));
}

#[test]
fn test_subscriber_bound_on_two_endpoints() {
    let (reactor, registry) = setup();
    let (sub, received) = subscriber(
        &registry,
        vec![
            Endpoint::bind("tcp://127.0.0.1:5556"),
            Endpoint::bind("inproc://endpoint"),
        ],
    );
    let s1 = publisher(&registry, Endpoint::connect("tcp://127.0.0.1:5556"));
    let s2 = publisher(&registry, Endpoint::connect("inproc://endpoint"));
    sub.subscribe("").unwrap();

    s1.publish("111", "tag1").unwrap();
    s2.publish("222", "tag2").unwrap();
    reactor.run_for(Duration::from_millis(30));

    let mut got = received.borrow().clone();
    got.sort();
    assert_eq!(got, pairs(&[("tag1", "111"), ("tag2", "222")]));
}

#[test]
fn test_nothing_arrives_before_subscribe() {
    let (reactor, registry) = setup();
    let publisher = publisher(&registry, Endpoint::bind("inproc://quiet"));
    let (sub, received) = subscriber(&registry, vec![Endpoint::connect("inproc://quiet")]);

    publisher.publish("lost", "news").unwrap();
    reactor.run_for(Duration::from_millis(20));
    assert!(received.borrow().is_empty());

    sub.subscribe("news").unwrap();
    publisher.publish("kept", "news").unwrap();
    reactor.run_for(Duration::from_millis(20));
    assert_eq!(*received.borrow(), pairs(&[("news", "kept")]));
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let (reactor, registry) = setup();
    let publisher = publisher(&registry, Endpoint::bind("inproc://unsub"));
    let (sub, received) = subscriber(&registry, vec![Endpoint::connect("inproc://unsub")]);

    sub.subscribe("a").unwrap();
    sub.subscribe("a").unwrap();
    publisher.publish("1", "a").unwrap();
    reactor.run_for(Duration::from_millis(20));

    sub.unsubscribe("a").unwrap();
    publisher.publish("2", "a").unwrap();
    reactor.run_for(Duration::from_millis(20));

    sub.unsubscribe("a").unwrap();
    publisher.publish("3", "a").unwrap();
    reactor.run_for(Duration::from_millis(20));

    assert_eq!(*received.borrow(), pairs(&[("a", "1"), ("a", "2")]));
}

#[test]
fn test_subscribe_after_shutdown_fails() {
    let (_reactor, registry) = setup();
    let (sub, _received) = subscriber(&registry, vec![Endpoint::bind("inproc://gone")]);
    sub.shutdown().unwrap();

    assert!(matches!(
        sub.subscribe("tag"),
        Err(TrellisError::InvalidState(ConnectionState::Closed))
    ));
    assert!(matches!(
        sub.unsubscribe("tag"),
        Err(TrellisError::InvalidState(ConnectionState::Closed))
    ));
}

#[test]
fn test_empty_message_and_tag_are_delivered() {
    let (reactor, registry) = setup();
    let publisher = publisher(&registry, Endpoint::bind("inproc://empty"));
    let (sub, received) = subscriber(&registry, vec![Endpoint::connect("inproc://empty")]);
    sub.subscribe("").unwrap();

    publisher.publish("", "").unwrap();
    reactor.run_for(Duration::from_millis(20));

    assert_eq!(*received.borrow(), vec![(Bytes::new(), Bytes::new())]);
}
