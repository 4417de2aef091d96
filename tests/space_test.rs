use std::net::UdpSocket;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use osckit::encoder;
use osckit::{
    AddressSpace, ElementKind, LinkSettings, Osc10, OscMessage, OscPacket, OscReceiver, OscType,
    UdpLink,
};

type Log = Arc<Mutex<Vec<String>>>;

fn recording_space() -> (AddressSpace, Log) {
    (AddressSpace::new(), Arc::new(Mutex::new(Vec::new())))
}

fn record(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn taken(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

#[test]
fn test_dispatch_exact_and_pattern_addresses() {
    let (space, log) = recording_space();
    {
        let log = Arc::clone(&log);
        space
            .add_method("/a/b/c", move |name, _args| record(&log, name))
            .unwrap();
    }

    space.dispatch(&OscMessage::from("/a/b/c"));
    assert_eq!(vec!["c"], taken(&log));

    space.dispatch(&OscMessage::from("/a/b/*"));
    assert_eq!(vec!["c"], taken(&log));

    // A shorter address names the container, which has no handlers.
    space.dispatch(&OscMessage::from("/a/b"));
    assert!(taken(&log).is_empty());

    space.dispatch(&OscMessage::from("/a/b/d"));
    assert!(taken(&log).is_empty());
}

#[test]
fn test_dispatch_passes_arguments() {
    let (space, log) = recording_space();
    {
        let log = Arc::clone(&log);
        space
            .add_method("/set/level", move |name, args| {
                record(&log, format!("{name}:{}", args[0].clone().int().unwrap()))
            })
            .unwrap();
    }
    space.dispatch(&OscMessage::new("/set/level", (42i32,)));
    assert_eq!(vec!["level:42"], taken(&log));
}

#[test]
fn test_patterns_match_in_the_middle() {
    let (space, log) = recording_space();
    for path in ["/mixer/1/gain", "/mixer/2/gain", "/mixer/2/pan"] {
        let log = Arc::clone(&log);
        let tag = path.to_string();
        space
            .add_method(path, move |_, _| record(&log, tag.clone()))
            .unwrap();
    }

    space.dispatch(&OscMessage::from("/mixer/[0-9]/gain"));
    assert_eq!(vec!["/mixer/1/gain", "/mixer/2/gain"], taken(&log));

    space.dispatch(&OscMessage::from("/*/2/{gain,pan}"));
    assert_eq!(vec!["/mixer/2/gain", "/mixer/2/pan"], taken(&log));
}

#[test]
fn test_handlers_fire_in_subscription_order() {
    let (space, log) = recording_space();
    for tag in ["first", "second"] {
        let log = Arc::clone(&log);
        space
            .add_method("/multi", move |_, _| record(&log, tag))
            .unwrap();
    }
    space.dispatch(&OscMessage::from("/multi"));
    assert_eq!(vec!["first", "second"], taken(&log));
}

#[test]
fn test_handler_panic_is_isolated() {
    let (space, log) = recording_space();
    space
        .add_method("/risky", |_, _| panic!("handler blew up"))
        .unwrap();
    {
        let log = Arc::clone(&log);
        space
            .add_method("/risky", move |_, _| record(&log, "survivor"))
            .unwrap();
    }
    space.dispatch(&OscMessage::from("/risky"));
    assert_eq!(vec!["survivor"], taken(&log));
}

#[test]
fn test_container_uniqueness() {
    let space = AddressSpace::new();
    let first = space.add_container("/a").unwrap();
    let second = space.add_container("/a").unwrap();
    assert_eq!(first, second);
    assert_eq!(vec![first], space.get_elements_by_address("/a").unwrap());
    assert_eq!(Some(ElementKind::Container), space.element_kind(first));
}

#[test]
fn test_method_and_container_conflicts() {
    let space = AddressSpace::new();
    space.add_container("/node").unwrap();
    // A container cannot become a method.
    assert!(space.add_method("/node", |_, _| {}).is_err());

    space.add_method("/leaf", |_, _| {}).unwrap();
    // A method cannot become a container, nor host children.
    assert!(space.add_container("/leaf").is_err());
    assert!(space.add_method("/leaf/below", |_, _| {}).is_err());

    // But registering the same method again appends a handler.
    assert!(space.add_method("/leaf", |_, _| {}).is_ok());
}

#[test]
fn test_reserved_symbols_are_rejected_in_registrations() {
    let space = AddressSpace::new();
    assert!(space.add_method("/bad?name", |_, _| {}).is_err());
    assert!(space.add_method("/bad*", |_, _| {}).is_err());
    assert!(space.add_method("/with space", |_, _| {}).is_err());
    assert!(space.add_container("/list,of,names").is_err());
    assert!(space.add_method("no/slash", |_, _| {}).is_err());
}

#[test]
fn test_remove_element() {
    let (space, log) = recording_space();
    let id = {
        let log = Arc::clone(&log);
        space
            .add_method("/gone/soon", move |_, _| record(&log, "hit"))
            .unwrap()
    };
    space.dispatch(&OscMessage::from("/gone/soon"));
    assert_eq!(1, taken(&log).len());

    space.remove_element(id).unwrap();
    space.dispatch(&OscMessage::from("/gone/soon"));
    assert!(taken(&log).is_empty());
    assert_eq!(None, space.element_kind(id));
    // Removing again reports the missing element.
    assert!(space.remove_element(id).is_err());
}

#[test]
fn test_remove_by_address_removes_the_subtree() {
    let (space, log) = recording_space();
    {
        let log = Arc::clone(&log);
        space
            .add_method("/tree/branch/leaf", move |_, _| record(&log, "leaf"))
            .unwrap();
    }
    space.remove_element_by_address("/tree").unwrap();
    space.dispatch(&OscMessage::from("/tree/branch/leaf"));
    assert!(taken(&log).is_empty());
    assert_eq!(None, space.get_element_by_address("/tree").unwrap());
    assert!(space.remove_element_by_address("/tree").is_err());
}

#[test]
fn test_lookup_by_address_and_name() {
    let space = AddressSpace::new();
    let gain1 = space.add_method("/mixer/1/gain", |_, _| {}).unwrap();
    let gain2 = space.add_method("/mixer/2/gain", |_, _| {}).unwrap();
    let pan = space.add_method("/mixer/1/pan", |_, _| {}).unwrap();

    assert_eq!(
        Some(gain1),
        space.get_element_by_address("/mixer/1/gain").unwrap()
    );
    assert_eq!(
        vec![gain1, gain2],
        space.get_elements_by_address("/mixer/*/gain").unwrap()
    );
    assert_eq!(
        vec![gain1, pan, gain2],
        space.get_elements_by_address("/mixer/?/*").unwrap()
    );

    assert_eq!(vec![gain1, gain2], space.get_elements_by_name("gain").unwrap());
    assert_eq!(Some(pan), space.get_element_by_name("p*").unwrap());
    assert!(space.get_elements_by_name("missing").unwrap().is_empty());

    assert_eq!(Some("/mixer/1/gain".to_string()), space.address_of(gain1));
    assert_eq!(Some(ElementKind::Method), space.element_kind(gain1));
}

#[test]
fn test_full_pipeline_dispatch() {
    let link = UdpLink::new();
    link.set_settings(LinkSettings {
        poll_interval: Duration::from_millis(5),
        ..LinkSettings::default()
    });
    link.open_to_any(None).unwrap();
    let to = link.local_addr().unwrap();

    let mut receiver = OscReceiver::new();
    receiver.set_cycle_wait(Duration::from_millis(5));
    receiver.set_ignore_timetags(true);
    receiver.connect(link.clone()).unwrap();

    let space = AddressSpace::new();
    space.connect(&receiver);

    let (tx, rx) = mpsc::channel();
    space
        .add_method("/engine/volume", move |name, args: &[OscType]| {
            tx.send((name.to_string(), args[0].clone().float().unwrap()))
                .unwrap();
        })
        .unwrap();

    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    let message =
        encoder::encode::<Osc10>(&OscPacket::Message(OscMessage::new("/engine/volume", (0.8f32,))))
            .unwrap();
    sock.send_to(&message, to).unwrap();

    let (name, value) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!("volume", name);
    assert_eq!(0.8, value);

    space.disconnect(&receiver);
    sock.send_to(&message, to).unwrap();
    // Disconnected: nothing reaches the handler anymore.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    receiver.disconnect();
    link.close();
}
