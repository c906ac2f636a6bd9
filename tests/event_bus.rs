//! Integration tests for the event bus (C3–C6), covering the literal
//! scenarios and invariants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reactor_core::selector::{AddressSelector, AnonymousSelector, TypeSelector};
use reactor_core::{BusConfig, Event, EventBus, Key, ReactorError};

fn bus() -> Arc<EventBus> {
    EventBus::new(BusConfig::default())
}

/// S1: simple notify with a synchronous dispatcher delivers to the
/// registered consumer, and `respondsToKey` reflects it.
#[test]
fn s1_simple_notify() {
    let bus = bus();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = received.clone();

    bus.on::<String, _>(Arc::new(AddressSelector::new("k")), move |event| {
        received2.lock().unwrap().push(event.data().clone());
    });

    bus.notify("k", Event::new("k", "hello".to_string()));

    assert_eq!(*received.lock().unwrap(), vec!["hello".to_string()]);
    assert!(bus.responds_to_key(&Key::address("k")));
}

/// S2: request/reply via `receive` + `send_and_receive` observes exactly one
/// reply carrying the responder's data.
#[test]
fn s2_request_reply() {
    let bus = bus();
    bus.on::<String, _>(Arc::new(AddressSelector::new("ping")), {
        let bus = bus.clone();
        move |event| {
            if let Some(reply_key) = event.reply_to().cloned() {
                bus.notify(reply_key, Event::new("", "pong".to_string()));
            }
        }
    });

    let replies = Arc::new(Mutex::new(Vec::new()));
    let replies2 = replies.clone();
    bus.send_and_receive::<String, String, _>(
        "ping",
        Event::new("ping", "ping".to_string()),
        move |event| replies2.lock().unwrap().push(event.data().clone()),
    );

    assert_eq!(*replies.lock().unwrap(), vec!["pong".to_string()]);
}

/// S3: a consumer that panics gets rerouted as a `ConsumerFailure`, observed
/// by a `Throwable`-class (here: `ReactorError`-type) consumer.
#[test]
fn s3_error_reroute() {
    let bus = bus();
    bus.on::<String, _>(Arc::new(AddressSelector::new("k")), |_event| {
        panic!("boom");
    });

    let caught = Arc::new(Mutex::new(Vec::new()));
    let caught2 = caught.clone();
    bus.on::<ReactorError, _>(Arc::new(TypeSelector::new::<ReactorError>()), move |event| {
        caught2.lock().unwrap().push(event.data().clone());
    });

    bus.notify("k", Event::new("k", "hello".to_string()));

    let caught = caught.lock().unwrap();
    assert_eq!(caught.len(), 1);
    assert!(matches!(caught[0], ReactorError::ConsumerFailure { .. }));
}

/// S6: a `send_and_receive` registration is gone from `respondsToKey`'s
/// underlying selector after the reply is delivered.
#[test]
fn s6_single_use_reply_registration_is_cancelled() {
    let bus = bus();
    bus.on::<String, _>(Arc::new(AddressSelector::new("ping")), {
        let bus = bus.clone();
        move |event| {
            if let Some(reply_key) = event.reply_to().cloned() {
                bus.notify(reply_key, Event::new("", "pong".to_string()));
            }
        }
    });

    let reg = bus.send_and_receive::<String, String, _>(
        "ping",
        Event::new("ping", "ping".to_string()),
        |_event| {},
    );

    assert!(reg.is_cancelled());
}

/// Invariant 8: a failing consumer never blocks delivery to siblings on the
/// same key.
#[test]
fn error_isolation_between_siblings() {
    let bus = bus();
    bus.on::<u32, _>(Arc::new(AddressSelector::new("k")), |_event| panic!("boom"));

    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    bus.on::<u32, _>(Arc::new(AddressSelector::new("k")), move |_event| {
        hits2.fetch_add(1, Ordering::SeqCst);
    });

    bus.notify("k", Event::new("k", 1u32));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Invariant 3 (applied to registrations): once cancelled, a registration is
/// never delivered to again.
#[test]
fn cancel_is_permanent() {
    let bus = bus();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    let reg = bus.on::<u32, _>(Arc::new(AddressSelector::new("k")), move |_event| {
        hits2.fetch_add(1, Ordering::SeqCst);
    });

    bus.notify("k", Event::new("k", 1u32));
    reg.cancel();
    bus.notify("k", Event::new("k", 2u32));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// `prepare` freezes the candidate snapshot; registrations added afterwards
/// are invisible to the prepared consumer.
#[test]
fn prepare_snapshot_is_frozen() {
    let bus = bus();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    bus.on::<u32, _>(Arc::new(AddressSelector::new("k")), move |_event| {
        hits2.fetch_add(1, Ordering::SeqCst);
    });

    let prepared = bus.prepare("k");

    let late_hits = Arc::new(AtomicUsize::new(0));
    let late_hits2 = late_hits.clone();
    bus.on::<u32, _>(Arc::new(AddressSelector::new("k")), move |_event| {
        late_hits2.fetch_add(1, Ordering::SeqCst);
    });

    prepared.accept(1u32);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(late_hits.load(Ordering::SeqCst), 0);
}

/// `batch_notify` routes every event in the batch to every matching consumer.
#[test]
fn batch_notify_routes_every_event_to_every_consumer() {
    let bus = bus();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    bus.on::<u32, _>(Arc::new(AddressSelector::new("k")), move |_event| {
        hits2.fetch_add(1, Ordering::SeqCst);
    });

    let completed = Arc::new(AtomicUsize::new(0));
    let completed2 = completed.clone();
    let batch = bus.batch_notify::<u32>("k", Some(Arc::new(move || { completed2.fetch_add(1, Ordering::SeqCst); })));
    batch.accept(vec![1, 2, 3]);

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

/// Anonymous selectors only ever match their own synthetic key.
#[test]
fn anonymous_selectors_never_collide() {
    let bus = bus();
    let a_hits = Arc::new(AtomicUsize::new(0));
    let a_hits2 = a_hits.clone();
    let a = AnonymousSelector::new();
    let a_key = a.key();
    bus.on::<u32, _>(Arc::new(a), move |_event| {
        a_hits2.fetch_add(1, Ordering::SeqCst);
    });

    bus.notify(AnonymousSelector::new().key(), Event::new("", 1u32));
    assert_eq!(a_hits.load(Ordering::SeqCst), 0);

    bus.notify(a_key, Event::new("", 1u32));
    assert_eq!(a_hits.load(Ordering::SeqCst), 1);
}
