//! Behavioural tests for the bus: ordering, reentrancy, queueing and lifecycle.

use crate::{
    declare_bus, AddressPolicy, Bus, BusConfig, BusError, BusState, GlobalBus, HandlerPolicy,
    LockPolicy,
};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

type Log = Arc<Mutex<Vec<&'static str>>>;
type Hook = Box<dyn FnOnce() + Send>;

trait Probe: Send + Sync {
    fn ping(&self);
    fn weight(&self) -> u32;
}

/// Records its name on every ping and runs a one-shot hook the first time.
struct Recorder {
    name: &'static str,
    weight: u32,
    log: Log,
    hook: Mutex<Option<Hook>>,
}

impl Recorder {
    fn new(name: &'static str, log: &Log) -> Arc<Self> {
        Self::weighted(name, 0, log)
    }

    fn weighted(name: &'static str, weight: u32, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            weight,
            log: log.clone(),
            hook: Mutex::new(None),
        })
    }

    fn on_next_ping(&self, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }
}

impl Probe for Recorder {
    fn ping(&self) {
        self.log.lock().push(self.name);
        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn weight(&self) -> u32 {
        self.weight
    }
}

fn probe(recorder: &Arc<Recorder>) -> Arc<dyn Probe> {
    recorder.clone()
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<&'static str> {
    log.lock().clone()
}

/// Formatted log output written by a subscriber scoped to one closure.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs)
}

struct Keyed;

impl BusConfig for Keyed {
    type Handler = dyn Probe;
    type Id = u32;
    type Order = ();
    const NAME: &'static str = "keyed";
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
    const ENABLE_QUEUE: bool = true;
}

struct Prioritized;

impl BusConfig for Prioritized {
    type Handler = dyn Probe;
    type Id = ();
    type Order = i32;
    const NAME: &'static str = "prioritized";
    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::MultipleAndOrdered;
}

struct Solo;

impl BusConfig for Solo {
    type Handler = dyn Probe;
    type Id = ();
    type Order = ();
    const NAME: &'static str = "solo";
    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Single;
    const LOCK_POLICY: LockPolicy = LockPolicy::Exclusive;
}

struct Sorted;

impl BusConfig for Sorted {
    type Handler = dyn Probe;
    type Id = u32;
    type Order = ();
    const NAME: &'static str = "sorted";
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ByIdAndOrdered;
}

struct Threaded;

impl BusConfig for Threaded {
    type Handler = dyn Probe;
    type Id = ();
    type Order = ();
    const NAME: &'static str = "threaded";
    const ENABLE_QUEUE: bool = true;
}

declare_bus!(static THREADED: Threaded;);

struct Nested;

impl BusConfig for Nested {
    type Handler = dyn Probe;
    type Id = ();
    type Order = ();
    const NAME: &'static str = "nested";
    const ENABLE_QUEUE: bool = true;
    const QUEUE_LOCK_POLICY: LockPolicy = LockPolicy::Reentrant;
}

#[test]
fn test_ordered_handlers_dispatch_by_order_key() {
    let bus = Bus::<Prioritized>::new();
    let log = new_log();
    let three = Recorder::new("three", &log);
    let one = Recorder::new("one", &log);
    let two = Recorder::new("two", &log);

    bus.connect_ordered(&probe(&three), 3).unwrap();
    bus.connect_ordered(&probe(&one), 1).unwrap();
    bus.connect_ordered(&probe(&two), 2).unwrap();

    assert_eq!(bus.broadcast(|h| h.ping()), 3);
    assert_eq!(entries(&log), ["one", "two", "three"]);

    log.lock().clear();
    assert_eq!(bus.broadcast_reverse(|h| h.ping()), 3);
    assert_eq!(entries(&log), ["three", "two", "one"]);
}

#[test]
fn test_disconnect_unvisited_handler_during_dispatch() {
    let bus = Arc::new(Bus::<Keyed>::new());
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);
    let c = Recorder::new("c", &log);

    bus.connect_id(&1, &probe(&a)).unwrap();
    let b_connection = bus.connect_id(&1, &probe(&b)).unwrap();
    bus.connect_id(&1, &probe(&c)).unwrap();

    let hook_bus = bus.clone();
    a.on_next_ping(move || {
        assert!(hook_bus.disconnect(&b_connection).unwrap());
    });

    assert_eq!(bus.event(&1, |h| h.ping()), 2);
    assert_eq!(entries(&log), ["a", "c"]);
    assert!(!bus.is_connected(&b_connection));
    assert_eq!(bus.handler_count_id(&1), 2);
}

#[test]
fn test_handler_disconnects_itself_during_dispatch() {
    let bus = Arc::new(Bus::<Keyed>::new());
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);

    let a_connection = bus.connect_id(&1, &probe(&a)).unwrap();
    bus.connect_id(&1, &probe(&b)).unwrap();

    let hook_bus = bus.clone();
    a.on_next_ping(move || {
        hook_bus.disconnect(&a_connection).unwrap();
    });

    bus.event(&1, |h| h.ping());
    bus.event(&1, |h| h.ping());
    assert_eq!(entries(&log), ["a", "b", "b"]);
}

#[test]
fn test_handler_connected_during_dispatch_waits_for_next_pass() {
    let bus = Arc::new(Bus::<Keyed>::new());
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);
    let c = Recorder::new("c", &log);
    let d = Recorder::new("d", &log);

    bus.connect_id(&1, &probe(&a)).unwrap();
    bus.connect_id(&1, &probe(&b)).unwrap();
    bus.connect_id(&1, &probe(&c)).unwrap();

    let hook_bus = bus.clone();
    let late = probe(&d);
    a.on_next_ping(move || {
        hook_bus.connect_id(&1, &late).unwrap();
    });

    assert_eq!(bus.event(&1, |h| h.ping()), 3);
    assert_eq!(entries(&log), ["a", "b", "c"]);

    log.lock().clear();
    assert_eq!(bus.event(&1, |h| h.ping()), 4);
    assert_eq!(entries(&log), ["a", "b", "c", "d"]);
}

#[test]
fn test_reverse_event_skips_handlers_disconnected_mid_walk() {
    let bus = Arc::new(Bus::<Keyed>::new());
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);
    let c = Recorder::new("c", &log);
    let d = Recorder::new("d", &log);

    let a_connection = bus.connect_id(&1, &probe(&a)).unwrap();
    let b_connection = bus.connect_id(&1, &probe(&b)).unwrap();
    bus.connect_id(&1, &probe(&c)).unwrap();

    let hook_bus = bus.clone();
    let late = probe(&d);
    c.on_next_ping(move || {
        assert!(hook_bus.disconnect(&b_connection).unwrap());
        hook_bus.connect_id(&1, &late).unwrap();
        assert!(hook_bus.disconnect(&a_connection).unwrap());
    });

    assert_eq!(bus.event_reverse(&1, |h| h.ping()), 1);
    assert_eq!(entries(&log), ["c"]);

    log.lock().clear();
    assert_eq!(bus.event_reverse(&1, |h| h.ping()), 2);
    assert_eq!(entries(&log), ["d", "c"]);
}

#[test]
fn test_reverse_broadcast_skips_address_emptied_mid_walk() {
    let bus = Arc::new(Bus::<Keyed>::new());
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);
    let c = Recorder::new("c", &log);
    let e = Recorder::new("e", &log);

    let a_connection = bus.connect_id(&1, &probe(&a)).unwrap();
    bus.connect_id(&2, &probe(&b)).unwrap();
    bus.connect_id(&2, &probe(&c)).unwrap();

    let hook_bus = bus.clone();
    let late = probe(&e);
    c.on_next_ping(move || {
        assert!(hook_bus.disconnect(&a_connection).unwrap());
        hook_bus.connect_id(&3, &late).unwrap();
        // The emptied address stays until the walk ends.
        assert_eq!(hook_bus.address_count(), 3);
    });

    assert_eq!(bus.broadcast_reverse(|h| h.ping()), 2);
    assert_eq!(entries(&log), ["c", "b"]);
    assert_eq!(bus.address_count(), 2);

    log.lock().clear();
    assert_eq!(bus.broadcast_reverse(|h| h.ping()), 3);
    assert_eq!(entries(&log), ["e", "c", "b"]);
}

#[test]
fn test_nested_dispatch_on_reentrant_bus() {
    let bus = Arc::new(Bus::<Keyed>::new());
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);

    bus.connect_id(&1, &probe(&a)).unwrap();
    bus.connect_id(&2, &probe(&b)).unwrap();

    let hook_bus = bus.clone();
    a.on_next_ping(move || {
        hook_bus.event(&2, |h| h.ping());
    });

    assert_eq!(bus.broadcast(|h| h.ping()), 2);
    assert_eq!(entries(&log), ["a", "b", "b"]);
}

#[test]
fn test_single_handler_policy_rejects_second_connect() {
    let bus = Bus::<Solo>::new();
    let log = new_log();
    let first = Recorder::new("first", &log);
    let second = Recorder::new("second", &log);

    bus.connect(&probe(&first)).unwrap();
    let err = bus.connect(&probe(&second)).unwrap_err();

    assert!(matches!(err, BusError::AddressOccupied { bus: "solo", .. }));
    assert_eq!(bus.handler_count(), 1);
    assert_eq!(bus.broadcast(|h| h.ping()), 1);
    assert_eq!(entries(&log), ["first"]);
}

#[test]
fn test_same_handler_cannot_connect_twice_to_one_address() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let a = Recorder::new("a", &log);

    bus.connect_id(&1, &probe(&a)).unwrap();
    let err = bus.connect_id(&1, &probe(&a)).unwrap_err();
    assert!(matches!(err, BusError::AlreadyConnected { .. }));

    // A different address is a separate registration.
    bus.connect_id(&2, &probe(&a)).unwrap();
    assert_eq!(bus.handler_count(), 2);
}

#[test]
fn test_queue_runs_snapshot_in_fifo_order() {
    let bus = Arc::new(Bus::<Keyed>::new());
    let log = new_log();

    let (inner_bus, inner_log) = (bus.clone(), log.clone());
    assert!(bus.queue_function(move || {
        inner_log.lock().push("f1");
        let deferred_log = inner_log.clone();
        inner_bus.queue_function(move || deferred_log.lock().push("f3"));
    }));
    let f2_log = log.clone();
    assert!(bus.queue_function(move || f2_log.lock().push("f2")));

    assert_eq!(bus.execute_queued_events(), 2);
    assert_eq!(entries(&log), ["f1", "f2"]);
    assert_eq!(bus.queued_event_count(), 1);

    assert_eq!(bus.execute_queued_events(), 1);
    assert_eq!(entries(&log), ["f1", "f2", "f3"]);
    assert_eq!(bus.queued_event_count(), 0);
}

#[test]
fn test_queued_events_dispatch_when_executed() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);
    bus.connect_id(&1, &probe(&a)).unwrap();
    bus.connect_id(&1, &probe(&b)).unwrap();

    bus.queue_event(1, |h| h.ping());
    bus.queue_event_reverse(1, |h| h.ping());
    bus.queue_broadcast(|h| h.ping());
    assert!(entries(&log).is_empty());

    assert_eq!(bus.execute_queued_events(), 3);
    assert_eq!(entries(&log), ["a", "b", "b", "a", "a", "b"]);
}

#[test]
fn test_panicking_queued_call_does_not_stop_batch() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();

    bus.queue_function(|| {
        panic!("queued call failed");
    });
    let after = log.clone();
    bus.queue_function(move || after.lock().push("after"));

    let (executed, logs) = with_captured_logs(|| bus.execute_queued_events());
    assert_eq!(executed, 2);
    assert_eq!(entries(&log), ["after"]);
    assert!(logs.text().contains("queued call panicked: queued call failed"));

    let stats = bus.stats();
    assert_eq!(stats.queued_calls_executed, 2);
    assert_eq!(stats.queued_calls_failed, 1);
}

#[test]
fn test_inactive_queue_drops_new_calls() {
    let bus = Bus::<Keyed>::new();
    assert!(bus.is_function_queuing());

    assert!(bus.queue_function(|| {}));
    bus.allow_function_queuing(false);
    assert!(!bus.is_function_queuing());
    assert!(!bus.queue_function(|| {}));

    // Calls queued before deactivation are kept.
    assert_eq!(bus.queued_event_count(), 1);
    assert_eq!(bus.clear_queued_events(), 1);
    assert_eq!(bus.execute_queued_events(), 0);

    bus.allow_function_queuing(true);
    assert!(bus.queue_function(|| {}));
}

/// Queues an empty call on its bus when dropped.
struct QueueOnDrop(Arc<Bus<Keyed>>);

impl Drop for QueueOnDrop {
    fn drop(&mut self) {
        self.0.queue_function(|| {});
    }
}

#[test]
fn test_dropping_cleared_calls_may_queue_more_work() {
    let bus = Arc::new(Bus::<Keyed>::new());

    let flush = QueueOnDrop(bus.clone());
    assert!(bus.queue_function(move || drop(flush)));
    assert_eq!(bus.clear_queued_events(), 1);
    assert_eq!(bus.queued_event_count(), 1);
    assert_eq!(bus.execute_queued_events(), 1);

    let flush = QueueOnDrop(bus.clone());
    assert!(bus.queue_function(move || drop(flush)));
    bus.teardown();
    assert_eq!(bus.state(), BusState::TornDown);
    assert_eq!(bus.queued_event_count(), 0);
}

#[test]
fn test_queued_call_dropped_during_execution_may_queue_more_work() {
    let bus = Arc::new(Bus::<Keyed>::new());

    let flush = QueueOnDrop(bus.clone());
    assert!(bus.queue_function(move || drop(flush)));
    assert_eq!(bus.execute_queued_events(), 1);
    assert_eq!(bus.queued_event_count(), 1);
}

#[test]
fn test_reentrant_queue_lock_allows_nested_execution() {
    let bus = Arc::new(Bus::<Nested>::new());
    let log = new_log();

    let (inner_bus, inner_log) = (bus.clone(), log.clone());
    assert!(bus.queue_function(move || {
        let late_log = inner_log.clone();
        inner_bus.queue_function(move || late_log.lock().push("inner"));
        if inner_bus.execute_queued_events() == 1 {
            inner_log.lock().push("outer");
        }
    }));

    assert_eq!(bus.execute_queued_events(), 1);
    assert_eq!(entries(&log), ["inner", "outer"]);
    assert_eq!(bus.stats().queued_calls_executed, 2);
}

#[test]
fn test_empty_bus_does_not_create_context() {
    let bus = Bus::<Keyed>::new();

    assert_eq!(bus.broadcast(|h| h.ping()), 0);
    assert_eq!(bus.event(&3, |h| h.ping()), 0);
    assert_eq!(bus.enumerate_handlers(|_| true), 0);
    assert_eq!(bus.execute_queued_events(), 0);
    assert_eq!(bus.clear_queued_events(), 0);
    assert!(bus.find_first_handler().is_none());
    assert!(!bus.has_handlers());

    assert_eq!(bus.state(), BusState::Uninitialized);
    assert_eq!(bus.stats().state, BusState::Uninitialized);
}

#[test]
fn test_find_first_handler_tracks_connections() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let only = Recorder::new("only", &log);

    assert!(bus.find_first_handler_id(&4).is_none());

    let connection = bus.connect_id(&4, &probe(&only)).unwrap();
    let found = bus.find_first_handler_id(&4).expect("handler connected");
    found.ping();
    assert_eq!(entries(&log), ["only"]);

    bus.disconnect(&connection).unwrap();
    assert!(bus.find_first_handler_id(&4).is_none());
    assert!(bus.find_first_handler().is_none());
}

#[test]
fn test_enumeration_stops_when_callback_returns_false() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let handlers: Vec<_> = ["a", "b", "c"].map(|n| Recorder::new(n, &log)).into();
    for h in &handlers {
        bus.connect_id(&1, &probe(h)).unwrap();
    }

    let mut seen = 0;
    let visited = bus.enumerate_handlers_id(&1, |_| {
        seen += 1;
        seen < 2
    });
    assert_eq!(visited, 2);
    assert_eq!(bus.enumerate_handlers(|_| true), 3);
}

#[test]
fn test_results_and_folds() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let light = Recorder::weighted("light", 2, &log);
    let heavy = Recorder::weighted("heavy", 5, &log);
    let other = Recorder::weighted("other", 10, &log);
    bus.connect_id(&1, &probe(&light)).unwrap();
    bus.connect_id(&1, &probe(&heavy)).unwrap();
    bus.connect_id(&2, &probe(&other)).unwrap();

    assert_eq!(bus.event_result(&1, |h| h.weight()), Some(5));
    assert_eq!(bus.event_result(&9, |h| h.weight()), None);
    assert_eq!(bus.event_fold(&1, 0, |sum, h| *sum += h.weight()), 7);
    assert_eq!(bus.broadcast_fold(0, |sum, h| *sum += h.weight()), 17);
    assert_eq!(bus.broadcast_result(|h| h.weight()), Some(10));
}

#[test]
fn test_ordered_addresses_broadcast_by_id() {
    let bus = Bus::<Sorted>::new();
    let log = new_log();
    let thirty = Recorder::new("thirty", &log);
    let ten = Recorder::new("ten", &log);
    let twenty = Recorder::new("twenty", &log);

    bus.connect_id(&30, &probe(&thirty)).unwrap();
    bus.connect_id(&10, &probe(&ten)).unwrap();
    bus.connect_id(&20, &probe(&twenty)).unwrap();

    bus.broadcast(|h| h.ping());
    assert_eq!(entries(&log), ["ten", "twenty", "thirty"]);
    assert_eq!(bus.address_count(), 3);
}

#[test]
fn test_bound_address_survives_becoming_empty() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let a = Recorder::new("a", &log);

    let address = bus.bind(&9).unwrap();
    assert_eq!(address.id(), &9);
    assert_eq!(bus.address_count(), 1);
    assert_eq!(bus.event_at(&address, |h| h.ping()), 0);

    let connection = bus.connect_at(&address, &probe(&a), ()).unwrap();
    assert_eq!(bus.event_at(&address, |h| h.ping()), 1);
    assert_eq!(bus.event(&9, |h| h.ping()), 1);
    assert!(bus.find_first_handler_at(&address).is_some());
    let b = Recorder::new("b", &log);
    let b_connection = bus.connect_at(&address, &probe(&b), ()).unwrap();
    let mut seen = 0;
    assert_eq!(bus.enumerate_handlers_at(&address, |_| { seen += 1; false }), 1);
    assert_eq!(seen, 1);
    assert_eq!(bus.enumerate_handlers_at(&address, |_| true), 2);
    bus.disconnect(&b_connection).unwrap();

    bus.disconnect(&connection).unwrap();
    assert_eq!(bus.address_count(), 1);

    bus.queue_event_at(address.clone(), |h| h.ping());
    bus.connect_at(&address, &probe(&a), ()).unwrap();
    assert_eq!(bus.execute_queued_events(), 1);
    assert_eq!(entries(&log), ["a", "a", "a"]);
}

#[test]
fn test_handles_from_another_bus_are_rejected() {
    let first = Bus::<Keyed>::new();
    let second = Bus::<Keyed>::new();
    let log = new_log();
    let a = Recorder::new("a", &log);

    let connection = first.connect_id(&1, &probe(&a)).unwrap();
    assert_eq!(second.disconnect(&connection), Err(BusError::ForeignConnection("keyed")));

    let address = first.bind(&1).unwrap();
    second.bind(&1).unwrap();
    assert_eq!(second.enumerate_handlers_at(&address, |_| true), 0);
    assert!(second.find_first_handler_at(&address).is_none());
    assert_eq!(
        second.connect_at(&address, &probe(&a), ()).unwrap_err(),
        BusError::StaleAddress("keyed")
    );
    assert_eq!(second.event_at(&address, |h| h.ping()), 0);
    assert!(first.is_connected(&connection));
}

#[test]
fn test_disconnect_is_idempotent() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let a = Recorder::new("a", &log);

    let connection = bus.connect_id(&1, &probe(&a)).unwrap();
    assert_eq!(bus.disconnect(&connection), Ok(true));
    assert_eq!(bus.disconnect(&connection), Ok(false));
    assert_eq!(bus.address_count(), 0);
}

#[test]
fn test_dropped_handler_is_skipped() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let kept = Recorder::new("kept", &log);
    bus.connect_id(&1, &probe(&kept)).unwrap();
    {
        let dropped = Recorder::new("dropped", &log);
        bus.connect_id(&1, &probe(&dropped)).unwrap();
    }

    let (visited, logs) = with_captured_logs(|| bus.event(&1, |h| h.ping()));
    assert_eq!(visited, 1);
    assert_eq!(entries(&log), ["kept"]);
    assert_eq!(bus.handler_count_id(&1), 2);
    assert!(logs.text().contains("dropped without disconnecting"));
}

#[test]
fn test_teardown_is_terminal() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let a = Recorder::new("a", &log);
    let connection = bus.connect_id(&1, &probe(&a)).unwrap();
    bus.queue_function(|| {});

    let ((), logs) = with_captured_logs(|| bus.teardown());
    assert!(logs.text().contains("torn down with 1 handlers still connected"));
    assert!(logs.text().contains("1 queued calls discarded"));

    assert_eq!(bus.state(), BusState::TornDown);
    assert!(!bus.is_connected(&connection));
    assert_eq!(bus.disconnect(&connection), Ok(false));
    assert_eq!(bus.connect_id(&1, &probe(&a)).unwrap_err(), BusError::TornDown("keyed"));
    assert!(bus.bind(&1).is_err());
    assert_eq!(bus.event(&1, |h| h.ping()), 0);
    assert!(!bus.queue_function(|| {}));
    assert_eq!(bus.execute_queued_events(), 0);
    assert!(entries(&log).is_empty());
}

#[test]
fn test_stats_snapshot_serializes() {
    let bus = Bus::<Keyed>::new();
    let log = new_log();
    let a = Recorder::new("a", &log);
    let b = Recorder::new("b", &log);
    bus.connect_id(&1, &probe(&a)).unwrap();
    bus.connect_id(&2, &probe(&b)).unwrap();
    bus.broadcast(|h| h.ping());
    bus.queue_broadcast(|h| h.ping());

    let stats = bus.stats();
    assert_eq!(stats.name, "keyed");
    assert_eq!(stats.state, BusState::Active);
    assert_eq!(stats.addresses, 2);
    assert_eq!(stats.handlers, 2);
    assert_eq!(stats.events_dispatched, 1);
    assert_eq!(stats.queued_calls, 1);
    assert!(stats.queue_active);

    let json = serde_json::to_string(&stats).unwrap();
    assert!(json.contains("\"handlers\":2"));
    assert!(json.contains("\"state\":\"Active\""));
}

struct Counter(AtomicUsize);

impl Probe for Counter {
    fn ping(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn weight(&self) -> u32 {
        1
    }
}

#[test]
fn test_global_bus_shared_across_threads() {
    let first = Arc::new(Counter(AtomicUsize::new(0)));
    let second = Arc::new(Counter(AtomicUsize::new(0)));
    let first_handler: Arc<dyn Probe> = first.clone();
    let second_handler: Arc<dyn Probe> = second.clone();
    let connections = [
        Threaded::bus().connect(&first_handler).unwrap(),
        Threaded::bus().connect(&second_handler).unwrap(),
    ];

    let workers: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(|| {
                for _ in 0..250 {
                    THREADED.broadcast(|h| h.ping());
                }
                THREADED.queue_broadcast(|h| h.ping());
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(first.0.load(Ordering::Relaxed), 1000);
    assert_eq!(THREADED.execute_queued_events(), 4);
    assert_eq!(first.0.load(Ordering::Relaxed), 1004);
    assert_eq!(second.0.load(Ordering::Relaxed), 1004);

    for connection in &connections {
        THREADED.disconnect(connection).unwrap();
    }
    assert!(!THREADED.has_handlers());
}

#[test]
fn test_concurrent_first_use_shares_one_context() {
    const THREADS: usize = 8;
    let bus = Arc::new(Bus::<Keyed>::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let (bus, barrier) = (bus.clone(), barrier.clone());
            thread::spawn(move || {
                let handler: Arc<dyn Probe> = Arc::new(Counter(AtomicUsize::new(0)));
                barrier.wait();
                let connection = bus.connect_id(&1, &handler).unwrap();
                (handler, connection)
            })
        })
        .collect();
    let connected: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(bus.state(), BusState::Active);
    assert_eq!(bus.address_count(), 1);
    assert_eq!(bus.handler_count_id(&1), THREADS);
    for (_, connection) in &connected {
        assert!(bus.is_connected(connection));
    }
    assert_eq!(bus.broadcast(|h| h.ping()), THREADS);
}
