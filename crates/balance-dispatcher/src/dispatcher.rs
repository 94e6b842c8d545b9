//! Queue-Aware Network Dispatcher
//!
//! # Selection
//!
//! ```text
//! start = cursor.advance()                    // one atomic step per call
//! for offset in 0..registry.len():
//!     candidate = (start + offset) % len
//!     sample    = store.get(candidate)        // fresh, never cached
//!     if sample is known and sample < MAX:
//!         cursor.catch_up(start, candidate)
//!         forward once, return
//! reject(NoEligibleMachine)
//! ```
//!
//! Every call reads `len` distinct machines regardless of what concurrent
//! calls do to the cursor. An absent or unreadable sample makes the
//! candidate ineligible. A machine may cross the threshold between its read
//! and the forward; that race is accepted.

use std::sync::Arc;

use balance_core::{DispatchOutcome, LoadThreshold, MachineEntry, MachineRegistry, QueueDepthSample};
use tracing::{debug, warn};

use crate::cursor::DispatchCursor;
use crate::stats::{DispatchStats, StatsSnapshot};
use crate::store::QueueDepthStore;
use crate::transport::{ForwardRequest, Forwarder};

/// Result of one rotation over the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<'a> {
    /// The eligible machine, if one was found
    pub machine: Option<&'a MachineEntry>,
    /// Candidates whose queue depth was read
    pub examined: usize,
}

pub struct Dispatcher {
    registry: MachineRegistry,
    store: Arc<dyn QueueDepthStore>,
    forwarder: Arc<dyn Forwarder>,
    threshold: LoadThreshold,
    cursor: DispatchCursor,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        registry: MachineRegistry,
        store: Arc<dyn QueueDepthStore>,
        forwarder: Arc<dyn Forwarder>,
        threshold: LoadThreshold,
    ) -> Self {
        Self {
            registry,
            store,
            forwarder,
            threshold,
            cursor: DispatchCursor::new(),
            stats: DispatchStats::default(),
        }
    }

    pub fn registry(&self) -> &MachineRegistry {
        &self.registry
    }

    pub fn threshold(&self) -> LoadThreshold {
        self.threshold
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Route `request` to one eligible machine
    ///
    /// Forwarding is attempted at most once; a failed forward is reported,
    /// not retried on the next candidate.
    pub async fn dispatch(&self, request: ForwardRequest) -> DispatchOutcome {
        let selection = self.select().await;

        let outcome = match selection.machine {
            None => {
                warn!(
                    "No eligible machine after {} candidate(s) (MAX={})",
                    selection.examined,
                    self.threshold.max()
                );
                DispatchOutcome::no_eligible_machine()
            }
            Some(machine) => match self.forwarder.forward(machine, request).await {
                Ok(()) => DispatchOutcome::forwarded(&machine.id),
                Err(e) => {
                    warn!("Forwarding to {} failed: {}", machine.id, e);
                    DispatchOutcome::forwarding_failure(&machine.id, e.to_string())
                }
            },
        };

        self.stats.record(&outcome);
        outcome
    }

    /// Walk at most one full rotation looking for a machine below `MAX`
    pub async fn select(&self) -> Selection<'_> {
        let len = self.registry.len();
        if len == 0 {
            return Selection {
                machine: None,
                examined: 0,
            };
        }

        let start = self.cursor.advance(len);

        for offset in 0..len {
            let index = (start + offset) % len;
            let Some(machine) = self.registry.get(index) else {
                continue;
            };

            let sample = self.sample(machine).await;
            if sample.is_eligible(self.threshold) {
                debug!("Selected {} (depth {:?})", machine.id, sample.depth);
                self.cursor.catch_up(start, index);
                return Selection {
                    machine: Some(machine),
                    examined: offset + 1,
                };
            }

            debug!("Skipping {} (depth {:?})", machine.id, sample.depth);
        }

        Selection {
            machine: None,
            examined: len,
        }
    }

    async fn sample(&self, machine: &MachineEntry) -> QueueDepthSample {
        match self.store.get(&machine.id).await {
            Ok(Some(depth)) => QueueDepthSample::known(&machine.id, depth),
            Ok(None) => QueueDepthSample::unknown(&machine.id),
            Err(e) => {
                warn!("Queue depth for {} unavailable: {}", machine.id, e);
                QueueDepthSample::unknown(&machine.id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQueueStore;
    use async_trait::async_trait;
    use balance_core::{parse_registry, Error, RejectReason};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    /// Holds the first read of one machine until released
    struct Gate {
        machine_id: String,
        entered: oneshot::Sender<()>,
        release: oneshot::Receiver<()>,
    }

    /// Counts and logs reads on top of a memory store; ids in `broken`
    /// return errors
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryQueueStore,
        broken: Vec<String>,
        reads: AtomicUsize,
        log: Mutex<Vec<String>>,
        gate: Mutex<Option<Gate>>,
    }

    impl CountingStore {
        /// Returns the store plus (entered, release) handles for the gate
        fn gated(machine_id: &str) -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (entered_tx, entered_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            let store = Self {
                gate: Mutex::new(Some(Gate {
                    machine_id: machine_id.to_string(),
                    entered: entered_tx,
                    release: release_rx,
                })),
                ..Default::default()
            };
            (store, entered_rx, release_tx)
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueueDepthStore for CountingStore {
        async fn get(&self, machine_id: &str) -> balance_core::Result<Option<u64>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(machine_id.to_string());

            let gate = {
                let mut gate = self.gate.lock().unwrap();
                if gate.as_ref().is_some_and(|g| g.machine_id == machine_id) {
                    gate.take()
                } else {
                    None
                }
            };
            if let Some(gate) = gate {
                let _ = gate.entered.send(());
                let _ = gate.release.await;
            }

            if self.broken.iter().any(|id| id == machine_id) {
                return Err(Error::Store("connection reset".to_string()));
            }
            self.inner.get(machine_id).await
        }
    }

    #[derive(Default)]
    struct RecordingForwarder {
        delivered: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, machine: &MachineEntry, _request: ForwardRequest) -> balance_core::Result<()> {
            self.delivered.lock().unwrap().push(machine.id.clone());
            if self.fail {
                return Err(Error::Forwarding {
                    machine_id: machine.id.clone(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        store: Arc<CountingStore>,
        forwarder: Arc<RecordingForwarder>,
    }

    fn fixture(registry: &str, depths: &[(&str, u64)], max: u64) -> Fixture {
        fixture_with(registry, depths, max, CountingStore::default(), RecordingForwarder::default())
    }

    fn fixture_with(
        registry: &str,
        depths: &[(&str, u64)],
        max: u64,
        store: CountingStore,
        forwarder: RecordingForwarder,
    ) -> Fixture {
        for (id, depth) in depths {
            store.inner.set(*id, *depth);
        }
        let store = Arc::new(store);
        let forwarder = Arc::new(forwarder);
        let dispatcher = Dispatcher::new(
            parse_registry(registry).unwrap(),
            store.clone(),
            forwarder.clone(),
            LoadThreshold::new(max),
        );
        Fixture {
            dispatcher,
            store,
            forwarder,
        }
    }

    const THREE: &str = "m1=http://m1;m2=http://m2;m3=http://m3";

    fn request() -> ForwardRequest {
        ForwardRequest::new("GET", "/12345678")
    }

    #[tokio::test]
    async fn test_overloaded_machine_is_skipped_in_rotation() {
        let f = fixture(THREE, &[("m1", 10), ("m2", 260), ("m3", 5)], 250);

        // Cursor starts at 0, so m2 is the first candidate and is skipped
        let selection = f.dispatcher.select().await;
        assert_eq!(selection.machine.map(|m| m.id.as_str()), Some("m3"));
        assert_eq!(selection.examined, 2);

        let outcomes: Vec<DispatchOutcome> = vec![
            f.dispatcher.dispatch(request()).await,
            f.dispatcher.dispatch(request()).await,
        ];
        assert_eq!(
            outcomes,
            vec![DispatchOutcome::forwarded("m1"), DispatchOutcome::forwarded("m3")]
        );
    }

    #[tokio::test]
    async fn test_all_overloaded_rejects_after_full_rotation() {
        let f = fixture(THREE, &[("m1", 300), ("m2", 300), ("m3", 300)], 250);

        let outcome = f.dispatcher.dispatch(request()).await;
        assert_eq!(outcome, DispatchOutcome::no_eligible_machine());
        assert_eq!(f.store.reads.load(Ordering::SeqCst), 3);
        assert!(f.forwarder.delivered.lock().unwrap().is_empty());

        let selection = f.dispatcher.select().await;
        assert_eq!(selection.machine, None);
        assert_eq!(selection.examined, 3);
        assert_eq!(f.store.reads.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_rotation_is_fair_when_all_eligible() {
        let f = fixture(THREE, &[("m1", 0), ("m2", 0), ("m3", 0)], 250);

        for _ in 0..30 {
            assert!(f.dispatcher.dispatch(request()).await.is_forwarded());
        }

        let delivered = f.forwarder.delivered.lock().unwrap();
        assert_eq!(&delivered[..6], &["m2", "m3", "m1", "m2", "m3", "m1"]);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in delivered.iter() {
            *counts.entry(id.as_str()).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 10));
    }

    #[tokio::test]
    async fn test_absent_sample_is_never_selected() {
        let f = fixture(THREE, &[("m2", 1), ("m3", 1)], u64::MAX);

        for _ in 0..100 {
            let outcome = f.dispatcher.dispatch(request()).await;
            assert!(outcome.is_forwarded());
            assert_ne!(outcome.machine_id(), Some("m1"));
        }
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let f = fixture("a=http://a;b=http://b", &[("a", 250), ("b", 249)], 250);

        for _ in 0..4 {
            assert_eq!(f.dispatcher.dispatch(request()).await, DispatchOutcome::forwarded("b"));
        }
    }

    #[tokio::test]
    async fn test_single_machine_registry() {
        let f = fixture("solo=http://solo", &[("solo", 251)], 250);

        let selection = f.dispatcher.select().await;
        assert_eq!(selection.machine, None);
        assert_eq!(selection.examined, 1);

        f.store.inner.set("solo", 0);
        assert_eq!(f.dispatcher.dispatch(request()).await, DispatchOutcome::forwarded("solo"));
    }

    #[tokio::test]
    async fn test_store_error_is_treated_as_unknown() {
        let store = CountingStore {
            broken: vec!["m2".to_string()],
            ..Default::default()
        };
        let f = fixture_with(THREE, &[("m1", 0), ("m2", 0), ("m3", 0)], 250, store, RecordingForwarder::default());

        for _ in 0..9 {
            let outcome = f.dispatcher.dispatch(request()).await;
            assert_ne!(outcome.machine_id(), Some("m2"));
            assert!(outcome.is_forwarded());
        }
    }

    #[tokio::test]
    async fn test_forwarding_failure_is_not_retried() {
        let forwarder = RecordingForwarder {
            fail: true,
            ..Default::default()
        };
        let f = fixture_with(THREE, &[("m1", 0), ("m2", 0), ("m3", 0)], 250, CountingStore::default(), forwarder);

        let outcome = f.dispatcher.dispatch(request()).await;
        match outcome {
            DispatchOutcome::Rejected {
                reason: RejectReason::ForwardingFailure { machine_id, .. },
            } => assert_eq!(machine_id, "m2"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(f.forwarder.delivered.lock().unwrap().len(), 1);
        assert_eq!(f.store.reads.load(Ordering::SeqCst), 1);

        let stats = f.dispatcher.stats();
        assert_eq!(stats.rejected_forwarding_failure, 1);
        assert_eq!(stats.forwarded, 0);
    }

    #[tokio::test]
    async fn test_stats_track_outcomes() {
        let f = fixture(THREE, &[("m1", 0), ("m2", 500), ("m3", 500)], 250);

        f.dispatcher.dispatch(request()).await;
        f.store.inner.set("m1", 500);
        f.dispatcher.dispatch(request()).await;

        let stats = f.dispatcher.stats();
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.rejected_no_eligible, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_keeps_rotation_fair() {
        let f = fixture(THREE, &[("m1", 0), ("m2", 0), ("m3", 0)], 250);
        let dispatcher = Arc::new(f.dispatcher);

        let tasks: Vec<_> = (0..300)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.dispatch(request()).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_forwarded());
        }

        let delivered = f.forwarder.delivered.lock().unwrap();
        for id in ["m1", "m2", "m3"] {
            assert_eq!(delivered.iter().filter(|d| d.as_str() == id).count(), 100);
        }
    }

    #[tokio::test]
    async fn test_interleaved_call_still_reaches_eligible_machine() {
        let (store, entered, release) = CountingStore::gated("m2");
        let f = fixture_with(
            THREE,
            &[("m1", 10), ("m2", 300), ("m3", 300)],
            250,
            store,
            RecordingForwarder::default(),
        );
        let dispatcher = Arc::new(f.dispatcher);

        // First call starts at m2 and stalls inside that read
        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.dispatch(request()).await })
        };
        entered.await.unwrap();

        let second = dispatcher.dispatch(request()).await;
        assert_eq!(second, DispatchOutcome::forwarded("m1"));

        release.send(()).unwrap();
        let first = first.await.unwrap();
        assert_eq!(first, DispatchOutcome::forwarded("m1"));

        assert_eq!(f.store.log(), vec!["m2", "m3", "m1", "m3", "m1"]);
    }

    #[tokio::test]
    async fn test_interleaved_rejections_each_read_every_machine() {
        let (store, entered, release) = CountingStore::gated("m2");
        let f = fixture_with(
            THREE,
            &[("m1", 300), ("m2", 300), ("m3", 300)],
            250,
            store,
            RecordingForwarder::default(),
        );
        let dispatcher = Arc::new(f.dispatcher);

        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let selection = dispatcher.select().await;
                (selection.machine.is_none(), selection.examined)
            })
        };
        entered.await.unwrap();

        let second = dispatcher.select().await;
        assert_eq!(second.machine, None);
        assert_eq!(second.examined, 3);

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), (true, 3));

        let log = f.store.log();
        assert_eq!(log.len(), 6);
        // first call: m2 then (after the second call's m3, m1, m2) m3, m1
        let mut first_reads = vec![log[0].clone(), log[4].clone(), log[5].clone()];
        let mut second_reads = log[1..4].to_vec();
        first_reads.sort();
        second_reads.sort();
        assert_eq!(first_reads, vec!["m1", "m2", "m3"]);
        assert_eq!(second_reads, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_never_misses_eligible_machine() {
        let f = fixture(THREE, &[("m1", 10), ("m2", 300), ("m3", 300)], 250);
        let dispatcher = Arc::new(f.dispatcher);

        let tasks: Vec<_> = (0..300)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.dispatch(request()).await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), DispatchOutcome::forwarded("m1"));
        }

        assert_eq!(dispatcher.stats().rejected_no_eligible, 0);
        assert!(f.store.reads.load(Ordering::SeqCst) <= 300 * 3);
    }
}
