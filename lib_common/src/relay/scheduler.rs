//! # Poll Scheduler
//!
//! Drives the recurring poll cycle: compute one window, query the
//! temperature stream then the id stream, broadcast whatever comes back, and
//! go back to sleep.
//!
//! ## Scheduling
//! The loop is self-rescheduling. The next cycle is armed only after the
//! current one has finished (successfully or not), and the interval is
//! measured from that completion, so a slow data source never causes two
//! scheduled cycles to overlap.
//!
//! ## Failure Isolation
//! A data-source error ends the cycle it happened in, gets logged, and is
//! otherwise forgotten. The loop keeps running until shutdown is signalled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::connections::data_source::DataSource;
use crate::relay::dispatcher::Dispatcher;
use crate::relay::event::UpdateEvent;
use crate::relay::registry::SubscriberRegistry;
use crate::relay::stream::{StreamBinding, StreamKind};
use crate::relay::time_window::WindowCalculator;
use crate::error::RelayResult;

/// Default time between the end of one cycle and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Streams for which a row was found, serialized and broadcast.
    pub broadcast: Vec<StreamKind>,
    /// Total successful sends across both broadcasts.
    pub deliveries: usize,
}

/// # Relay Context
///
/// The process-wide state: one data source, one subscriber registry, and the
/// two stream bindings. Built once at startup and shared through `Arc` by the
/// scheduler and the connection handlers.
pub struct RelayContext<D: DataSource> {
    source: D,
    dispatcher: Dispatcher,
    windows: WindowCalculator,
    temperature: StreamBinding,
    id: StreamBinding,
}

impl<D: DataSource> RelayContext<D> {
    pub fn new(
        source: D,
        registry: Arc<SubscriberRegistry>,
        windows: WindowCalculator,
        temperature: StreamBinding,
        id: StreamBinding,
    ) -> Self {
        Self {
            source,
            dispatcher: Dispatcher::new(registry),
            windows,
            temperature,
            id,
        }
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        self.dispatcher.registry()
    }

    pub fn bindings(&self) -> [&StreamBinding; 2] {
        [&self.temperature, &self.id]
    }

    /// Runs one query-and-broadcast cycle.
    ///
    /// Both streams see the same window. Disabled streams are skipped. The
    /// first data-source error ends the cycle and is returned.
    pub async fn run_cycle(&self) -> RelayResult<CycleReport> {
        let window = self.windows.now();
        tracing::debug!("Querying data source for [{} .. {})", window.lower, window.upper);

        let mut report = CycleReport::default();
        for binding in self.bindings() {
            let Some(name) = &binding.name else {
                continue;
            };

            let row = self.source.query(name, &window).await?;
            tracing::debug!("{} query result: {:?}", binding.kind, row);

            if let Some(payload) = row {
                let event = UpdateEvent::new(binding.kind, payload);
                if let Some(delivered) = self.dispatcher.broadcast(&event) {
                    report.deliveries += delivered;
                    report.broadcast.push(binding.kind);
                }
            }
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick.
    Idle,
    /// A scheduled cycle is in flight.
    Polling,
}

pub struct PollScheduler<D: DataSource> {
    context: Arc<RelayContext<D>>,
    interval: Duration,
    polling: AtomicBool,
}

impl<D: DataSource> PollScheduler<D> {
    pub fn new(context: Arc<RelayContext<D>>, interval: Duration) -> Self {
        Self {
            context,
            interval,
            polling: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.polling.load(Ordering::Acquire) {
            SchedulerState::Polling
        } else {
            SchedulerState::Idle
        }
    }

    /// Runs one scheduled cycle, swallowing its failure.
    pub async fn tick(&self) -> Option<CycleReport> {
        self.polling.store(true, Ordering::Release);
        let outcome = self.context.run_cycle().await;
        self.polling.store(false, Ordering::Release);

        match outcome {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!("Failed to transmit database information to subscribers: {}", e);
                None
            }
        }
    }

    /// The main loop. Returns once `shutdown` fires or its sender is dropped.
    ///
    /// An in-flight cycle is never interrupted; shutdown is observed between
    /// cycles.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Poll scheduler started (interval {:?}).", self.interval);
        loop {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Poll scheduler received shutdown signal.");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::relay::registry::tests::RecordingSubscriber;
    use crate::relay::stream::{AllowList, StreamName};
    use crate::relay::time_window::TimeWindow;
    use crate::error::RelayError;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Scripted data source: each stream pops its next canned answer, or
    /// returns its standing answer once the script runs dry.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        scripts: Mutex<HashMap<String, VecDeque<RelayResult<Option<Value>>>>>,
        standing: Mutex<HashMap<String, Value>>,
        pub(crate) calls: Mutex<Vec<(String, TimeWindow)>>,
    }

    impl FakeSource {
        pub(crate) fn push(&self, stream: &str, answer: RelayResult<Option<Value>>) {
            self.scripts
                .lock()
                .unwrap()
                .entry(stream.to_string())
                .or_default()
                .push_back(answer);
        }

        pub(crate) fn always(&self, stream: &str, row: Value) {
            self.standing.lock().unwrap().insert(stream.to_string(), row);
        }

        pub(crate) fn queried(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    impl DataSource for FakeSource {
        async fn query(&self, stream: &StreamName, window: &TimeWindow) -> RelayResult<Option<Value>> {
            self.calls
                .lock()
                .unwrap()
                .push((stream.as_str().to_string(), *window));
            tokio::task::yield_now().await;
            let scripted = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(stream.as_str())
                .and_then(|q| q.pop_front());
            match scripted {
                Some(answer) => answer,
                None => Ok(self.standing.lock().unwrap().get(stream.as_str()).cloned()),
            }
        }
    }

    pub(crate) fn context(
        source: FakeSource,
        temperature: Option<&str>,
        id: Option<&str>,
    ) -> Arc<RelayContext<FakeSource>> {
        let allow = AllowList::default();
        Arc::new(RelayContext::new(
            source,
            Arc::new(SubscriberRegistry::new()),
            WindowCalculator::default(),
            StreamBinding::resolve(StreamKind::Temperature, temperature, &allow),
            StreamBinding::resolve(StreamKind::Id, id, &allow),
        ))
    }

    fn parsed(messages: &[String]) -> Vec<Value> {
        messages.iter().map(|m| serde_json::from_str(m).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_row_in_window_is_broadcast_unmodified() {
        let row = json!({"id": 3, "celsius": 22.25, "created_at": "2024-05-01 10:00:00"});
        let source = FakeSource::default();
        source.push("temperatures", Ok(Some(row.clone())));
        let ctx = context(source, Some("temperatures"), Some("ids"));
        let sub = RecordingSubscriber::new("s1");
        ctx.registry().admit(sub.clone());

        let report = ctx.run_cycle().await.unwrap();
        assert_eq!(report.broadcast, vec![StreamKind::Temperature]);
        assert_eq!(report.deliveries, 1);
        assert_eq!(
            parsed(&sub.messages()),
            vec![json!({"type": "temperature_update", "data": row})]
        );
    }

    #[tokio::test]
    async fn test_both_streams_share_one_window() {
        let source = FakeSource::default();
        let ctx = context(source, Some("temperatures"), Some("ids"));
        ctx.run_cycle().await.unwrap();

        let calls = ctx.source().calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "temperatures");
        assert_eq!(calls[1].0, "ids");
        assert_eq!(calls[0].1, calls[1].1);
    }

    #[tokio::test]
    async fn test_rejected_stream_never_reaches_the_source() {
        let source = FakeSource::default();
        source.always("ids", json!({"badge": "A-1"}));
        let ctx = context(source, Some("temperatures; DELETE FROM ids"), Some("ids"));
        let sub = RecordingSubscriber::new("s1");
        ctx.registry().admit(sub.clone());

        for _ in 0..3 {
            ctx.run_cycle().await.unwrap();
        }
        assert_eq!(ctx.source().queried(), vec!["ids", "ids", "ids"]);
        assert!(parsed(&sub.messages()).iter().all(|m| m["type"] == "id_update"));
    }

    #[tokio::test]
    async fn test_error_ends_cycle_and_is_reported() {
        let source = FakeSource::default();
        source.push("temperatures", Err(RelayError::DataSource("connection reset".into())));
        source.always("ids", json!({"badge": "A-1"}));
        let ctx = context(source, Some("temperatures"), Some("ids"));
        let sub = RecordingSubscriber::new("s1");
        ctx.registry().admit(sub.clone());

        let err = ctx.run_cycle().await.unwrap_err();
        assert!(matches!(err, RelayError::DataSource(_)));
        assert_eq!(ctx.source().queried(), vec!["temperatures"]);
        assert!(sub.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_stop_the_next() {
        let row = json!({"celsius": 18.0});
        let source = FakeSource::default();
        source.push("temperatures", Err(RelayError::DataSource("timeout".into())));
        source.push("temperatures", Ok(Some(row.clone())));
        let ctx = context(source, Some("temperatures"), None);
        let sub = RecordingSubscriber::new("s1");
        ctx.registry().admit(sub.clone());

        let scheduler = PollScheduler::new(ctx.clone(), Duration::from_secs(60));
        assert!(scheduler.tick().await.is_none());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.broadcast, vec![StreamKind::Temperature]);
        assert_eq!(
            parsed(&sub.messages()),
            vec![json!({"type": "temperature_update", "data": row})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_reschedules_after_failure_until_shutdown() {
        let source = FakeSource::default();
        source.push("ids", Err(RelayError::DataSource("refused".into())));
        source.always("ids", json!({"badge": "B-7"}));
        let ctx = context(source, None, Some("ids"));
        let sub = RecordingSubscriber::new("s1");
        ctx.registry().admit(sub.clone());

        let scheduler = Arc::new(PollScheduler::new(ctx.clone(), Duration::from_secs(60)));
        let (tx, rx) = broadcast::channel(1);
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        // First cycle fails at t=0, second runs at t=60s.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(ctx.source().queried().len(), 2);
        assert_eq!(sub.messages().len(), 1);

        tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(ctx.source().queried().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_result_broadcasts_nothing() {
        let ctx = context(FakeSource::default(), Some("temperatures"), Some("ids"));
        let sub = RecordingSubscriber::new("s1");
        ctx.registry().admit(sub.clone());
        let report = ctx.run_cycle().await.unwrap();
        assert!(report.broadcast.is_empty());
        assert!(sub.messages().is_empty());
    }

    #[tokio::test]
    async fn test_report_lists_serialized_updates_without_listeners() {
        let source = FakeSource::default();
        source.always("ids", json!({"badge": "E-5"}));
        let ctx = context(source, Some("temperatures"), Some("ids"));
        let report = ctx.run_cycle().await.unwrap();
        assert_eq!(report.broadcast, vec![StreamKind::Id]);
        assert_eq!(report.deliveries, 0);
    }
}
