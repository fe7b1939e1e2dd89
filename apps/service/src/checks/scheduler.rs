//! Check scheduler: a bounded worker pool fed by one coordinating loop.
//!
//! The loop multiplexes four signals: a stop request, the report ticker,
//! a fast ticker that re-runs due checks between reports, and an external
//! trigger channel. Workers drain a bounded work queue; shutdown pushes
//! one sentinel per worker and waits for each acknowledgment, so `stop`
//! returns only after in-flight checks have finished.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::executor::Executor;
use super::store::{Registry, ResultStore};
use super::types::{Check, CheckResult, CheckSummary, EventType, Results, ServiceConfig};
use super::validation::{
    clamp_check_interval, clamp_interval, clamp_parallel, validate_check, ValidationError,
};

/// Route the aggregate results payload is posted to.
pub const REPORT_ROUTE: &str = "api/v1/results";

/// Work queue capacity. Producers block once it fills.
pub const DEFAULT_WORK_BUFFER: usize = 1000;

/// Default fast-tick period between report cycles.
pub const DEFAULT_FAST_TICK: Duration = Duration::from_secs(10);

/// Default trigger channel capacity; extra triggers are dropped, not queued.
pub const DEFAULT_TRIGGER_BUFFER: usize = 10;

/// Engine-level knobs. Parallelism and interval are clamped at setup.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub parallel: usize,
    /// Report (send) interval.
    pub interval: Duration,
    pub fast_tick: Duration,
    pub trigger_buffer: usize,
    pub work_buffer: usize,
    /// Log report payloads in full.
    pub verbose: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            parallel: 1,
            interval: Duration::ZERO,
            fast_tick: DEFAULT_FAST_TICK,
            trigger_buffer: DEFAULT_TRIGGER_BUFFER,
            work_buffer: DEFAULT_WORK_BUFFER,
            verbose: false,
        }
    }
}

/// Items flowing through the work queue. `Stop` is the shutdown sentinel;
/// each worker consumes exactly one, acknowledges it, and exits.
enum Work {
    Run {
        check: Arc<Check>,
        /// Batch-completion handle; completion is signalled by dropping it.
        done: Option<mpsc::Sender<()>>,
    },
    Stop,
}

/// Channels and handles that exist only while the scheduler runs.
struct Running {
    trigger_tx: mpsc::Sender<EventType>,
    stop_tx: mpsc::Sender<()>,
    stop_ack_rx: mpsc::Receiver<()>,
    loop_handle: JoinHandle<()>,
    worker_handles: Vec<JoinHandle<()>>,
}

/// Coordinates periodic and event-driven execution of all registered
/// checks, and reports aggregated results upstream.
pub struct Scheduler {
    registry: Arc<Registry>,
    store: Arc<ResultStore>,
    executor: Arc<Executor>,
    opts: SchedulerOptions,
    client: Option<Arc<upcast::Client>>,
    disabled: bool,
    running: Option<Running>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("opts", &self.opts)
            .field("disabled", &self.disabled)
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Validate definitions, clamp engine knobs, and build the scheduler
    /// plus the read-only config snapshot describing the accepted set.
    ///
    /// Zero checks disables the scheduler: the returned config says so and
    /// `start` does nothing.
    pub fn setup(
        checks: Vec<Check>,
        mut opts: SchedulerOptions,
        executor: Arc<Executor>,
        client: Option<Arc<upcast::Client>>,
    ) -> Result<(Self, ServiceConfig), ValidationError> {
        opts.parallel = clamp_parallel(opts.parallel);
        opts.interval = clamp_interval(opts.interval);
        // Zero-size channels and zero-period tickers are not a thing.
        opts.fast_tick = opts.fast_tick.max(Duration::from_secs(1));
        opts.trigger_buffer = opts.trigger_buffer.max(1);
        opts.work_buffer = opts.work_buffer.max(opts.parallel);

        if checks.is_empty() {
            let scheduler = Self {
                registry: Arc::new(Registry::new()),
                store: Arc::new(ResultStore::new()),
                executor,
                opts,
                client,
                disabled: true,
                running: None,
            };
            let config = ServiceConfig {
                disabled: true,
                interval_secs: 0,
                parallel: 0,
                checks: Vec::new(),
            };
            return Ok((scheduler, config));
        }

        let mut registry = Registry::new();
        let mut summaries = Vec::with_capacity(checks.len());

        for mut check in checks {
            validate_check(&check)?;
            check.interval = clamp_check_interval(check.interval);
            summaries.push(CheckSummary {
                name: check.name.clone(),
                kind: check.kind,
                expect: check.expect.clone(),
                timeout_secs: check.timeout.as_secs(),
                interval_secs: check.interval.as_secs(),
            });
            registry.insert(check)?;
        }

        let config = ServiceConfig {
            disabled: false,
            interval_secs: opts.interval.as_secs(),
            parallel: opts.parallel,
            checks: summaries,
        };

        let scheduler = Self {
            registry: Arc::new(registry),
            store: Arc::new(ResultStore::new()),
            executor,
            opts,
            client,
            disabled: false,
            running: None,
        };

        Ok((scheduler, config))
    }

    /// Spawn the worker pool and the scheduler loop. Starting a disabled
    /// or already-started scheduler does nothing.
    pub fn start(&mut self) {
        if self.disabled {
            info!("service checks are disabled");
            return;
        }
        if self.running.is_some() {
            warn!("service checker already started");
            return;
        }

        let (work_tx, work_rx) = mpsc::channel::<Work>(self.opts.work_buffer);
        let (trigger_tx, trigger_rx) = mpsc::channel::<EventType>(self.opts.trigger_buffer);
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        let (stop_ack_tx, stop_ack_rx) = mpsc::channel::<()>(1);
        let (worker_ack_tx, worker_ack_rx) = mpsc::channel::<()>(self.opts.parallel);

        let work_rx = Arc::new(Mutex::new(work_rx));
        let mut worker_handles = Vec::with_capacity(self.opts.parallel);
        for _ in 0..self.opts.parallel {
            worker_handles.push(tokio::spawn(worker(
                work_rx.clone(),
                self.executor.clone(),
                self.store.clone(),
                worker_ack_tx.clone(),
            )));
        }

        let scheduler_loop = SchedulerLoop {
            registry: self.registry.clone(),
            store: self.store.clone(),
            client: self.client.clone(),
            opts: self.opts,
            work_tx,
            trigger_rx,
            stop_rx,
            stop_ack_tx,
            worker_ack_rx,
            last_scheduled: HashMap::new(),
        };
        let loop_handle = tokio::spawn(scheduler_loop.run());

        self.running = Some(Running {
            trigger_tx,
            stop_tx,
            stop_ack_rx,
            loop_handle,
            worker_handles,
        });

        info!(
            "==> service checker started: {} checks, interval: {:?}, parallel: {}",
            self.registry.len(),
            self.opts.interval,
            self.opts.parallel
        );
    }

    /// Signal the loop to drain and wait for full shutdown. In-flight
    /// checks finish first. A no-op when never started or already stopped.
    pub async fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        let _ = running.stop_tx.send(()).await;
        let _ = running.stop_ack_rx.recv().await;

        let _ = running.loop_handle.await;
        for handle in running.worker_handles {
            let _ = handle.await;
        }

        info!("==> service checker stopped");
    }

    /// Enqueue an out-of-band full check run. Never blocks: when the
    /// trigger channel is full the event is dropped, not queued.
    pub fn trigger(&self, event: EventType) {
        let Some(running) = &self.running else {
            debug!("trigger {event} ignored, checker not running");
            return;
        };
        offer_trigger(&running.trigger_tx, event);
    }

    /// Current aggregate snapshot. Never blocks on check execution;
    /// reflects whatever was last recorded.
    pub fn results(&self) -> Results {
        Results {
            what: EventType::Api,
            interval_secs: self.opts.interval.as_secs(),
            svcs: self.store.snapshot(&self.registry),
        }
    }

    /// Run every check once, off the scheduler, and return the snapshot.
    pub async fn run_once(&self) -> Results {
        let mut set = tokio::task::JoinSet::new();
        for check in self.registry.iter() {
            let executor = self.executor.clone();
            let check = check.clone();
            set.spawn(async move { executor.execute(&check).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => self.store.record(result),
                Err(err) => error!("check task failed: {err}"),
            }
        }

        Results {
            what: EventType::Log,
            interval_secs: self.opts.interval.as_secs(),
            svcs: self.store.snapshot(&self.registry),
        }
    }
}

/// Non-blocking trigger submission; a full channel drops the event.
fn offer_trigger(trigger_tx: &mpsc::Sender<EventType>, event: EventType) -> bool {
    match trigger_tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(event)) => {
            debug!("trigger channel full, dropping {event}");
            false
        }
        Err(mpsc::error::TrySendError::Closed(event)) => {
            debug!("trigger {event} ignored, checker shutting down");
            false
        }
    }
}

/// One pool worker. Drains the work queue until it sees the stop sentinel
/// or the queue closes. A panicking check is confined to its own task and
/// recorded as Critical.
async fn worker(
    work_rx: Arc<Mutex<mpsc::Receiver<Work>>>,
    executor: Arc<Executor>,
    store: Arc<ResultStore>,
    worker_ack_tx: mpsc::Sender<()>,
) {
    loop {
        // The guard is released as soon as one item is received, so the
        // pool executes in parallel while receiving one at a time.
        let work = { work_rx.lock().await.recv().await };

        match work {
            None => return,
            Some(Work::Stop) => {
                let _ = worker_ack_tx.send(()).await;
                return;
            }
            Some(Work::Run { check, done }) => {
                let task = {
                    let executor = executor.clone();
                    let check = check.clone();
                    tokio::spawn(async move { executor.execute(&check).await })
                };

                let result = match task.await {
                    Ok(result) => result,
                    Err(err) => {
                        error!("check {} panicked: {err}", check.name);
                        CheckResult::pending(&check.name)
                            .failing(format!("check panicked: {err}"), 0)
                    }
                };

                store.record(result);
                drop(done);
            }
        }
    }
}

/// The single coordinating routine driving ticks, triggers, and shutdown.
struct SchedulerLoop {
    registry: Arc<Registry>,
    store: Arc<ResultStore>,
    client: Option<Arc<upcast::Client>>,
    opts: SchedulerOptions,
    work_tx: mpsc::Sender<Work>,
    trigger_rx: mpsc::Receiver<EventType>,
    stop_rx: mpsc::Receiver<()>,
    stop_ack_tx: mpsc::Sender<()>,
    worker_ack_rx: mpsc::Receiver<()>,
    /// When each check was last handed to the pool. Only this routine
    /// touches it.
    last_scheduled: HashMap<String, Instant>,
}

impl SchedulerLoop {
    async fn run(mut self) {
        // First pass: run everything, wait, and announce ourselves.
        self.run_checks(true, true).await;
        self.report(EventType::Startup).await;

        let start = tokio::time::Instant::now();
        let mut report_tick = tokio::time::interval_at(start + self.opts.interval, self.opts.interval);
        let mut fast_tick = tokio::time::interval_at(start + self.opts.fast_tick, self.opts.fast_tick);

        loop {
            tokio::select! {
                _ = self.stop_rx.recv() => {
                    self.shutdown().await;
                    return;
                }
                _ = report_tick.tick() => {
                    // Reports use the latest cached results; the fast tick
                    // keeps them fresh.
                    self.report(EventType::Cron).await;
                }
                Some(event) = self.trigger_rx.recv() => {
                    debug!(
                        "running all service checks via event: {event}, buffer: {}/{}",
                        self.opts.work_buffer - self.work_tx.capacity(),
                        self.opts.work_buffer
                    );
                    self.run_checks(true, true).await;

                    if event == EventType::Log {
                        self.log_results();
                    } else {
                        self.report(event).await;
                    }
                }
                _ = fast_tick.tick() => {
                    self.run_checks(false, false).await;
                }
            }
        }
    }

    /// Hand checks to the pool. `all` forces every check regardless of
    /// due-ness; `wait` blocks until each handed-out check completed.
    async fn run_checks(&mut self, all: bool, wait: bool) {
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        let now = Instant::now();

        for check in self.registry.iter() {
            if !all && !self.due(check, now) {
                continue;
            }

            self.last_scheduled.insert(check.name.clone(), now);
            let work = Work::Run {
                check: check.clone(),
                done: wait.then(|| done_tx.clone()),
            };
            if self.work_tx.send(work).await.is_err() {
                return;
            }
        }

        drop(done_tx);
        if wait {
            // Every handle has been dropped once the batch is done.
            while done_rx.recv().await.is_some() {}
        }
    }

    fn due(&self, check: &Check, now: Instant) -> bool {
        match self.last_scheduled.get(&check.name) {
            None => true,
            Some(at) => now.saturating_duration_since(*at) >= check.interval,
        }
    }

    /// Push one stop sentinel per worker and wait for each to acknowledge,
    /// then release `stop`.
    async fn shutdown(&mut self) {
        for _ in 0..self.opts.parallel {
            if self.work_tx.send(Work::Stop).await.is_err() {
                break;
            }
        }
        for _ in 0..self.opts.parallel {
            if self.worker_ack_rx.recv().await.is_none() {
                break;
            }
        }

        let _ = self.stop_ack_tx.send(()).await;
    }

    /// Send the aggregate snapshot upstream. Delivery failures are logged
    /// and swallowed; the loop never stops over them.
    async fn report(&self, what: EventType) {
        let results = Results {
            what,
            interval_secs: self.opts.interval.as_secs(),
            svcs: self.store.snapshot(&self.registry),
        };

        let Some(client) = &self.client else {
            debug!("no upstream configured, skipping {what} report");
            return;
        };

        match client.send(REPORT_ROUTE, &results, self.opts.verbose).await {
            Ok(response) => debug!("{what} report delivered: {}", response.result),
            Err(err) => error!("sending {what} report: {err}"),
        }
    }

    /// The log-only trigger: pretty-print the payload locally instead of
    /// sending it.
    fn log_results(&self) {
        let results = Results {
            what: EventType::Log,
            interval_secs: self.opts.interval.as_secs(),
            svcs: self.store.snapshot(&self.registry),
        };
        match serde_json::to_string_pretty(&results) {
            Ok(payload) => debug!("service check payload (log only):\n{payload}"),
            Err(err) => error!("encoding service check payload: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::types::{CheckKind, CheckState};
    use crate::checks::validation::{DEFAULT_SEND_INTERVAL, MAXIMUM_PARALLEL, MINIMUM_SEND_INTERVAL};

    fn tcp_check(name: &str, target: String) -> Check {
        Check {
            name: name.to_owned(),
            kind: CheckKind::Tcp,
            target,
            expect: String::new(),
            timeout: Duration::from_secs(2),
            interval: Duration::from_secs(60),
        }
    }

    fn executor() -> Arc<Executor> {
        Arc::new(Executor::new(Duration::from_secs(30)).unwrap())
    }

    fn opts() -> SchedulerOptions {
        SchedulerOptions {
            parallel: 2,
            interval: Duration::from_secs(600),
            ..SchedulerOptions::default()
        }
    }

    async fn wait_for<F: Fn(&Results) -> bool>(scheduler: &Scheduler, pred: F) -> Results {
        for _ in 0..200 {
            let results = scheduler.results();
            if pred(&results) {
                return results;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached: {:?}", scheduler.results());
    }

    #[tokio::test]
    async fn test_setup_with_no_checks_disables_the_scheduler() {
        let (mut scheduler, config) =
            Scheduler::setup(vec![], opts(), executor(), None).unwrap();
        assert!(config.disabled);
        assert!(config.checks.is_empty());

        // start is a no-op; stop on a never-started scheduler too.
        scheduler.start();
        assert!(scheduler.running.is_none());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_setup_clamps_parallelism_and_interval() {
        let checks = vec![tcp_check("web", "example.com:80".to_owned())];
        let mut options = opts();
        options.parallel = 0;
        options.interval = Duration::from_secs(5);

        let (_, config) = Scheduler::setup(checks, options, executor(), None).unwrap();
        assert_eq!(config.parallel, 1);
        assert_eq!(config.interval_secs, MINIMUM_SEND_INTERVAL.as_secs());

        let checks = vec![tcp_check("web", "example.com:80".to_owned())];
        let mut options = opts();
        options.parallel = 50;
        options.interval = Duration::ZERO;

        let (_, config) = Scheduler::setup(checks, options, executor(), None).unwrap();
        assert_eq!(config.parallel, MAXIMUM_PARALLEL);
        assert_eq!(config.interval_secs, DEFAULT_SEND_INTERVAL.as_secs());
    }

    #[tokio::test]
    async fn test_setup_clamps_short_check_intervals() {
        let mut check = tcp_check("hasty", "example.com:80".to_owned());
        check.interval = Duration::from_secs(5);

        let (_, config) = Scheduler::setup(vec![check], opts(), executor(), None).unwrap();
        assert_eq!(config.checks[0].interval_secs, 10);
    }

    #[tokio::test]
    async fn test_setup_rejects_the_first_invalid_check() {
        let checks = vec![
            tcp_check("web", "example.com:80".to_owned()),
            tcp_check("web", "example.com:443".to_owned()),
        ];
        let err = Scheduler::setup(checks, opts(), executor(), None).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateName { name: "web".to_owned() });
    }

    #[tokio::test]
    async fn test_results_are_idempotent_without_execution() {
        let checks = vec![tcp_check("web", "example.com:80".to_owned())];
        let (scheduler, config) = Scheduler::setup(checks, opts(), executor(), None).unwrap();
        assert!(!config.disabled);

        // Not started: both snapshots are the same placeholder view.
        let first = scheduler.results();
        let second = scheduler.results();
        assert_eq!(first, second);
        assert_eq!(first.svcs[0].state, CheckState::Unknown);
    }

    #[tokio::test]
    async fn test_offer_trigger_drops_when_full() {
        let (tx, _rx) = mpsc::channel::<EventType>(2);
        assert!(offer_trigger(&tx, EventType::Api));
        assert!(offer_trigger(&tx, EventType::Api));
        // Capacity reached: the extra trigger is dropped, not queued.
        assert!(!offer_trigger(&tx, EventType::Api));
    }

    #[tokio::test]
    async fn test_trigger_on_stopped_scheduler_is_a_no_op() {
        let checks = vec![tcp_check("web", "example.com:80".to_owned())];
        let (scheduler, _) = Scheduler::setup(checks, opts(), executor(), None).unwrap();
        scheduler.trigger(EventType::Api);
    }

    #[tokio::test]
    async fn test_startup_runs_checks_and_stop_twice_is_safe() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checks = vec![tcp_check("local", addr.to_string())];
        let (mut scheduler, _) = Scheduler::setup(checks, opts(), executor(), None).unwrap();
        scheduler.start();

        let results = wait_for(&scheduler, |r| r.svcs[0].state == CheckState::Ok).await;
        assert_eq!(results.svcs[0].name, "local");

        scheduler.stop().await;
        // Second stop returns immediately, no panic, no duplicate sentinels.
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_failing_check_does_not_block_others() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checks = vec![
            tcp_check("bad", "127.0.0.1:1".to_owned()),
            tcp_check("good", addr.to_string()),
        ];
        let (mut scheduler, _) = Scheduler::setup(checks, opts(), executor(), None).unwrap();
        scheduler.start();

        let results = wait_for(&scheduler, |r| {
            r.svcs.iter().all(|s| s.last_run.is_some())
        })
        .await;

        assert_eq!(results.svcs[0].state, CheckState::Critical);
        assert_eq!(results.svcs[1].state, CheckState::Ok);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_trigger_forces_a_rerun() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checks = vec![tcp_check("local", addr.to_string())];
        let (mut scheduler, _) = Scheduler::setup(checks, opts(), executor(), None).unwrap();
        scheduler.start();

        let first = wait_for(&scheduler, |r| r.svcs[0].last_run.is_some()).await;
        let first_run = first.svcs[0].last_run.unwrap();

        // The check's own interval (60s) has not elapsed; only the trigger
        // can make it run again.
        scheduler.trigger(EventType::Trigger);
        wait_for(&scheduler, |r| {
            r.svcs[0].last_run.is_some_and(|at| at > first_run)
        })
        .await;

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_is_guarded() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checks = vec![tcp_check("local", addr.to_string())];
        let (mut scheduler, _) = Scheduler::setup(checks, opts(), executor(), None).unwrap();
        scheduler.start();
        scheduler.start();

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_run_once_fills_the_snapshot() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checks = vec![tcp_check("local", addr.to_string())];
        let (scheduler, _) = Scheduler::setup(checks, opts(), executor(), None).unwrap();

        let results = scheduler.run_once().await;
        assert_eq!(results.what, EventType::Log);
        assert_eq!(results.svcs[0].state, CheckState::Ok);
    }
}
