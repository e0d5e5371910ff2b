//! Driving systems: triggers, schedules and run reports.
//!
//! Every registered system gets its own tokio task for the duration of a run.
//! A system without a [`Trigger`] is swept once at the current time; a system
//! with one is swept at every timestamp the trigger yields, until the trigger
//! ends or the run is cancelled. Sweeps execute on tokio's blocking pool since
//! systems are plain synchronous functions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::dispatch::{self, SweepStats};
use crate::error::WorldError;
use crate::system::System;
use crate::world::World;

/// Source of tick timestamps for a periodic system.
pub struct Trigger {
    stream: BoxStream<'static, SystemTime>,
}

impl Trigger {
    /// Tick on every timestamp `stream` yields, ending with it.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = SystemTime> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
        }
    }

    /// Tick on every timestamp received, ending once all senders are gone.
    pub fn from_receiver(rx: mpsc::Receiver<SystemTime>) -> Self {
        Self::from_stream(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|now| (now, rx))
        }))
    }

    /// Tick forever, once per `period`, stamped with the wall clock.
    ///
    /// The first tick fires one period after the schedule starts. Ticks missed
    /// because a sweep overran are skipped rather than bunched up.
    pub fn interval(period: Duration) -> Self {
        let period = period.max(Duration::from_nanos(1));
        // The interval needs a runtime, so it is built on first poll.
        Self::from_stream(stream::unfold(
            None,
            move |state: Option<Interval>| async move {
                let mut interval = state.unwrap_or_else(|| {
                    let mut interval = time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    interval
                });
                interval.tick().await;
                Some((SystemTime::now(), Some(interval)))
            },
        ))
    }

    /// Like [`Trigger::interval`], ending after `count` ticks.
    pub fn ticks(period: Duration, count: usize) -> Self {
        Self::from_stream(Self::interval(period).stream.take(count))
    }

    /// Tick once per given timestamp, as fast as sweeps complete.
    pub fn timestamps<I>(timestamps: I) -> Self
    where
        I: IntoIterator<Item = SystemTime>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(timestamps))
    }

    async fn next(&mut self) -> Option<SystemTime> {
        self.stream.next().await
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger").finish_non_exhaustive()
    }
}

/// How a schedule finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEnd {
    /// A one-shot system ran its single sweep.
    Completed,
    /// The trigger ran out of timestamps.
    Exhausted,
    /// The run's cancellation signal fired.
    Cancelled,
    /// The system panicked; the message is the panic payload.
    Panicked(String),
}

/// Per-system summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub name: String,
    /// Sweeps completed.
    pub ticks: u64,
    /// Invocations across all sweeps.
    pub invocations: usize,
    /// Invocations that returned an error.
    pub errors: usize,
    /// Entities passed over for lacking a component.
    pub skipped: usize,
    /// Entities passed over because a parameter was malformed.
    pub invalid: usize,
    pub end: ScheduleEnd,
}

impl ScheduleOutcome {
    fn new(name: &str, end: ScheduleEnd) -> Self {
        Self {
            name: name.to_string(),
            ticks: 0,
            invocations: 0,
            errors: 0,
            skipped: 0,
            invalid: 0,
            end,
        }
    }

    fn record(&mut self, stats: SweepStats) {
        self.ticks += 1;
        self.invocations += stats.matched;
        self.errors += stats.errors;
        self.skipped += stats.skipped;
        self.invalid += stats.invalid;
    }
}

/// Result of a whole run, one outcome per registered system in registration
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<ScheduleOutcome>,
}

impl RunReport {
    /// Outcome of the first system registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScheduleOutcome> {
        self.outcomes.iter().find(|outcome| outcome.name == name)
    }

    /// System errors reported across every schedule.
    #[must_use]
    pub fn total_errors(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.errors).sum()
    }

    /// `true` if no system errored or panicked.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|outcome| {
            outcome.errors == 0 && !matches!(outcome.end, ScheduleEnd::Panicked(_))
        })
    }
}

/// Completion handle for one system's schedule.
#[derive(Debug)]
pub struct ScheduleHandle {
    name: String,
    join: JoinHandle<ScheduleOutcome>,
}

impl ScheduleHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the schedule to end.
    pub async fn wait(self) -> ScheduleOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => ScheduleOutcome::new(&self.name, ScheduleEnd::Panicked(panic_message(err))),
        }
    }
}

/// A run in progress.
#[derive(Debug)]
pub struct Run {
    handles: Vec<ScheduleHandle>,
    cancel: Arc<watch::Sender<bool>>,
    signal: JoinHandle<()>,
}

impl Run {
    /// Handles of the running schedules, in registration order.
    #[must_use]
    pub fn handles(&self) -> &[ScheduleHandle] {
        &self.handles
    }

    /// Stop every periodic schedule after its current sweep.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait for every schedule to end.
    pub async fn wait(self) -> RunReport {
        let Self {
            handles,
            cancel: _cancel,
            signal,
        } = self;

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.wait().await);
        }
        signal.abort();

        let report = RunReport { outcomes };
        info!(
            systems = report.outcomes.len(),
            errors = report.total_errors(),
            clean = report.is_clean(),
            "run finished"
        );
        report
    }
}

impl World {
    /// Start every registered system and return without waiting.
    ///
    /// Periodic schedules stop once `signal` resolves or
    /// [`Run::cancel`] is called. One-shot systems always complete.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start<F>(&self, signal: F) -> Run
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(false);
        let cancel = Arc::new(tx);
        let systems = self.systems_snapshot();
        info!(
            systems = systems.len(),
            objects = self.len(),
            "starting run"
        );

        let handles = systems
            .into_iter()
            .map(|system| ScheduleHandle {
                name: system.name().to_string(),
                join: tokio::spawn(drive(self.clone(), system, rx.clone())),
            })
            .collect();

        let notify = Arc::clone(&cancel);
        let signal = tokio::spawn(async move {
            signal.await;
            debug!("cancellation signal received");
            notify.send_replace(true);
        });

        Run {
            handles,
            cancel,
            signal,
        }
    }

    /// Run every registered system to completion. Periodic systems with an
    /// endless trigger keep this from ever returning; use
    /// [`World::run_until`] for those.
    pub async fn run(&self) -> RunReport {
        self.run_until(std::future::pending()).await
    }

    /// Run every registered system, stopping periodic ones once `signal`
    /// resolves.
    pub async fn run_until<F>(&self, signal: F) -> RunReport
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.start(signal).wait().await
    }

    /// Build a runtime from `config` and block on [`World::run`].
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::Runtime`] if the runtime cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async runtime. Use [`World::run`]
    /// there instead.
    pub fn run_blocking(&self, config: &RuntimeConfig) -> Result<RunReport, WorldError> {
        let runtime = config.build_runtime()?;
        Ok(runtime.block_on(self.run()))
    }
}

async fn drive(world: World, system: Arc<System>, mut cancel: watch::Receiver<bool>) -> ScheduleOutcome {
    let mut outcome = ScheduleOutcome::new(system.name(), ScheduleEnd::Completed);

    if !system.is_periodic() {
        match sweep_blocking(&world, &system, SystemTime::now()).await {
            Ok(stats) => outcome.record(stats),
            Err(message) => outcome.end = ScheduleEnd::Panicked(message),
        }
        log_end(&outcome);
        return outcome;
    }

    let Some(mut trigger) = system.take_trigger() else {
        warn!(
            system = system.name(),
            "trigger already consumed by an earlier run"
        );
        outcome.end = ScheduleEnd::Exhausted;
        return outcome;
    };

    outcome.end = loop {
        let now = tokio::select! {
            biased;
            () = cancelled(&mut cancel) => break ScheduleEnd::Cancelled,
            next = trigger.next() => match next {
                Some(now) => now,
                None => break ScheduleEnd::Exhausted,
            },
        };
        match sweep_blocking(&world, &system, now).await {
            Ok(stats) => outcome.record(stats),
            Err(message) => break ScheduleEnd::Panicked(message),
        }
    };
    log_end(&outcome);
    outcome
}

fn log_end(outcome: &ScheduleOutcome) {
    match &outcome.end {
        ScheduleEnd::Panicked(message) => warn!(
            system = %outcome.name,
            ticks = outcome.ticks,
            panic = %message,
            "system panicked"
        ),
        end => debug!(
            system = %outcome.name,
            ticks = outcome.ticks,
            invocations = outcome.invocations,
            ?end,
            "schedule ended"
        ),
    }
}

/// Resolves once cancellation is requested. Never resolves if the sender is
/// gone without having cancelled.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn sweep_blocking(
    world: &World,
    system: &Arc<System>,
    now: SystemTime,
) -> Result<SweepStats, String> {
    let world = world.clone();
    let system = Arc::clone(system);
    tokio::task::spawn_blocking(move || dispatch::sweep(&world, &system, now))
        .await
        .map_err(panic_message)
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::UNIX_EPOCH;

    use super::*;
    use crate::component::Component;
    use crate::entity::Entity;
    use crate::param::ArgValue;
    use crate::query::Query;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(i32);
    impl Component for Position {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(i32);
    impl Component for Velocity {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Target;
    impl Component for Target {}

    fn movement(p: Position, v: Velocity) -> Position {
        Position(p.0 + v.0)
    }

    fn position_of(world: &World, entity: Entity) -> Option<Position> {
        world
            .get_object(entity)
            .and_then(|object| object.read().component::<Position>().copied())
    }

    #[tokio::test]
    async fn test_one_shot_run() {
        let world = World::new();
        let entity = world.spawn((Position(1), Velocity(2)));
        world.add_system(System::new(movement));

        let report = world.run().await;

        assert_eq!(position_of(&world, entity), Some(Position(3)));
        let outcome = report.get("movement").unwrap();
        assert_eq!(outcome.end, ScheduleEnd::Completed);
        assert_eq!(outcome.ticks, 1);
        assert_eq!(outcome.invocations, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_periodic_run_counts_ticks() {
        let world = World::new();
        let entity = world.spawn((Position(1), Velocity(2)));
        world.add_system(
            System::new(movement).with_trigger(Trigger::ticks(Duration::from_millis(10), 3)),
        );

        let report = world.run().await;

        assert_eq!(position_of(&world, entity), Some(Position(7)));
        let outcome = report.get("movement").unwrap();
        assert_eq!(outcome.end, ScheduleEnd::Exhausted);
        assert_eq!(outcome.ticks, 3);
    }

    #[tokio::test]
    async fn test_tick_timestamps_injected_in_order() {
        let world = World::new();
        world.spawn((Position(0),));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let first = UNIX_EPOCH + Duration::from_secs(100);
        let second = UNIX_EPOCH + Duration::from_secs(200);
        world.add_system(
            System::new(move |now: SystemTime, _: Position| {
                sink.lock().unwrap().push(now);
            })
            .with_trigger(Trigger::timestamps(vec![first, second])),
        );

        world.run().await;
        assert_eq!(*seen.lock().unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_receiver_trigger() {
        let world = World::new();
        let entity = world.spawn((Position(0), Velocity(1)));
        world.add_system(System::new(movement).with_trigger({
            let (tx, rx) = mpsc::channel(4);
            tx.send(UNIX_EPOCH).await.unwrap();
            tx.send(UNIX_EPOCH).await.unwrap();
            Trigger::from_receiver(rx)
        }));

        let report = world.run().await;
        assert_eq!(position_of(&world, entity), Some(Position(2)));
        assert_eq!(report.get("movement").unwrap().end, ScheduleEnd::Exhausted);
    }

    #[tokio::test]
    async fn test_cancel_endless_trigger() {
        fn chase(pos: Position, _: Velocity, targets: Query<(Target, Position)>) -> Position {
            match targets.first().into_item() {
                Some((_, target)) if target.0 > pos.0 => Position(pos.0 + 1),
                Some((_, target)) if target.0 < pos.0 => Position(pos.0 - 1),
                _ => pos,
            }
        }

        let world = World::new();
        let chaser = world.spawn((Position(0), Velocity(1)));
        world.spawn((Target, Position(5)));
        world.add_system(
            System::new(chase).with_trigger(Trigger::interval(Duration::from_millis(10))),
        );

        let report = world
            .run_until(time::sleep(Duration::from_millis(500)))
            .await;

        assert_eq!(position_of(&world, chaser), Some(Position(5)));
        let outcome = report.get("chase").unwrap();
        assert_eq!(outcome.end, ScheduleEnd::Cancelled);
        assert!(outcome.ticks >= 5);
    }

    #[tokio::test]
    async fn test_run_cancel() {
        let world = World::new();
        world.spawn((Position(0), Velocity(1)));
        world.add_system(
            System::new(movement).with_trigger(Trigger::interval(Duration::from_millis(5))),
        );

        let run = world.start(std::future::pending());
        assert_eq!(run.handles().len(), 1);
        assert_eq!(run.handles()[0].name(), "movement");
        time::sleep(Duration::from_millis(30)).await;
        run.cancel();

        let report = run.wait().await;
        assert_eq!(report.outcomes[0].end, ScheduleEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_noop_runs() {
        let calls = Arc::new(Mutex::new(0usize));
        let counting = |calls: &Arc<Mutex<usize>>| {
            let calls = Arc::clone(calls);
            move |_: &str, _: &[ArgValue], _: &anyhow::Error| {
                *calls.lock().unwrap() += 1;
            }
        };

        let world = World::new();
        world.set_error_handler(counting(&calls));
        let report = world.run().await;
        assert!(report.outcomes.is_empty());
        assert!(report.is_clean());

        let world = World::new();
        world.set_error_handler(counting(&calls));
        world.add_system(System::new(movement));
        let report = world.run().await;
        let outcome = report.get("movement").unwrap();
        assert_eq!(outcome.end, ScheduleEnd::Completed);
        assert_eq!(outcome.invocations, 0);
        assert_eq!(outcome.errors, 0);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        fn explode(_: Position) {
            panic!("boom");
        }

        let world = World::new();
        let entity = world.spawn((Position(1), Velocity(2)));
        world.add_system(System::new(explode));
        world.add_system(System::new(movement));

        let report = world.run().await;

        assert_eq!(
            report.get("explode").unwrap().end,
            ScheduleEnd::Panicked("boom".to_string())
        );
        assert_eq!(report.get("movement").unwrap().end, ScheduleEnd::Completed);
        assert_eq!(position_of(&world, entity), Some(Position(3)));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_errors_counted_in_report() {
        fn refuse(_: Position) -> anyhow::Result<()> {
            anyhow::bail!("refused")
        }

        let world = World::new();
        world.spawn((Position(1),));
        world.spawn((Position(2),));
        world.set_error_handler(|_: &str, _: &[ArgValue], _: &anyhow::Error| {});
        world.add_system(System::new(refuse));

        let report = world.run().await;
        assert_eq!(report.total_errors(), 2);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_trigger_consumed_by_first_run() {
        let world = World::new();
        let entity = world.spawn((Position(0), Velocity(1)));
        world.add_system(
            System::new(movement).with_trigger(Trigger::ticks(Duration::from_millis(1), 2)),
        );

        let first = world.run().await;
        let second = world.run().await;

        assert_eq!(first.outcomes[0].ticks, 2);
        assert_eq!(second.outcomes[0].ticks, 0);
        assert_eq!(second.outcomes[0].end, ScheduleEnd::Exhausted);
        assert_eq!(position_of(&world, entity), Some(Position(2)));
    }

    #[test]
    fn test_run_blocking() {
        let world = World::new();
        let entity = world.spawn((Position(1), Velocity(2)));
        world.add_system(System::new(movement));

        let config = RuntimeConfig::new().with_worker_threads(1);
        let report = world.run_blocking(&config).unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(position_of(&world, entity), Some(Position(3)));
    }
}
