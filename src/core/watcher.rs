//! Poll scheduler.
//!
//! One task per enabled detector: run a cycle, wait for the interval (or for
//! the stop signal), repeat. The first cycle runs immediately so every
//! detector has a baseline snapshot. A cycle is never cancelled midway; the
//! stop signal only interrupts the wait between cycles.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::alerts::engine::AlertFactory;
use super::alerts::model::AlertCategory;
use super::alerts::queue::AlertQueue;
use super::alerts::triggers::{self, CurrentRead, RouteReading};
use super::config::MonitorConfig;
use super::error::{FetchError, MalformedRecord};
use super::model::{EntityClass, RecordFilter};
use super::parser::{self, Parsed};
use super::source::{DataSource, WeatherService};
use super::state::SnapshotStore;

/// Shared, read-only handles every detector task works with.
pub struct PollContext {
    pub config: Arc<MonitorConfig>,
    pub source: Arc<dyn DataSource>,
    pub weather: Arc<dyn WeatherService>,
    pub queue: Arc<AlertQueue>,
    pub factory: Arc<AlertFactory>,
    pub filter: RecordFilter,
}

impl PollContext {
    pub fn new(
        config: Arc<MonitorConfig>,
        source: Arc<dyn DataSource>,
        weather: Arc<dyn WeatherService>,
        queue: Arc<AlertQueue>,
    ) -> Self {
        let filter = RecordFilter::for_user(&config.user);
        Self {
            config,
            source,
            weather,
            queue,
            factory: Arc::new(AlertFactory::new()),
            filter,
        }
    }
}

pub struct PollScheduler {
    ctx: Arc<PollContext>,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<(AlertCategory, JoinHandle<()>)>,
}

impl PollScheduler {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            shutdown: None,
            tasks: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawn one task per enabled detector. Must be called inside a Tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            log::warn!("Poll scheduler already running");
            return;
        }

        let (tx, rx) = watch::channel(false);
        for category in AlertCategory::all() {
            let poller = self.ctx.config.poller(*category);
            if !poller.enabled {
                log::info!("{} detector disabled", category.display_name());
                continue;
            }
            let handle = tokio::spawn(run_detector(*category, Arc::clone(&self.ctx), rx.clone()));
            self.tasks.push((*category, handle));
        }
        self.shutdown = Some(tx);
        log::info!("Poll scheduler started with {} detector(s)", self.tasks.len());
    }

    /// Signal every detector to stop and wait for in-flight cycles to finish.
    pub async fn stop(&mut self) {
        let Some(tx) = self.shutdown.take() else {
            return;
        };
        let _ = tx.send(true);

        for (category, handle) in self.tasks.drain(..) {
            if let Err(e) = handle.await {
                log::error!("{} detector task ended abnormally: {e}", category.display_name());
            }
        }
        log::info!("Poll scheduler stopped");
    }
}

/// Extra wait after `failures` consecutive failed cycles.
pub fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32 << (failures - 1).min(16);
    base.saturating_mul(factor).min(max)
}

async fn run_detector(category: AlertCategory, ctx: Arc<PollContext>, mut shutdown: watch::Receiver<bool>) {
    let interval = ctx.config.poller(category).interval();
    let mut store = SnapshotStore::new(category);
    let mut failures: u32 = 0;

    log::info!(
        "{} detector started (interval={}s)",
        category.display_name(),
        interval.as_secs()
    );

    loop {
        let stopping = *shutdown.borrow();
        if stopping {
            break;
        }

        let backoff = match run_cycle(&ctx, &mut store).await {
            Ok(queued) => {
                failures = 0;
                log::debug!("{} cycle complete, {queued} alert(s) queued", category.display_name());
                Duration::ZERO
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let backoff = backoff_delay(failures, ctx.config.failure_backoff(), ctx.config.max_backoff());
                log::warn!(
                    "{} cycle skipped ({failures} consecutive failure(s)), next try in {}s: {e}",
                    category.display_name(),
                    (interval + backoff).as_secs()
                );
                backoff
            }
        };

        let wait = interval + backoff;
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    log::info!("{} detector stopped", category.display_name());
}

fn log_malformed(malformed: &[MalformedRecord]) {
    for record in malformed {
        log::warn!("Skipping record: {record}");
    }
}

fn take_records<T>(parsed: Parsed<T>) -> Vec<T> {
    log_malformed(&parsed.malformed);
    parsed.records
}

async fn read_current(category: AlertCategory, ctx: &PollContext) -> Result<CurrentRead, FetchError> {
    match category {
        AlertCategory::Status | AlertCategory::NewOrder | AlertCategory::Deadline => {
            let docs = ctx.source.fetch(EntityClass::Orders, &ctx.filter).await?;
            Ok(CurrentRead::Orders(take_records(parser::parse_orders(&docs))))
        }
        AlertCategory::PermitExpiry => {
            let docs = ctx.source.fetch(EntityClass::Permits, &ctx.filter).await?;
            Ok(CurrentRead::Permits(take_records(parser::parse_permits(&docs))))
        }
        AlertCategory::Weather => {
            let docs = ctx.source.fetch(EntityClass::Routes, &ctx.filter).await?;
            let routes = take_records(parser::parse_routes(&docs));

            let mut readings = Vec::new();
            let mut last_error = None;
            let mut attempted = 0usize;
            for route in routes.into_iter().filter(|r| r.is_active()) {
                attempted += 1;
                match ctx.weather.severity(&route.points).await {
                    Ok(severity) => readings.push(RouteReading { route, severity }),
                    Err(e) => {
                        log::warn!("Weather lookup failed for order {}: {e}", route.order_id);
                        last_error = Some(e);
                    }
                }
            }

            match last_error {
                Some(e) if readings.is_empty() && attempted > 0 => Err(e),
                _ => Ok(CurrentRead::Weather(readings)),
            }
        }
    }
}

/// fetch -> detect -> replace snapshot -> enqueue. Returns how many alerts
/// were new to the queue. On fetch failure the snapshot is left untouched.
async fn run_cycle(ctx: &PollContext, store: &mut SnapshotStore) -> Result<usize, FetchError> {
    let category = store.category();
    let current = read_current(category, ctx).await?;

    let detection = triggers::detect(category, store.previous(), &current, &ctx.config, Utc::now());
    store.replace(detection.snapshot);

    let mut queued = 0;
    for change in &detection.changes {
        if ctx.queue.enqueue(ctx.factory.make_alert(change)) {
            queued += 1;
        }
    }
    Ok(queued)
}
