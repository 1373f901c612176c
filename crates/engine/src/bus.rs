//! Event bus: drains the context's queue, dispatching each event to the
//! handler registered for its kind.
//!
//! Handlers may append to the queue while it is being drained. A run only
//! returns once the queue is empty, so one external write settles its whole
//! cascade before control goes back to the caller.

use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::events::{Event, EventCollector, EventKind};
use crate::handlers::{self, Handler};

/// Report from one bus run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Events dispatched to a handler.
    pub events_processed: usize,

    /// Events dispatched, per kind.
    pub per_kind: FxHashMap<EventKind, usize>,

    /// Events skipped because their id was already processed in this run.
    pub duplicates_skipped: usize,

    /// Longest the queue got during the run (including the initial backlog).
    pub max_queue_depth: usize,

    /// Wall time of the run in microseconds.
    pub duration_us: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of processed events of one kind.
    pub fn processed(&self, kind: EventKind) -> usize {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }

    fn record(&mut self, kind: EventKind) {
        self.events_processed += 1;
        *self.per_kind.entry(kind).or_insert(0) += 1;
    }

    /// Format as a concise one-line summary for logging.
    pub fn summary(&self) -> String {
        let mut kinds: Vec<String> = self
            .per_kind
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect();
        kinds.sort();
        format!(
            "{} events in {}us, max_queue={}, duplicates={} [{}]",
            self.events_processed,
            self.duration_us,
            self.max_queue_depth,
            self.duplicates_skipped,
            kinds.join(" ")
        )
    }
}

/// Kind → handler dispatch table.
pub struct EventBus {
    handlers: FxHashMap<EventKind, Handler>,
    collector: Option<EventCollector>,
}

impl EventBus {
    /// Bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: FxHashMap::default(),
            collector: None,
        }
    }

    /// Bus with the default handler for every cell, sindex and sheet event.
    pub fn with_default_handlers() -> Self {
        let mut bus = Self::new();
        handlers::register_defaults(&mut bus);
        bus
    }

    /// Bind `handler` to `kind`, replacing any previous one.
    pub fn register<H>(&mut self, kind: EventKind, handler: H)
    where
        H: FnMut(&Event, &mut Context) -> Result<()> + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Start or stop recording dispatched events.
    pub fn record_events(&mut self, enabled: bool) {
        if enabled {
            self.collector.get_or_insert_with(EventCollector::new);
        } else {
            self.collector = None;
        }
    }

    /// Events dispatched since recording started, in order.
    pub fn collected(&self) -> Option<&EventCollector> {
        self.collector.as_ref()
    }

    pub fn clear_collected(&mut self) {
        if let Some(collector) = self.collector.as_mut() {
            collector.clear();
        }
    }

    /// Drain the queue until it is empty.
    ///
    /// On error the remaining queue is discarded; repositories may hold a
    /// partially propagated state and the caller has to roll back.
    pub fn run(&mut self, ctx: &mut Context) -> Result<RunReport> {
        let start = Instant::now();
        let mut report = RunReport::new();

        let result = self.drain(ctx, &mut report);
        report.duration_us = start.elapsed().as_micros() as u64;

        match result {
            Ok(()) => {
                if report.events_processed > 0 {
                    log::info!("[bus] {}", report.summary());
                }
                Ok(report)
            }
            Err(err) => {
                let dropped = ctx.queue.len();
                ctx.queue.clear();
                log::warn!(
                    "[bus] run aborted after {} events, {dropped} dropped: {err}",
                    report.events_processed
                );
                Err(err)
            }
        }
    }

    fn drain(&mut self, ctx: &mut Context, report: &mut RunReport) -> Result<()> {
        let settings = ctx.settings.bus.clone();
        let mut seen = FxHashSet::default();
        report.max_queue_depth = ctx.queue.len();

        while let Some(event) = ctx.queue.pop_front() {
            if settings.skip_duplicate_events && !seen.insert(event.id()) {
                log::warn!("[bus] skipping duplicate event {}", event.id());
                report.duplicates_skipped += 1;
                continue;
            }
            if report.events_processed >= settings.max_events {
                return Err(EngineError::CascadeLimit { limit: settings.max_events });
            }

            let kind = event.kind();
            let handler = self
                .handlers
                .get_mut(&kind)
                .ok_or(EngineError::UnregisteredHandler(kind))?;
            log::debug!("[bus] {} {} {}", event.id(), kind, event.subject());
            handler(&event, ctx)?;

            report.record(kind);
            report.max_queue_depth = report.max_queue_depth.max(ctx.queue.len());
            if let Some(collector) = self.collector.as_mut() {
                collector.push(event);
            }
        }
        Ok(())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}
