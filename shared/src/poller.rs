//! Periodic refresh of the authoritative item set.
//!
//! The poller only decides *when* a fetch is due and *whether* a result may
//! be applied. Timers live in the shell; a tick carries the generation of the
//! timer that produced it, and a result carries the epoch it was issued
//! under. Stopping or changing what is fetched bumps the epoch, which turns
//! every outstanding result into a no-op.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::gateway::GatewayError;
use crate::model::{FeedSnapshot, ItemCollection, Stats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    Initial,
    Timer,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchTicket {
    pub epoch: u64,
    pub request: u64,
    pub trigger: RefreshTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStart {
    pub generation: u64,
    pub period: Duration,
    pub initial: FetchTicket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { items: usize, held_back: usize },
    Discarded,
    Failed(GatewayError),
}

#[derive(Debug, Clone)]
pub struct Poller {
    period: Duration,
    running: bool,
    generation: u64,
    epoch: u64,
    issued: u64,
    in_flight: BTreeSet<u64>,
    last_applied: Option<u64>,
    last_error: Option<GatewayError>,
}

impl Poller {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            running: false,
            generation: 0,
            epoch: 0,
            issued: 0,
            in_flight: BTreeSet::new(),
            last_applied: None,
            last_error: None,
        }
    }

    /// Starts the timer and issues the initial fetch. `None` if already running.
    pub fn start(&mut self) -> Option<PollStart> {
        if self.running {
            return None;
        }
        self.running = true;
        self.generation += 1;
        self.epoch += 1;
        let initial = self.issue(RefreshTrigger::Initial);
        info!(generation = self.generation, period_ms = self.period.as_millis() as u64, "poller started");
        Some(PollStart {
            generation: self.generation,
            period: self.period,
            initial,
        })
    }

    pub fn stop(&mut self) {
        if self.running {
            info!(generation = self.generation, "poller stopped");
        }
        self.running = false;
        self.generation += 1;
        self.invalidate();
    }

    /// Ticks from a superseded timer, or any tick after `stop`, yield nothing.
    pub fn tick(&mut self, generation: u64) -> Option<FetchTicket> {
        if !self.running || generation != self.generation {
            debug!(generation, current = self.generation, "stale poll tick ignored");
            return None;
        }
        Some(self.issue(RefreshTrigger::Timer))
    }

    /// Manual refresh. Independent of the timer and allowed while stopped.
    pub fn trigger(&mut self) -> FetchTicket {
        self.issue(RefreshTrigger::Manual)
    }

    /// Every result issued so far becomes stale. The timer keeps running.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        self.in_flight.clear();
    }

    fn issue(&mut self, trigger: RefreshTrigger) -> FetchTicket {
        self.issued += 1;
        self.in_flight.insert(self.issued);
        FetchTicket {
            epoch: self.epoch,
            request: self.issued,
            trigger,
        }
    }

    /// Applies a fetch result. Current-epoch results replace the collection
    /// wholesale in whatever order they resolve; a failure keeps the previous
    /// items and stats and records the error.
    pub fn resolve(
        &mut self,
        ticket: FetchTicket,
        result: Result<FeedSnapshot, GatewayError>,
        items: &mut ItemCollection,
        stats: &mut Stats,
    ) -> RefreshOutcome {
        self.in_flight.remove(&ticket.request);

        if ticket.epoch != self.epoch {
            debug!(
                request = ticket.request,
                epoch = ticket.epoch,
                current = self.epoch,
                "stale refresh discarded"
            );
            return RefreshOutcome::Discarded;
        }

        match result {
            Ok(snapshot) => {
                let oldest = self.in_flight.first().copied();
                let held_back = items.apply_snapshot(snapshot.items, ticket.request, oldest);
                *stats = snapshot.stats;
                for item in &held_back {
                    stats.decrement(Some(item.kind));
                }
                self.last_applied = Some(ticket.request);
                self.last_error = None;
                info!(
                    request = ticket.request,
                    trigger = ?ticket.trigger,
                    items = items.len(),
                    "refresh applied"
                );
                RefreshOutcome::Applied {
                    items: items.len(),
                    held_back: held_back.len(),
                }
            }
            Err(err) => {
                warn!(request = ticket.request, trigger = ?ticket.trigger, %err, "refresh failed");
                self.last_error = Some(err.clone());
                RefreshOutcome::Failed(err)
            }
        }
    }

    /// Sequence number the next issued fetch will carry.
    pub fn next_request_seq(&self) -> u64 {
        self.issued + 1
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_refreshing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn fetches_issued(&self) -> u64 {
        self.issued
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    pub fn last_error(&self) -> Option<&GatewayError> {
        self.last_error.as_ref()
    }
}
