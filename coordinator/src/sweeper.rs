//! Periodic eviction of dead relays and reassignment of their projects.
use crate::coordinator::Coordinator;
use crate::errors::CoordinatorError;
use crate::metrics_defs::{
    PROJECTS_REASSIGNED, PROJECTS_UNASSIGNED, RELAYS_EVICTED, SWEEP_DURATION,
};
use crate::selection::{Reassignment, decode_record, plan_reassignment};
use chrono::Utc;
use shared::{counter, histogram};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default, PartialEq)]
pub struct SweepSummary {
    pub relays_evicted: usize,
    pub projects_reassigned: usize,
    pub projects_unassigned: usize,
    /// Relays whose projects could not all be moved. Their records stay for the next sweep.
    pub relays_retained: usize,
}

#[derive(Debug, Default, PartialEq)]
struct ReassignOutcome {
    reassigned: usize,
    unassigned: usize,
    failed: usize,
}

impl Coordinator {
    /// Runs a sweep every `SWEEP_INTERVAL`, the first one a full interval after
    /// start. A sweep in progress when `cancel` fires runs to completion.
    pub fn start_cleanup_routine(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + SWEEP_INTERVAL;
            let mut ticker = tokio::time::interval_at(start, SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(interval_secs = SWEEP_INTERVAL.as_secs(), "cleanup routine started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match coordinator.cleanup_dead_relays().await {
                    Ok(summary) if summary == SweepSummary::default() => {
                        tracing::debug!("sweep found no dead relays");
                    }
                    Ok(summary) => tracing::info!(?summary, "sweep completed"),
                    Err(e) => tracing::error!(error = %e, "sweep failed"),
                }
            }

            tracing::info!("cleanup routine stopped");
        })
    }

    /// Evicts every stale or undecodable registry record after moving the
    /// projects bound to it.
    pub async fn cleanup_dead_relays(&self) -> Result<SweepSummary, CoordinatorError> {
        let started = Instant::now();

        let registry = self.observe(self.store().get_all(self.registry_key()).await)?;

        let now = Utc::now();
        let mut dead: Vec<&String> = Vec::new();
        for (relay_id, raw) in &registry {
            match decode_record(raw) {
                Ok(record) if record.is_live(now) => continue,
                Ok(record) => tracing::info!(
                    relay_id,
                    last_heartbeat = %record.last_heartbeat,
                    "relay heartbeat expired"
                ),
                Err(e) => tracing::warn!(relay_id, error = %e, "relay record is malformed"),
            }
            dead.push(relay_id);
        }
        dead.sort();

        let mut summary = SweepSummary::default();
        for relay_id in dead {
            let outcome = match self.reassign_relay(relay_id).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(relay_id, error = %e, "could not reassign projects of dead relay");
                    summary.relays_retained += 1;
                    continue;
                }
            };
            summary.projects_reassigned += outcome.reassigned;
            summary.projects_unassigned += outcome.unassigned;

            if outcome.failed > 0 {
                tracing::warn!(relay_id, failed = outcome.failed, "keeping dead relay until its projects are moved");
                summary.relays_retained += 1;
                continue;
            }

            if let Err(e) = self.store().delete_field(self.registry_key(), relay_id).await {
                tracing::error!(relay_id, error = %e, "could not evict dead relay");
                summary.relays_retained += 1;
                continue;
            }

            counter!(RELAYS_EVICTED).increment(1);
            summary.relays_evicted += 1;
            tracing::info!(relay_id, "evicted dead relay");
        }

        histogram!(SWEEP_DURATION).record(started.elapsed().as_secs_f64());
        Ok(summary)
    }

    /// Moves every project bound to `dead_relay_id` to a live relay, or drops
    /// its binding when none is left. Each project is handled on its own.
    async fn reassign_relay(&self, dead_relay_id: &str) -> Result<ReassignOutcome, CoordinatorError> {
        let assignments = self.store().get_all(self.assignment_key()).await?;
        let registry = self.store().get_all(self.registry_key()).await?;

        let plan = plan_reassignment(&registry, &assignments, dead_relay_id, Utc::now());
        let mut outcome = ReassignOutcome::default();

        for (project, action) in plan {
            let binding = match action {
                Reassignment::Rebind(binding) => binding,
                Reassignment::Unassign => {
                    self.drop_binding(&project, dead_relay_id, &mut outcome).await;
                    continue;
                }
            };

            match self.bind_project(&project, &binding).await {
                Ok(()) => {
                    counter!(PROJECTS_REASSIGNED).increment(1);
                    outcome.reassigned += 1;
                    tracing::info!(
                        project,
                        from = dead_relay_id,
                        to = %binding.relay_id,
                        "reassigned project"
                    );
                }
                Err(e) => {
                    tracing::warn!(project, relay_id = %binding.relay_id, error = %e, "could not rebind project");
                    self.drop_binding(&project, dead_relay_id, &mut outcome).await;
                }
            }
        }

        Ok(outcome)
    }

    async fn drop_binding(&self, project: &str, dead_relay_id: &str, outcome: &mut ReassignOutcome) {
        match self.unbind_project(project).await {
            Ok(()) => {
                counter!(PROJECTS_UNASSIGNED).increment(1);
                outcome.unassigned += 1;
                tracing::warn!(project, from = dead_relay_id, "no live relay, project unassigned");
            }
            Err(e) => {
                outcome.failed += 1;
                tracing::error!(project, error = %e, "could not unassign project");
            }
        }
    }
}
