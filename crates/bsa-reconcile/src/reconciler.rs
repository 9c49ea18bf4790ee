//! The reconciliation cycle and its driving loop

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use bsa_core::{
    CoreConfig, Disposition, Proposal, ProposalOutcome, StateData, StateSnapshot, VersionId,
};
use bsa_patch::PatchEngine;
use bsa_store::{ProposalQueue, VersionStore};

use crate::ProvisionalOverlay;

/// Phases of the reconciliation cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Draining,
    Applying,
    Committing,
}

/// Summary of one reconciliation cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: usize,
    pub applied: u32,
    pub applied_provisional: u32,
    pub rejected: u32,
    pub superseded: u32,
    pub committed: Option<VersionId>,
}

/// Operator-facing health signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Degraded { consecutive_failures: u32 },
}

/// Advisory state view: committed head with provisional writes overlaid
#[derive(Clone, Debug, PartialEq)]
pub struct WorkingView {
    pub snapshot: StateSnapshot,
    /// Keys whose values are speculative; non-empty marks the view non-final
    pub provisional_keys: Vec<String>,
}

/// Result of applying the final proposals of a batch in order
struct FinalPass {
    data: StateData,
    outcomes: Vec<ProposalOutcome>,
    applied: u32,
}

/// The reconciler: sole writer to the version store
pub struct Reconciler {
    queue: Arc<ProposalQueue>,
    store: Arc<VersionStore>,
    engine: PatchEngine,
    config: CoreConfig,
    phase: Mutex<CyclePhase>,
    overlay: Mutex<ProvisionalOverlay>,
    outcomes: Mutex<VecDeque<ProposalOutcome>>,
    commit_failures: AtomicU32,
}

impl Reconciler {
    pub fn new(queue: Arc<ProposalQueue>, store: Arc<VersionStore>, config: CoreConfig) -> Self {
        Reconciler::with_engine(queue, store, PatchEngine::new(), config)
    }

    pub fn with_engine(
        queue: Arc<ProposalQueue>,
        store: Arc<VersionStore>,
        engine: PatchEngine,
        config: CoreConfig,
    ) -> Self {
        Reconciler {
            queue,
            store,
            engine,
            config,
            phase: Mutex::new(CyclePhase::Idle),
            overlay: Mutex::new(ProvisionalOverlay::new()),
            outcomes: Mutex::new(VecDeque::new()),
            commit_failures: AtomicU32::new(0),
        }
    }

    /// Current cycle phase
    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock()
    }

    pub fn health(&self) -> HealthStatus {
        let failures = self.commit_failures.load(Ordering::Relaxed);
        if failures >= self.config.degraded_after {
            HealthStatus::Degraded {
                consecutive_failures: failures,
            }
        } else {
            HealthStatus::Ok
        }
    }

    /// Committed head plus the provisional overlay
    pub fn working_view(&self) -> WorkingView {
        let head = self.store.head();
        let overlay = self.overlay.lock();
        WorkingView {
            snapshot: StateSnapshot {
                data: overlay.apply_onto(&head.data),
                version: head.version,
            },
            provisional_keys: overlay.keys(),
        }
    }

    /// Recently archived proposal outcomes, oldest first
    pub fn recent_outcomes(&self) -> Vec<ProposalOutcome> {
        self.outcomes.lock().iter().cloned().collect()
    }

    /// Latest archived outcome for an intent
    pub fn outcome_for(&self, intent_id: &str) -> Option<ProposalOutcome> {
        self.outcomes
            .lock()
            .iter()
            .rev()
            .find(|o| o.intent_id == intent_id)
            .cloned()
    }

    /// Run one reconciliation cycle to completion
    ///
    /// Synchronous on purpose: the async loop never cancels a cycle
    /// mid-flight, and tests can drive cycles without a runtime.
    pub fn run_cycle(&self) -> CycleReport {
        self.set_phase(CyclePhase::Draining);
        let batch = self.queue.drain();
        if batch.is_empty() {
            self.set_phase(CyclePhase::Idle);
            return CycleReport::default();
        }

        tracing::debug!(proposals = batch.len(), "reconciling");
        let drained = batch.len();
        let (provisionals, finals): (Vec<Proposal>, Vec<Proposal>) =
            batch.into_iter().partition(|p| p.provisional);

        self.set_phase(CyclePhase::Applying);
        let head = self.store.head();
        let pass = self.apply_finals(&head, &finals);

        let mut outcomes: Vec<ProposalOutcome> = Vec::new();
        let mut committed: Option<VersionId> = None;
        let mut touched: HashSet<String> = HashSet::new();
        let mut gave_up = false;

        if pass.applied == 0 {
            outcomes.extend(pass.outcomes);
        } else {
            self.set_phase(CyclePhase::Committing);
            touched = diff_keys(&head.data, &pass.data);
            match self.store.commit(head.version, pass.data) {
                Ok(version) => {
                    committed = Some(version);
                    outcomes.extend(tag_applied(pass.outcomes, version));
                }
                Err(err) => {
                    tracing::warn!(%err, "commit refused; retrying once against new head");
                    self.set_phase(CyclePhase::Applying);
                    let head = self.store.head();
                    let retry = self.apply_finals(&head, &finals);
                    if retry.applied == 0 {
                        touched.clear();
                        outcomes.extend(retry.outcomes);
                    } else {
                        self.set_phase(CyclePhase::Committing);
                        touched = diff_keys(&head.data, &retry.data);
                        match self.store.commit(head.version, retry.data) {
                            Ok(version) => {
                                committed = Some(version);
                                outcomes.extend(tag_applied(retry.outcomes, version));
                            }
                            Err(err) => {
                                tracing::warn!(%err, "commit failed twice; giving up this cycle");
                                gave_up = true;
                            }
                        }
                    }
                }
            }
        }

        if gave_up {
            let failures = self.commit_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if failures >= self.config.degraded_after {
                tracing::error!(
                    consecutive_failures = failures,
                    "reconciler degraded: commits repeatedly failing"
                );
            }
            outcomes.clear();
            for proposal in finals.iter().chain(provisionals.iter()) {
                outcomes.push(ProposalOutcome::rejected(
                    &proposal.intent_id,
                    "cycle abandoned: commit contention; resubmit",
                ));
            }
        } else {
            if committed.is_some() {
                self.commit_failures.store(0, Ordering::Relaxed);
            }
            self.apply_provisionals(&provisionals, committed, &touched, &mut outcomes);
        }

        let mut report = CycleReport {
            drained,
            committed,
            ..CycleReport::default()
        };
        for outcome in &outcomes {
            match outcome.disposition {
                Disposition::Applied => report.applied += 1,
                Disposition::AppliedProvisional => report.applied_provisional += 1,
                Disposition::Rejected { .. } => report.rejected += 1,
                Disposition::Superseded => report.superseded += 1,
            }
        }
        self.archive(outcomes);
        self.set_phase(CyclePhase::Idle);
        report
    }

    /// Drive cycles on the configured interval until shutdown is signalled
    ///
    /// Shutdown is only observed between cycles; an in-flight cycle always
    /// completes, so drained proposals are never lost to cancellation.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately; consume it
        // so the first cycle lands one full interval after startup.
        ticker.tick().await;

        tracing::info!(
            interval = ?self.config.reconcile_interval,
            "reconciliation loop started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle();
                    if report.drained > 0 {
                        tracing::debug!(
                            drained = report.drained,
                            applied = report.applied,
                            applied_provisional = report.applied_provisional,
                            rejected = report.rejected,
                            superseded = report.superseded,
                            committed = ?report.committed,
                            "cycle complete"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("reconciliation loop stopped");
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock() = phase;
    }

    /// Apply final proposals in arrival order against a head snapshot
    ///
    /// Best-effort batch: each proposal sees the head plus every earlier
    /// successful apply of this pass; a conflict rejects that proposal only.
    fn apply_finals(&self, head: &StateSnapshot, finals: &[Proposal]) -> FinalPass {
        let mut current = StateSnapshot {
            data: head.data.clone(),
            version: head.version,
        };
        let mut outcomes = Vec::new();
        let mut applied = 0u32;

        for proposal in finals {
            match self.engine.apply(&current, &proposal.delta_patch) {
                Ok(next) => {
                    current = next;
                    applied += 1;
                    outcomes.push(ProposalOutcome::new(
                        &proposal.intent_id,
                        Disposition::Applied,
                    ));
                }
                Err(err) => {
                    tracing::debug!(
                        intent_id = %proposal.intent_id,
                        %err,
                        "proposal rejected"
                    );
                    outcomes.push(ProposalOutcome::rejected(&proposal.intent_id, err.to_string()));
                }
            }
        }

        FinalPass {
            data: current.data,
            outcomes,
            applied,
        }
    }

    /// Fold provisional proposals into the overlay
    ///
    /// Runs after the commit so committed writes supersede older overlay
    /// entries before this batch's speculative writes land on top.
    fn apply_provisionals(
        &self,
        provisionals: &[Proposal],
        committed: Option<VersionId>,
        touched: &HashSet<String>,
        outcomes: &mut Vec<ProposalOutcome>,
    ) {
        let base = self.store.head();
        let mut overlay = self.overlay.lock();

        if committed.is_some() {
            for intent in overlay.evict_touched(touched) {
                outcomes.push(ProposalOutcome {
                    intent_id: intent,
                    disposition: Disposition::Superseded,
                    version: committed,
                });
            }
        }

        let mut working = overlay.apply_onto(&base.data);
        for proposal in provisionals {
            let view = StateSnapshot::pending(working.clone());
            match self.engine.apply(&view, &proposal.delta_patch) {
                Ok(next) => {
                    overlay.record(&proposal.intent_id, &working, &next.data);
                    working = next.data;
                    outcomes.push(ProposalOutcome::new(
                        &proposal.intent_id,
                        Disposition::AppliedProvisional,
                    ));
                }
                Err(err) => {
                    tracing::debug!(
                        intent_id = %proposal.intent_id,
                        %err,
                        "provisional proposal rejected"
                    );
                    outcomes.push(ProposalOutcome::rejected(&proposal.intent_id, err.to_string()));
                }
            }
        }
    }

    fn archive(&self, outcomes: Vec<ProposalOutcome>) {
        let mut archive = self.outcomes.lock();
        for outcome in outcomes {
            while archive.len() >= self.config.outcome_window.max(1) {
                archive.pop_front();
            }
            archive.push_back(outcome);
        }
    }
}

fn tag_applied(outcomes: Vec<ProposalOutcome>, version: VersionId) -> Vec<ProposalOutcome> {
    outcomes
        .into_iter()
        .map(|o| match o.disposition {
            Disposition::Applied => o.at_version(version),
            _ => o,
        })
        .collect()
}

/// Keys whose values differ between two documents
fn diff_keys(before: &StateData, after: &StateData) -> HashSet<String> {
    let mut touched = HashSet::new();
    for (key, value) in after {
        if before.get(key) != Some(value) {
            touched.insert(key.clone());
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            touched.insert(key.clone());
        }
    }
    touched
}
