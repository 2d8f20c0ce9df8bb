//! Supervision: what a parent does when a child fails.
//!
//! A failing actor suspends its mailbox and sends a [`Failure`] to its
//! parent. The parent picks a [`SupervisorStrategy`] (the actor's own, the
//! one from its props, or the system default) and applies it through the
//! [`Supervisor`] trait, which both actor contexts and guardians implement.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{ActorError, Pid};

/// Decision taken for a failed child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorDirective {
    /// Keep the current instance and resume its mailbox.
    Resume,
    /// Replace the instance with a fresh incarnation.
    Restart,
    /// Stop the child.
    Stop,
    /// Fail the supervisor itself and let its own parent decide.
    Escalate,
}

/// Custom decision function for [`SupervisorStrategy::Decide`].
pub type Decider = Arc<dyn Fn(&Pid, &ActorError) -> SupervisorDirective + Send + Sync>;

/// Failure-handling policy.
#[derive(Clone, Default)]
pub enum SupervisorStrategy {
    /// Restart on every failure.
    #[default]
    AlwaysRestart,
    /// Restart up to `max_retries` failures within `within` (all time when
    /// `None`), then stop.
    Restart {
        /// Failures tolerated inside the window.
        max_retries: u32,
        /// Sliding window for counting failures.
        within: Option<Duration>,
    },
    /// Stop immediately.
    Stop,
    /// Resume with the same instance.
    Resume,
    /// Escalate to the supervisor's own parent.
    Escalate,
    /// Ask `decider`; restarts it orders are limited like [`Self::Restart`].
    Decide {
        /// Directive selection.
        decider: Decider,
        /// Failures tolerated inside the window.
        max_retries: u32,
        /// Sliding window for counting failures.
        within: Option<Duration>,
    },
}

impl fmt::Debug for SupervisorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorStrategy::AlwaysRestart => write!(f, "AlwaysRestart"),
            SupervisorStrategy::Restart {
                max_retries,
                within,
            } => f
                .debug_struct("Restart")
                .field("max_retries", max_retries)
                .field("within", within)
                .finish(),
            SupervisorStrategy::Stop => write!(f, "Stop"),
            SupervisorStrategy::Resume => write!(f, "Resume"),
            SupervisorStrategy::Escalate => write!(f, "Escalate"),
            SupervisorStrategy::Decide {
                max_retries,
                within,
                ..
            } => f
                .debug_struct("Decide")
                .field("max_retries", max_retries)
                .field("within", within)
                .finish_non_exhaustive(),
        }
    }
}

impl SupervisorStrategy {
    /// Build a [`SupervisorStrategy::Decide`] policy.
    pub fn decide<F>(max_retries: u32, within: Option<Duration>, decider: F) -> Self
    where
        F: Fn(&Pid, &ActorError) -> SupervisorDirective + Send + Sync + 'static,
    {
        SupervisorStrategy::Decide {
            decider: Arc::new(decider),
            max_retries,
            within,
        }
    }

    /// The directive this policy picks for `failure`, before retry limits.
    pub fn directive(&self, failure: &Failure) -> SupervisorDirective {
        match self {
            SupervisorStrategy::AlwaysRestart | SupervisorStrategy::Restart { .. } => {
                SupervisorDirective::Restart
            }
            SupervisorStrategy::Stop => SupervisorDirective::Stop,
            SupervisorStrategy::Resume => SupervisorDirective::Resume,
            SupervisorStrategy::Escalate => SupervisorDirective::Escalate,
            SupervisorStrategy::Decide { decider, .. } => decider(failure.who(), failure.reason()),
        }
    }

    /// Apply the policy to `failure` through `supervisor`.
    pub fn handle_failure(&self, supervisor: &mut dyn Supervisor, failure: &Failure) {
        let who = failure.who().clone();
        match self.directive(failure) {
            SupervisorDirective::Resume => {
                tracing::debug!(child = %who, "resuming failed child");
                supervisor.resume_children(&[who]);
            }
            SupervisorDirective::Restart => {
                if self.retries_exhausted(failure.statistics()) {
                    tracing::warn!(child = %who, reason = %failure.reason(), "restart limit reached, stopping child");
                    supervisor.stop_children(&[who]);
                } else {
                    tracing::debug!(child = %who, reason = %failure.reason(), "restarting failed child");
                    supervisor.restart_children(failure.shared_reason(), &[who]);
                }
            }
            SupervisorDirective::Stop => {
                tracing::debug!(child = %who, reason = %failure.reason(), "stopping failed child");
                supervisor.stop_children(&[who]);
            }
            SupervisorDirective::Escalate => {
                supervisor.escalate_failure(failure.shared_reason());
            }
        }
    }

    /// Record the failure for limited policies and tell whether the child
    /// is past its limit. The history is cleared once the limit is hit.
    fn retries_exhausted(&self, statistics: &RestartStatistics) -> bool {
        match self {
            SupervisorStrategy::Restart {
                max_retries,
                within,
            }
            | SupervisorStrategy::Decide {
                max_retries,
                within,
                ..
            } => {
                statistics.fail(*within);
                if statistics.number_of_failures(*within) > *max_retries as usize {
                    statistics.reset();
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

/// Rolling failure history of one actor. Survives restarts.
///
/// Clones share the same history: the failing actor owns it and its
/// supervisor records into it. Only policies with a retry limit record, and
/// they drop entries older than their window, so the history never holds
/// more than `max_retries + 1` entries.
#[derive(Debug, Clone, Default)]
pub struct RestartStatistics {
    failure_times: Arc<Mutex<VecDeque<Instant>>>,
}

impl RestartStatistics {
    /// Record a failure now, dropping entries older than `within`.
    pub fn fail(&self, within: Option<Duration>) {
        let now = Instant::now();
        let mut failure_times = self.failure_times.lock();
        if let Some(window) = within {
            while failure_times
                .front()
                .is_some_and(|at| now.duration_since(*at) > window)
            {
                failure_times.pop_front();
            }
        }
        failure_times.push_back(now);
    }

    /// Forget all recorded failures.
    pub fn reset(&self) {
        self.failure_times.lock().clear();
    }

    /// Failures recorded within `within` of now, or all of them for `None`.
    pub fn number_of_failures(&self, within: Option<Duration>) -> usize {
        let failure_times = self.failure_times.lock();
        match within {
            None => failure_times.len(),
            Some(window) => {
                let now = Instant::now();
                failure_times
                    .iter()
                    .filter(|at| now.duration_since(**at) <= window)
                    .count()
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.failure_times.lock().len()
    }
}

/// Failure record sent from a failing actor to its supervisor.
#[derive(Debug, Clone)]
pub struct Failure {
    who: Pid,
    reason: Arc<ActorError>,
    statistics: RestartStatistics,
}

impl Failure {
    /// Build a failure record.
    pub fn new(who: Pid, reason: Arc<ActorError>, statistics: RestartStatistics) -> Self {
        Self {
            who,
            reason,
            statistics,
        }
    }

    /// The failing actor.
    pub fn who(&self) -> &Pid {
        &self.who
    }

    /// The error raised by its handler.
    pub fn reason(&self) -> &ActorError {
        &self.reason
    }

    /// The failure history including this failure.
    pub fn statistics(&self) -> &RestartStatistics {
        &self.statistics
    }

    fn shared_reason(&self) -> Arc<ActorError> {
        Arc::clone(&self.reason)
    }
}

/// Something that can carry out supervision directives.
pub trait Supervisor {
    /// Children currently supervised.
    fn children(&self) -> Vec<Pid>;

    /// Order the given children to restart.
    fn restart_children(&mut self, reason: Arc<ActorError>, children: &[Pid]);

    /// Order the given children to stop.
    fn stop_children(&mut self, children: &[Pid]);

    /// Resume the mailboxes of the given children.
    fn resume_children(&mut self, children: &[Pid]);

    /// Fail the supervisor itself.
    fn escalate_failure(&mut self, reason: Arc<ActorError>);
}
