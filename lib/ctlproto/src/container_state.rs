//! Job-state container fallback (§4.6, scenario S5): when a caller can't
//! reach a live container's anchor directly, it infers state from the
//! job/step query instead.

use slog::{warn, Logger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContainerState {
    Unknown = 0,
    Creating = 1,
    Created = 2,
    Starting = 3,
    Running = 4,
    Stopping = 5,
    Stopped = 6,
}

impl ContainerState {
    /// Monotonic-forward transition: a forced move (failure, external
    /// signal) may skip intermediate states but never goes backward.
    pub fn advance_to(self, target: ContainerState) -> ContainerState {
        if target >= self {
            target
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Suspended,
    Terminal,
}

/// One `container_id == id` match from the controller's step query.
#[derive(Debug, Clone)]
pub struct StepMatch {
    pub job_state: JobState,
    pub has_steps: bool,
}

fn infer_from_match(m: &StepMatch) -> ContainerState {
    match m.job_state {
        JobState::Pending => ContainerState::Creating,
        JobState::Running | JobState::Suspended => {
            if m.has_steps {
                ContainerState::Running
            } else {
                ContainerState::Created
            }
        }
        JobState::Terminal => ContainerState::Stopped,
    }
}

/// Applies the three-way fallback rule (§4.6): no match is `Stopped`,
/// exactly one match drives the inference, multiple matches log a
/// warning and treat the first as authoritative.
pub fn resolve_container_state(matches: &[StepMatch], logger: &Logger) -> ContainerState {
    match matches.len() {
        0 => ContainerState::Stopped,
        1 => infer_from_match(&matches[0]),
        _ => {
            warn!(logger, "multiple step matches for container id, using the first"; "count" => matches.len());
            infer_from_match(&matches[0])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slurm_common::logging;

    #[test]
    fn no_match_is_stopped() {
        assert_eq!(resolve_container_state(&[], &logging::discard()), ContainerState::Stopped);
    }

    #[test]
    fn pending_job_is_creating() {
        let m = [StepMatch { job_state: JobState::Pending, has_steps: false }];
        assert_eq!(resolve_container_state(&m, &logging::discard()), ContainerState::Creating);
    }

    #[test]
    fn running_job_without_steps_is_created() {
        let m = [StepMatch { job_state: JobState::Running, has_steps: false }];
        assert_eq!(resolve_container_state(&m, &logging::discard()), ContainerState::Created);
    }

    #[test]
    fn running_job_with_steps_is_running() {
        let m = [StepMatch { job_state: JobState::Running, has_steps: true }];
        assert_eq!(resolve_container_state(&m, &logging::discard()), ContainerState::Running);
    }

    #[test]
    fn terminal_job_is_stopped() {
        let m = [StepMatch { job_state: JobState::Terminal, has_steps: true }];
        assert_eq!(resolve_container_state(&m, &logging::discard()), ContainerState::Stopped);
    }

    #[test]
    fn multiple_matches_use_the_first() {
        let m = [
            StepMatch { job_state: JobState::Running, has_steps: true },
            StepMatch { job_state: JobState::Terminal, has_steps: false },
        ];
        assert_eq!(resolve_container_state(&m, &logging::discard()), ContainerState::Running);
    }

    #[test]
    fn advance_never_regresses() {
        let state = ContainerState::Running;
        assert_eq!(state.advance_to(ContainerState::Creating), ContainerState::Running);
        assert_eq!(state.advance_to(ContainerState::Stopped), ContainerState::Stopped);
    }
}
