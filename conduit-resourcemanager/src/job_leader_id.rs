//! JobLeaderIdService ( `register_job_manager`: "authenticates
//! via the job's leader id (consulted through JobLeaderIdService); rejects
//! if mismatch"). Tracks which `FencingToken` currently owns each job's
//! JobMaster leadership, populated by discovery callbacks from
//! `conduit-coordination::election` and consulted synchronously by the RM
//! when a JobMaster registers.

use conduit_core::ids::{FencingToken, JobId};
use dashmap::DashMap;

#[derive(Default)]
pub struct JobLeaderIdService {
    leaders: DashMap<JobId, FencingToken>,
}

impl JobLeaderIdService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_leader_granted(&self, job_id: JobId, token: FencingToken) {
        self.leaders.insert(job_id, token);
    }

    pub fn notify_leader_lost(&self, job_id: &JobId) {
        self.leaders.remove(job_id);
    }

    /// the RM rejects a `register_job_manager` call whose
    /// claimed token doesn't match the currently known leader for that
    /// job. Unknown jobs are rejected too — the RM only trusts leaders it
    /// has itself observed via discovery.
    pub fn matches(&self, job_id: &JobId, claimed_token: FencingToken) -> bool {
        self.leaders.get(job_id).map(|t| *t == claimed_token).unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_unknown_job() {
        let service = JobLeaderIdService::new();
        assert!(!service.matches(&JobId::new("job-1"), FencingToken::new()));
    }

    #[test]
    fn accepts_matching_token_rejects_stale() {
        let service = JobLeaderIdService::new();
        let token = FencingToken::new();
        service.notify_leader_granted(JobId::new("job-1"), token);
        assert!(service.matches(&JobId::new("job-1"), token));
        assert!(!service.matches(&JobId::new("job-1"), FencingToken::new()));
    }

    #[test]
    fn loses_leadership_clears_entry() {
        let service = JobLeaderIdService::new();
        let token = FencingToken::new();
        service.notify_leader_granted(JobId::new("job-1"), token);
        service.notify_leader_lost(&JobId::new("job-1"));
        assert!(!service.matches(&JobId::new("job-1"), token));
    }
}
