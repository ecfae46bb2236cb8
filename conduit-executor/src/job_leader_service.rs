//! JobLeaderService ("multiplex a JobLeaderService that watches
//! per-job leader changes"). Tracks, per job, the currently known
//! JobMaster address + fencing token, and whether this executor has an
//! active registration with it; buffers slot offers for jobs whose leader
//! isn't known yet ("if that job's leader is known, offers the
//! slot to it immediately, otherwise buffers").

use conduit_core::ids::{FencingToken, JobId, SlotId};
use dashmap::DashMap;

#[derive(Clone, Debug)]
pub struct JobLeader {
    pub address: String,
    pub token: FencingToken,
}

#[derive(Default)]
pub struct JobLeaderService {
    leaders: DashMap<JobId, JobLeader>,
    /// Slots allocated for a job before its leader became known.
    pending_offers: DashMap<JobId, Vec<SlotId>>,
}

impl JobLeaderService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_watching(&self, job_id: &JobId) -> bool {
        self.leaders.contains_key(job_id) || self.pending_offers.contains_key(job_id)
    }

    /// Starts watching a job; subsequent `notify_leader_changed` calls
    /// update its known leader.
    pub fn start_watching(&self, job_id: JobId) {
        self.pending_offers.entry(job_id).or_default();
    }

    pub fn stop_watching(&self, job_id: &JobId) {
        self.leaders.remove(job_id);
        self.pending_offers.remove(job_id);
    }

    pub fn notify_leader_changed(&self, job_id: JobId, leader: Option<JobLeader>) {
        match leader {
            Some(l) => {
                self.leaders.insert(job_id, l);
            }
            None => {
                self.leaders.remove(&job_id);
            }
        }
    }

    pub fn current_leader(&self, job_id: &JobId) -> Option<JobLeader> {
        self.leaders.get(job_id).map(|l| l.clone())
    }

    /// /4.3: offers immediately if the leader is known, else
    /// buffers the slot id to offer once `drain_pending_offers` is called
    /// after a leader becomes known.
    pub fn offer_or_buffer(&self, job_id: &JobId, slot_id: SlotId) -> Option<JobLeader> {
        if let Some(leader) = self.current_leader(job_id) {
            Some(leader)
        } else {
            self.pending_offers.entry(job_id.clone()).or_default().push(slot_id);
            None
        }
    }

    pub fn drain_pending_offers(&self, job_id: &JobId) -> Vec<SlotId> {
        self.pending_offers
            .get_mut(job_id)
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use conduit_core::ids::ResourceId;

    #[test]
    fn buffers_offer_until_leader_known() {
        let service = JobLeaderService::new();
        service.start_watching(JobId::new("job-1"));

        let slot = SlotId::new(ResourceId::new("exec-1"), 0);
        assert!(service.offer_or_buffer(&JobId::new("job-1"), slot.clone()).is_none());
        assert_eq!(service.drain_pending_offers(&JobId::new("job-1")), vec![slot.clone()]);

        service.notify_leader_changed(
            JobId::new("job-1"),
            Some(JobLeader {
                address: "10.0.0.2:9001".into(),
                token: FencingToken::new(),
            }),
        );
        assert!(service.offer_or_buffer(&JobId::new("job-1"), slot).is_some());
    }
}
