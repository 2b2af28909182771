//! Best-cluster selection for federated submission (§4.6, scenario S6).
//! Grounded on `original_source/src/sbatch/mult_cluster.c`'s
//! `_sort_local_cluster`: sort candidates by `start_time`, then
//! `preempt_cnt`, then prefer the local cluster name on a final tie.

#[derive(Debug, Clone)]
pub struct ClusterCandidate {
    pub cluster_name: String,
    pub start_time: i64,
    pub preempt_count: u32,
}

/// Picks the best `WillRun` candidate. `None` if `candidates` is empty.
pub fn select_best_cluster<'a>(
    candidates: &'a [ClusterCandidate],
    local_cluster_name: &str,
) -> Option<&'a ClusterCandidate> {
    candidates.iter().min_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.preempt_count.cmp(&b.preempt_count))
            .then_with(|| {
                let a_local = a.cluster_name == local_cluster_name;
                let b_local = b.cluster_name == local_cluster_name;
                b_local.cmp(&a_local)
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, start_time: i64, preempt_count: u32) -> ClusterCandidate {
        ClusterCandidate { cluster_name: name.to_string(), start_time, preempt_count }
    }

    #[test]
    fn picks_smallest_start_time() {
        let candidates = vec![candidate("a", 200, 0), candidate("b", 100, 0)];
        assert_eq!(select_best_cluster(&candidates, "a").unwrap().cluster_name, "b");
    }

    #[test]
    fn ties_on_start_time_break_on_preempt_count() {
        let candidates = vec![candidate("a", 100, 5), candidate("b", 100, 1)];
        assert_eq!(select_best_cluster(&candidates, "a").unwrap().cluster_name, "b");
    }

    #[test]
    fn final_tie_prefers_local_cluster() {
        let candidates = vec![candidate("remote", 100, 0), candidate("local", 100, 0)];
        assert_eq!(select_best_cluster(&candidates, "local").unwrap().cluster_name, "local");
    }

    #[test]
    fn empty_candidates_yields_none() {
        assert!(select_best_cluster(&[], "local").is_none());
    }
}
