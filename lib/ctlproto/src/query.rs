//! The info-query family (§4.6): `last_update`-gated handlers that either
//! return a freshly encoded response or `ResponseRc { rc: SLURM_NO_CHANGE_IN_DATA }`.

use crate::flags::QueryFlags;
use slurm_common::error::Result;

pub enum QueryOutcome {
    Changed(Vec<u8>),
    NoChange,
}

/// Compares the caller's `last_update` against the object's current
/// modification time and only runs `encode` when something changed.
pub fn gate(last_update: u64, current_mtime: u64, encode: impl FnOnce() -> Vec<u8>) -> QueryOutcome {
    if current_mtime <= last_update {
        QueryOutcome::NoChange
    } else {
        QueryOutcome::Changed(encode())
    }
}

pub trait QueryHandler: Send + Sync {
    fn rpc_type(&self) -> u32;
    fn handle(&self, last_update: u64, flags: QueryFlags) -> Result<QueryOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_skips_encode_when_unchanged() {
        let mut called = false;
        let outcome = gate(100, 100, || {
            called = true;
            vec![]
        });
        assert!(matches!(outcome, QueryOutcome::NoChange));
        assert!(!called);
    }

    #[test]
    fn gate_encodes_when_changed() {
        let outcome = gate(100, 101, || vec![1, 2, 3]);
        assert!(matches!(outcome, QueryOutcome::Changed(ref b) if b == &vec![1, 2, 3]));
    }
}
