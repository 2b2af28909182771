//! State-changing RPC authorization (§4.6): caller uid must match the
//! job's owner or a configured administrator.

use crate::dispatch::DispatchTable;
use slurm_wire::ResponseRc;
use slurm_common::error::{Error, Result};
use slurm_common::Uid;
use std::collections::HashSet;

pub trait StateChangeHandler: Send + Sync {
    fn rpc_type(&self) -> u32;
    fn job_owner_uid(&self, body: &[u8]) -> Result<Uid>;
    fn apply(&self, caller_uid: Uid, body: &[u8]) -> Result<ResponseRc>;
}

pub fn authorize(caller_uid: Uid, job_owner_uid: Uid, admin_uids: &HashSet<Uid>) -> Result<()> {
    if caller_uid == job_owner_uid || admin_uids.contains(&caller_uid) {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "uid {caller_uid} may not modify job owned by {job_owner_uid}"
        )))
    }
}

/// Looks up the handler, checks ownership/admin authorization, then runs
/// it. Retry is the caller's responsibility (`retry::retry_state_change`).
pub fn dispatch_state_change(
    table: &DispatchTable,
    rpc_type: u32,
    caller_uid: Uid,
    admin_uids: &HashSet<Uid>,
    body: &[u8],
) -> Result<ResponseRc> {
    let handler = table.mutator(rpc_type)?;
    let owner = handler.job_owner_uid(body)?;
    authorize(caller_uid, owner, admin_uids)?;
    handler.apply(caller_uid, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_authorized() {
        authorize(1000, 1000, &HashSet::new()).unwrap();
    }

    #[test]
    fn admin_is_authorized() {
        let mut admins = HashSet::new();
        admins.insert(0u32);
        authorize(0, 1000, &admins).unwrap();
    }

    #[test]
    fn stranger_is_rejected() {
        assert!(matches!(authorize(2000, 1000, &HashSet::new()), Err(Error::PermissionDenied(_))));
    }
}
