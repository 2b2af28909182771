//! RPC type codes and the dispatch table from type to handler (§4.6).
//!
//! The numeric codes below are this crate's own assignment: the subset of
//! `original_source` pulled into the retrieval pack doesn't include
//! `slurm_protocol_defs.h`'s real RPC-id enum, so these are internally
//! consistent but not a historical wire-compatible value set (see
//! DESIGN.md).

use crate::query::QueryHandler;
use crate::statechange::StateChangeHandler;
use slurm_common::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RpcType {
    RequestPartitionInfo = 2001,
    RequestNodeInfo = 2002,
    RequestJobInfo = 2003,
    RequestJobStepInfo = 2004,
    RequestPowercapInfo = 2005,
    RequestTopoInfo = 2006,
    RequestLicenseInfo = 2007,
    RequestReservationInfo = 2008,
    UpdateJob = 3001,
    KillJob = 3002,
    KillStep = 3003,
    SuspendJob = 3004,
    ResumeJob = 3005,
    RequeueJob = 3006,
    ReconfigureSackd = 3007,
}

impl RpcType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn is_state_changing(self) -> bool {
        matches!(
            self,
            RpcType::UpdateJob
                | RpcType::KillJob
                | RpcType::KillStep
                | RpcType::SuspendJob
                | RpcType::ResumeJob
                | RpcType::RequeueJob
                | RpcType::ReconfigureSackd
        )
    }
}

#[derive(Default)]
pub struct DispatchTable {
    queries: HashMap<u32, Arc<dyn QueryHandler>>,
    mutators: HashMap<u32, Arc<dyn StateChangeHandler>>,
}

impl DispatchTable {
    pub fn new() -> DispatchTable {
        DispatchTable { queries: HashMap::new(), mutators: HashMap::new() }
    }

    pub fn register_query(&mut self, handler: Arc<dyn QueryHandler>) {
        self.queries.insert(handler.rpc_type(), handler);
    }

    pub fn register_mutator(&mut self, handler: Arc<dyn StateChangeHandler>) {
        self.mutators.insert(handler.rpc_type(), handler);
    }

    pub fn query(&self, rpc_type: u32) -> Result<&Arc<dyn QueryHandler>> {
        self.queries
            .get(&rpc_type)
            .ok_or_else(|| Error::InvalidObjectId(format!("no query handler for rpc type {rpc_type}")))
    }

    pub fn mutator(&self, rpc_type: u32) -> Result<&Arc<dyn StateChangeHandler>> {
        self.mutators
            .get(&rpc_type)
            .ok_or_else(|| Error::InvalidObjectId(format!("no mutating handler for rpc type {rpc_type}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_changing_rpcs_are_classified() {
        assert!(RpcType::UpdateJob.is_state_changing());
        assert!(RpcType::KillJob.is_state_changing());
        assert!(!RpcType::RequestJobInfo.is_state_changing());
    }

    #[test]
    fn unregistered_query_is_invalid_object() {
        let table = DispatchTable::new();
        assert!(matches!(table.query(RpcType::RequestJobInfo.as_u32()), Err(Error::InvalidObjectId(_))));
    }
}
