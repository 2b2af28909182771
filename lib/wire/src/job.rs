//! Job query (read-side) and update (write-side) wire records.
//!
//! Field list grounded on `original_source/src/common/slurm_protocol_defs.h`'s
//! `job_info_t`/`job_desc_msg_t`, trimmed to the fields named in the data
//! model this repository covers (no TRES-layout internals, no licensing
//! server state). Sentinel handling (`NO_VAL`/`NO_VAL64`/`INFINITE`, the
//! `pn_min_memory` per-CPU flag, the `core_spec` threads-vs-cores flag)
//! follows `slurm_common::time`.

use crate::primitives::{
    read_array, read_string, read_u16, read_u32, read_u64, write_array, write_string, write_u16,
    write_u32, write_u64, WireDecode, WireEncode,
};
use slurm_common::error::Result;
use slurm_common::time::{CORE_SPEC_THREADS_FLAG, MEM_PER_CPU_FLAG};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitCode {
    pub status: u32,
    pub term_signal: u32,
}

impl WireEncode for ExitCode {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.status);
        write_u32(out, self.term_signal);
    }
}

impl WireDecode for ExitCode {
    fn decode(cursor: &mut Cursor<&[u8]>) -> Result<ExitCode> {
        Ok(ExitCode {
            status: read_u32(cursor)?,
            term_signal: read_u32(cursor)?,
        })
    }
}

/// `core_spec`'s high bit (`CORE_SPEC_THREADS_FLAG`) means the value
/// counts threads rather than cores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreSpec(pub u16);

impl CoreSpec {
    pub fn is_thread_spec(&self) -> bool {
        self.0 & CORE_SPEC_THREADS_FLAG != 0
    }

    pub fn count(&self) -> u16 {
        self.0 & !CORE_SPEC_THREADS_FLAG
    }
}

/// `pn_min_memory`'s high bit (`MEM_PER_CPU_FLAG`) means the value is
/// per-CPU rather than per-node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinMemory(pub u64);

impl MinMemory {
    pub fn is_per_cpu(&self) -> bool {
        self.0 & MEM_PER_CPU_FLAG != 0
    }

    pub fn amount(&self) -> u64 {
        self.0 & !MEM_PER_CPU_FLAG
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobInfo {
    pub job_id: u32,
    pub array_job_id: u32,
    pub array_task_id: u32,
    pub array_task_str: Option<String>,
    pub het_job_id: u32,
    pub het_job_offset: u32,
    pub het_job_id_set: Option<String>,
    pub user_id: u32,
    pub group_id: u32,
    pub account: Option<String>,
    pub partition: Option<String>,
    pub qos: Option<String>,
    pub name: Option<String>,
    pub command: Option<String>,
    pub work_dir: Option<String>,
    pub batch_flag: u16,
    pub batch_host: Option<String>,
    pub state: u32,
    pub state_reason: u32,
    pub exit_code: ExitCode,
    pub derived_exit_code: ExitCode,
    pub submit_time: u64,
    pub eligible_time: u64,
    pub accrue_time: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub preempt_time: u64,
    pub deadline: u64,
    pub suspend_time: u64,
    pub pre_sus_time: u64,
    pub time_limit_minutes: u32,
    pub time_min: u32,
    pub priority: u32,
    pub nice: u32,
    pub restart_cnt: u16,
    pub reboot: u16,
    pub requeue: u16,
    pub shared: u16,
    pub contiguous: u16,
    pub core_spec: CoreSpec,
    pub node_list: Option<String>,
    pub required_nodes: Option<String>,
    pub excluded_nodes: Option<String>,
    pub scheduled_nodes: Option<String>,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub min_cpus_per_node: u32,
    pub pn_min_memory: MinMemory,
    pub pn_min_tmp_disk: u32,
    pub features: Option<String>,
    pub licenses: Option<String>,
    pub dependency: Option<String>,
    pub reservation: Option<String>,
    pub comment: Option<String>,
    pub tres_alloc: Option<String>,
    pub tres_bind: Option<String>,
    pub tres_freq: Option<String>,
    pub tres_per_job: Option<String>,
    pub tres_per_node: Option<String>,
    pub tres_per_socket: Option<String>,
    pub tres_per_task: Option<String>,
    pub fed_siblings: Vec<String>,
    pub fed_origin: Option<String>,
    pub network: Option<String>,
    pub mcs_label: Option<String>,
}

impl WireEncode for JobInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.job_id);
        write_u32(out, self.array_job_id);
        write_u32(out, self.array_task_id);
        write_string(out, self.array_task_str.as_deref());
        write_u32(out, self.het_job_id);
        write_u32(out, self.het_job_offset);
        write_string(out, self.het_job_id_set.as_deref());
        write_u32(out, self.user_id);
        write_u32(out, self.group_id);
        write_string(out, self.account.as_deref());
        write_string(out, self.partition.as_deref());
        write_string(out, self.qos.as_deref());
        write_string(out, self.name.as_deref());
        write_string(out, self.command.as_deref());
        write_string(out, self.work_dir.as_deref());
        write_u16(out, self.batch_flag);
        write_string(out, self.batch_host.as_deref());
        write_u32(out, self.state);
        write_u32(out, self.state_reason);
        self.exit_code.encode(out);
        self.derived_exit_code.encode(out);
        write_u64(out, self.submit_time);
        write_u64(out, self.eligible_time);
        write_u64(out, self.accrue_time);
        write_u64(out, self.start_time);
        write_u64(out, self.end_time);
        write_u64(out, self.preempt_time);
        write_u64(out, self.deadline);
        write_u64(out, self.suspend_time);
        write_u64(out, self.pre_sus_time);
        write_u32(out, self.time_limit_minutes);
        write_u32(out, self.time_min);
        write_u32(out, self.priority);
        write_u32(out, self.nice);
        write_u16(out, self.restart_cnt);
        write_u16(out, self.reboot);
        write_u16(out, self.requeue);
        write_u16(out, self.shared);
        write_u16(out, self.contiguous);
        write_u16(out, self.core_spec.0);
        write_string(out, self.node_list.as_deref());
        write_string(out, self.required_nodes.as_deref());
        write_string(out, self.excluded_nodes.as_deref());
        write_string(out, self.scheduled_nodes.as_deref());
        write_u32(out, self.min_nodes);
        write_u32(out, self.max_nodes);
        write_u32(out, self.min_cpus_per_node);
        write_u64(out, self.pn_min_memory.0);
        write_u32(out, self.pn_min_tmp_disk);
        write_string(out, self.features.as_deref());
        write_string(out, self.licenses.as_deref());
        write_string(out, self.dependency.as_deref());
        write_string(out, self.reservation.as_deref());
        write_string(out, self.comment.as_deref());
        write_string(out, self.tres_alloc.as_deref());
        write_string(out, self.tres_bind.as_deref());
        write_string(out, self.tres_freq.as_deref());
        write_string(out, self.tres_per_job.as_deref());
        write_string(out, self.tres_per_node.as_deref());
        write_string(out, self.tres_per_socket.as_deref());
        write_string(out, self.tres_per_task.as_deref());
        write_array(out, &self.fed_siblings, |out, s| write_string(out, Some(s)));
        write_string(out, self.fed_origin.as_deref());
        write_string(out, self.network.as_deref());
        write_string(out, self.mcs_label.as_deref());
    }
}

impl WireDecode for JobInfo {
    fn decode(cursor: &mut Cursor<&[u8]>) -> Result<JobInfo> {
        Ok(JobInfo {
            job_id: read_u32(cursor)?,
            array_job_id: read_u32(cursor)?,
            array_task_id: read_u32(cursor)?,
            array_task_str: read_string(cursor)?,
            het_job_id: read_u32(cursor)?,
            het_job_offset: read_u32(cursor)?,
            het_job_id_set: read_string(cursor)?,
            user_id: read_u32(cursor)?,
            group_id: read_u32(cursor)?,
            account: read_string(cursor)?,
            partition: read_string(cursor)?,
            qos: read_string(cursor)?,
            name: read_string(cursor)?,
            command: read_string(cursor)?,
            work_dir: read_string(cursor)?,
            batch_flag: read_u16(cursor)?,
            batch_host: read_string(cursor)?,
            state: read_u32(cursor)?,
            state_reason: read_u32(cursor)?,
            exit_code: ExitCode::decode(cursor)?,
            derived_exit_code: ExitCode::decode(cursor)?,
            submit_time: read_u64(cursor)?,
            eligible_time: read_u64(cursor)?,
            accrue_time: read_u64(cursor)?,
            start_time: read_u64(cursor)?,
            end_time: read_u64(cursor)?,
            preempt_time: read_u64(cursor)?,
            deadline: read_u64(cursor)?,
            suspend_time: read_u64(cursor)?,
            pre_sus_time: read_u64(cursor)?,
            time_limit_minutes: read_u32(cursor)?,
            time_min: read_u32(cursor)?,
            priority: read_u32(cursor)?,
            nice: read_u32(cursor)?,
            restart_cnt: read_u16(cursor)?,
            reboot: read_u16(cursor)?,
            requeue: read_u16(cursor)?,
            shared: read_u16(cursor)?,
            contiguous: read_u16(cursor)?,
            core_spec: CoreSpec(read_u16(cursor)?),
            node_list: read_string(cursor)?,
            required_nodes: read_string(cursor)?,
            excluded_nodes: read_string(cursor)?,
            scheduled_nodes: read_string(cursor)?,
            min_nodes: read_u32(cursor)?,
            max_nodes: read_u32(cursor)?,
            min_cpus_per_node: read_u32(cursor)?,
            pn_min_memory: MinMemory(read_u64(cursor)?),
            pn_min_tmp_disk: read_u32(cursor)?,
            features: read_string(cursor)?,
            licenses: read_string(cursor)?,
            dependency: read_string(cursor)?,
            reservation: read_string(cursor)?,
            comment: read_string(cursor)?,
            tres_alloc: read_string(cursor)?,
            tres_bind: read_string(cursor)?,
            tres_freq: read_string(cursor)?,
            tres_per_job: read_string(cursor)?,
            tres_per_node: read_string(cursor)?,
            tres_per_socket: read_string(cursor)?,
            tres_per_task: read_string(cursor)?,
            fed_siblings: read_array(cursor, |c| {
                read_string(c)?.ok_or_else(|| {
                    slurm_common::error::Error::ProtocolDecode("null federation sibling".into())
                })
            })?,
            fed_origin: read_string(cursor)?,
            network: read_string(cursor)?,
            mcs_label: read_string(cursor)?,
        })
    }
}

/// Write-side record: a subset of [`JobInfo`]'s fields that may be
/// mutated post-submission. `NO_VAL`/`NO_VAL64` on a field means "do not
/// change"; immutable fields of a non-pending job are rejected by the
/// handler with `Error::PermissionDenied`, not representable here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub job_id: u32,
    pub name: Option<String>,
    pub partition: Option<String>,
    pub qos: Option<String>,
    pub time_limit_minutes: u32,
    pub priority: u32,
    pub nice: u32,
    pub requeue: u16,
    pub comment: Option<String>,
    pub dependency: Option<String>,
    pub reservation: Option<String>,
    pub min_nodes: u32,
    pub max_nodes: u32,
    pub pn_min_memory: MinMemory,
    pub features: Option<String>,
    pub licenses: Option<String>,
    pub account: Option<String>,
    pub work_dir: Option<String>,
}

impl WireEncode for JobUpdate {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.job_id);
        write_string(out, self.name.as_deref());
        write_string(out, self.partition.as_deref());
        write_string(out, self.qos.as_deref());
        write_u32(out, self.time_limit_minutes);
        write_u32(out, self.priority);
        write_u32(out, self.nice);
        write_u16(out, self.requeue);
        write_string(out, self.comment.as_deref());
        write_string(out, self.dependency.as_deref());
        write_string(out, self.reservation.as_deref());
        write_u32(out, self.min_nodes);
        write_u32(out, self.max_nodes);
        write_u64(out, self.pn_min_memory.0);
        write_string(out, self.features.as_deref());
        write_string(out, self.licenses.as_deref());
        write_string(out, self.account.as_deref());
        write_string(out, self.work_dir.as_deref());
    }
}

impl WireDecode for JobUpdate {
    fn decode(cursor: &mut Cursor<&[u8]>) -> Result<JobUpdate> {
        Ok(JobUpdate {
            job_id: read_u32(cursor)?,
            name: read_string(cursor)?,
            partition: read_string(cursor)?,
            qos: read_string(cursor)?,
            time_limit_minutes: read_u32(cursor)?,
            priority: read_u32(cursor)?,
            nice: read_u32(cursor)?,
            requeue: read_u16(cursor)?,
            comment: read_string(cursor)?,
            dependency: read_string(cursor)?,
            reservation: read_string(cursor)?,
            min_nodes: read_u32(cursor)?,
            max_nodes: read_u32(cursor)?,
            pn_min_memory: MinMemory(read_u64(cursor)?),
            features: read_string(cursor)?,
            licenses: read_string(cursor)?,
            account: read_string(cursor)?,
            work_dir: read_string(cursor)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slurm_common::time::{NO_VAL, NO_VAL64};

    fn sample_job() -> JobInfo {
        JobInfo {
            job_id: 42,
            array_job_id: 0,
            array_task_id: NO_VAL,
            user_id: 1000,
            group_id: 1000,
            name: Some("my-job".into()),
            node_list: Some("node[1-3]".into()),
            start_time: NO_VAL64,
            pn_min_memory: MinMemory(MEM_PER_CPU_FLAG | 2048),
            core_spec: CoreSpec(CORE_SPEC_THREADS_FLAG | 4),
            fed_siblings: vec!["clusterA".into(), "clusterB".into()],
            ..Default::default()
        }
    }

    #[test]
    fn job_info_roundtrips() {
        let job = sample_job();
        let mut buf = Vec::new();
        job.encode(&mut buf);

        let mut cursor = Cursor::new(buf.as_slice());
        let decoded = JobInfo::decode(&mut cursor).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn sentinels_survive_roundtrip() {
        let job = sample_job();
        assert_eq!(job.array_task_id, NO_VAL);
        assert_eq!(job.start_time, NO_VAL64);

        let mut buf = Vec::new();
        job.encode(&mut buf);
        let mut cursor = Cursor::new(buf.as_slice());
        let decoded = JobInfo::decode(&mut cursor).unwrap();
        assert_eq!(decoded.array_task_id, NO_VAL);
        assert_eq!(decoded.start_time, NO_VAL64);
    }

    #[test]
    fn min_memory_flag_decodes() {
        let mem = MinMemory(MEM_PER_CPU_FLAG | 2048);
        assert!(mem.is_per_cpu());
        assert_eq!(mem.amount(), 2048);
    }

    #[test]
    fn core_spec_thread_flag_decodes() {
        let spec = CoreSpec(CORE_SPEC_THREADS_FLAG | 4);
        assert!(spec.is_thread_spec());
        assert_eq!(spec.count(), 4);
    }
}
