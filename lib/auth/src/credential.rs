//! The decoded form of a credential, common to every provider. Mirrors
//! `original_source/src/common/auth.h`'s `credentials` struct (uid, gid,
//! valid_from, valid_to), widened with the recipient binding and optional
//! identity extras this design adds (§3, §4.4).

use sha2::{Digest, Sha256};
use slurm_common::{Gid, Uid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub uid: Uid,
    pub gid: Gid,
    pub host: Option<String>,
    pub extra_identity: Option<Vec<u8>>,
    /// `ANY_UID` disables recipient binding (§3).
    pub recipient_uid: Uid,
    pub valid_from: i64,
    pub valid_to: i64,
    pub payload_digest: [u8; 32],
    /// Opaque per-provider signature bytes (§3); meaningless outside the
    /// provider that minted this credential.
    pub signature: Vec<u8>,
}

impl Credential {
    pub fn uid_of(&self) -> Uid {
        self.uid
    }

    pub fn gid_of(&self) -> Gid {
        self.gid
    }

    pub fn host_of(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn extra_of(&self) -> Option<&[u8]> {
        self.extra_identity.as_deref()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now < self.valid_from || now > self.valid_to
    }

    /// `caller_uid == ANY_UID` or `recipient_uid == ANY_UID` skips the
    /// binding check.
    pub fn recipient_matches(&self, caller_uid: Uid) -> bool {
        self.recipient_uid == slurm_common::ANY_UID || self.recipient_uid == caller_uid
    }
}

pub fn digest_payload(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}
