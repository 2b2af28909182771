//! Process-global, read-mostly provider state (§5): reconfiguration takes
//! a writer lock that blocks new verifies; active verifies hold a reader
//! lock for their duration.
//!
//! The source design also holds the writer lock across `fork()` during a
//! privilege-drop window so a forked child starts locked. This crate has
//! no forking privilege-drop path of its own (conmgr's worker-thread model
//! replaces it, §9), so that half of the behavior isn't carried forward;
//! noted in DESIGN.md rather than faked with an unsafe `libc::fork` call.

use crate::credential::Credential;
use crate::provider::{decode_credential, ProviderRegistry};
use slurm_common::error::Result;
use slurm_common::Uid;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct AuthRegistry {
    inner: Arc<RwLock<ProviderRegistry>>,
}

impl AuthRegistry {
    pub fn new(registry: ProviderRegistry) -> AuthRegistry {
        AuthRegistry { inner: Arc::new(RwLock::new(registry)) }
    }

    /// Decodes and verifies a credential against `caller_uid` in one
    /// reader-locked step.
    pub fn verify(&self, credential_bytes: &[u8], caller_uid: Uid) -> Result<Credential> {
        if credential_bytes.len() < 4 {
            return Err(slurm_common::error::Error::Wait);
        }
        let provider_id = u32::from_be_bytes([
            credential_bytes[0],
            credential_bytes[1],
            credential_bytes[2],
            credential_bytes[3],
        ]);

        let registry = self.inner.read().expect("auth registry lock poisoned");
        let cred = decode_credential(credential_bytes, &registry)?;
        let provider = registry
            .get(provider_id)
            .expect("decode_credential would have already failed on an unknown id");
        provider.verify(&cred, caller_uid)?;
        Ok(cred)
    }

    /// Replaces the provider set under the writer lock. Blocks until any
    /// in-flight `verify` calls finish.
    pub fn reload(&self, registry: ProviderRegistry) {
        let mut guard = self.inner.write().expect("auth registry lock poisoned");
        *guard = registry;
    }
}
