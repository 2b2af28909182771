//! `AuthProvider`: mint/verify/identity-extraction trait shape from §4.4,
//! plus the envelope that frames a provider's opaque bytes on the wire.
//!
//! The wire encoding for a credential is `[u32 provider_id][provider
//! bytes]` (§3). To let `slurm_wire`'s frame decoder find the end of a
//! credential without depending on this crate, the envelope self-describes
//! its length: `[u32 provider_id][u32 body_len][body]`. `peek_len` reads
//! just that much and is the `credential_len` closure `slurm_wire::try_decode`
//! expects.

use crate::credential::Credential;
use slurm_common::error::{Error, Result};
use slurm_common::Uid;
use slurm_wire::{read_bytes, read_u32, write_bytes, write_u32};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

pub trait AuthProvider: Send + Sync {
    fn provider_id(&self) -> u32;

    /// `subject` is the identity being asserted (the peer uid/gid for
    /// sackd, §4.5). The abstract trait in the design this follows omits
    /// it on the assumption the implementation already knows its caller's
    /// identity; this crate's callers (sackd, HTTP tunneling) don't share
    /// that assumption, so it's passed explicitly.
    fn mint(
        &self,
        payload: &[u8],
        subject: (Uid, slurm_common::Gid),
        recipient_uid: Uid,
        extra_identity: Option<&[u8]>,
    ) -> Result<Credential>;

    /// Validates the signature, the validity window and the recipient
    /// binding against `caller_uid`.
    fn verify(&self, cred: &Credential, caller_uid: Uid) -> Result<()>;

    /// Encodes the provider-specific body (not including the envelope
    /// header).
    fn encode(&self, cred: &Credential) -> Vec<u8>;

    /// Decodes a provider-specific body produced by `encode`.
    fn decode(&self, bytes: &[u8]) -> Result<Credential>;
}

/// Dispatches `decode_credential` to the provider named by the envelope's
/// `provider_id`. One registry is shared process-wide; reconfiguration
/// replaces entries under a writer lock at a layer above this (§5).
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<u32, Arc<dyn AuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> ProviderRegistry {
        ProviderRegistry { providers: HashMap::new() }
    }

    pub fn register(&mut self, provider: Arc<dyn AuthProvider>) {
        self.providers.insert(provider.provider_id(), provider);
    }

    pub fn get(&self, provider_id: u32) -> Option<&Arc<dyn AuthProvider>> {
        self.providers.get(&provider_id)
    }
}

/// Frames `cred` for the wire using `provider`'s encoding.
pub fn encode_credential(provider: &dyn AuthProvider, cred: &Credential) -> Vec<u8> {
    let body = provider.encode(cred);
    let mut out = Vec::with_capacity(8 + body.len());
    write_u32(&mut out, provider.provider_id());
    write_bytes(&mut out, &body);
    out
}

/// Unframes a credential, selecting the provider by `provider_id` and
/// rejecting unknown ones (§3).
pub fn decode_credential(bytes: &[u8], registry: &ProviderRegistry) -> Result<Credential> {
    let mut cursor = Cursor::new(bytes);
    let provider_id = read_u32(&mut cursor)?;
    let body = read_bytes(&mut cursor)?;

    let provider = registry
        .get(provider_id)
        .ok_or_else(|| Error::AuthInvalid(format!("unknown auth provider id {provider_id}")))?;
    provider.decode(&body)
}

/// The `credential_len` probe `slurm_wire::try_decode` wants: reads the
/// envelope header (`provider_id` + `body_len`) and returns the envelope's
/// total wire length, or `None` if not enough bytes have arrived yet to
/// read the header itself.
pub fn peek_len(tail: &[u8]) -> Option<usize> {
    if tail.len() < 8 {
        return None;
    }
    let body_len = u32::from_be_bytes([tail[4], tail[5], tail[6], tail[7]]) as usize;
    Some(8 + body_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_len_waits_for_header() {
        assert_eq!(peek_len(&[0u8; 4]), None);
    }

    #[test]
    fn peek_len_reads_declared_body_length() {
        let mut header = Vec::new();
        write_u32(&mut header, 1);
        write_u32(&mut header, 10);
        assert_eq!(peek_len(&header), Some(18));
    }

    #[test]
    fn unknown_provider_id_is_rejected() {
        let registry = ProviderRegistry::new();
        let mut bytes = Vec::new();
        write_u32(&mut bytes, 99);
        write_bytes(&mut bytes, b"x");
        assert!(matches!(decode_credential(&bytes, &registry), Err(Error::AuthInvalid(_))));
    }
}
