//! MAC-cookie provider (§4.4): a symmetric-keyed MAC over
//! `(uid, gid, valid_from, valid_to, recipient_uid, nonce, payload_digest)`.
//! Grounded on `original_source/src/common/auth.h`'s `credentials`/
//! `signature` pair, generalized from its fixed RSA signature
//! (`AUTH_RSA_SIGLEN`) to an HMAC-SHA256 tag (see DESIGN.md for why RSA
//! itself wasn't carried forward).

use crate::credential::{digest_payload, Credential};
use crate::provider::AuthProvider;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use slurm_common::error::{Error, Result};
use slurm_common::time::timestamp_secs;
use slurm_common::Uid;
use slurm_wire::{
    read_bytes, read_string, read_u32, read_u64, write_bytes, write_string, write_u32, write_u64, SizedRead,
};
use std::io::Cursor;

pub const PROVIDER_ID: u32 = 1;
const NONCE_LEN: usize = 8;

type HmacSha256 = Hmac<Sha256>;

pub struct MacCookieProvider {
    key: Vec<u8>,
    ttl_secs: u64,
}

impl MacCookieProvider {
    pub fn new(key: Vec<u8>, ttl_secs: u64) -> MacCookieProvider {
        MacCookieProvider { key, ttl_secs }
    }

    fn signable_bytes(
        uid: Uid,
        gid: u32,
        valid_from: i64,
        valid_to: i64,
        recipient_uid: Uid,
        nonce: &[u8],
        payload_digest: &[u8; 32],
        host: &Option<String>,
        extra_identity: &Option<Vec<u8>>,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        write_u32(&mut buf, uid);
        write_u32(&mut buf, gid);
        write_u64(&mut buf, valid_from as u64);
        write_u64(&mut buf, valid_to as u64);
        write_u32(&mut buf, recipient_uid);
        buf.extend_from_slice(nonce);
        buf.extend_from_slice(payload_digest);
        write_string(&mut buf, host.as_deref());
        write_bytes(&mut buf, extra_identity.as_deref().unwrap_or(&[]));
        buf
    }

    fn sign(&self, signable: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(signable);
        mac.finalize().into_bytes().to_vec()
    }
}

impl AuthProvider for MacCookieProvider {
    fn provider_id(&self) -> u32 {
        PROVIDER_ID
    }

    fn mint(
        &self,
        payload: &[u8],
        subject: (Uid, u32),
        recipient_uid: Uid,
        extra_identity: Option<&[u8]>,
    ) -> Result<Credential> {
        let (uid, gid) = subject;
        let now = timestamp_secs() as i64;
        let valid_from = now;
        let valid_to = now + self.ttl_secs as i64;
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let payload_digest = digest_payload(payload);
        let extra_identity = extra_identity.map(|e| e.to_vec());
        let host = None;

        let signable = Self::signable_bytes(
            uid, gid, valid_from, valid_to, recipient_uid, &nonce, &payload_digest, &host, &extra_identity,
        );
        let signature = self.sign(&signable);
        let mut signature_field = nonce.to_vec();
        signature_field.extend_from_slice(&signature);

        Ok(Credential {
            uid,
            gid,
            host,
            extra_identity,
            recipient_uid,
            valid_from,
            valid_to,
            payload_digest,
            signature: signature_field,
        })
    }

    fn verify(&self, cred: &Credential, caller_uid: Uid) -> Result<()> {
        if cred.signature.len() < NONCE_LEN {
            return Err(Error::AuthInvalid("mac-cookie credential truncated".into()));
        }
        let (nonce, signature) = cred.signature.split_at(NONCE_LEN);

        let signable = Self::signable_bytes(
            cred.uid,
            cred.gid,
            cred.valid_from,
            cred.valid_to,
            cred.recipient_uid,
            nonce,
            &cred.payload_digest,
            &cred.host,
            &cred.extra_identity,
        );

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(&signable);
        mac.verify_slice(signature)
            .map_err(|_| Error::AuthInvalid("mac-cookie signature mismatch".into()))?;

        let now = timestamp_secs() as i64;
        if cred.is_expired(now) {
            return Err(Error::AuthInvalid("mac-cookie credential expired".into()));
        }
        if !cred.recipient_matches(caller_uid) {
            return Err(Error::AuthInvalid("mac-cookie recipient mismatch".into()));
        }
        Ok(())
    }

    fn encode(&self, cred: &Credential) -> Vec<u8> {
        let mut out = Vec::new();
        write_u32(&mut out, cred.uid);
        write_u32(&mut out, cred.gid);
        write_string(&mut out, cred.host.as_deref());
        write_bytes(&mut out, cred.extra_identity.as_deref().unwrap_or(&[]));
        write_u32(&mut out, cred.recipient_uid);
        write_u64(&mut out, cred.valid_from as u64);
        write_u64(&mut out, cred.valid_to as u64);
        out.extend_from_slice(&cred.payload_digest);
        write_bytes(&mut out, &cred.signature);
        out
    }

    fn decode(&self, bytes: &[u8]) -> Result<Credential> {
        let mut cursor = Cursor::new(bytes);
        let uid = read_u32(&mut cursor)?;
        let gid = read_u32(&mut cursor)?;
        let host = read_string(&mut cursor)?;
        let extra_bytes = read_bytes(&mut cursor)?;
        let extra_identity = if extra_bytes.is_empty() { None } else { Some(extra_bytes) };
        let recipient_uid = read_u32(&mut cursor)?;
        let valid_from = read_u64(&mut cursor)? as i64;
        let valid_to = read_u64(&mut cursor)? as i64;
        let digest_bytes = cursor.take(32)?;
        let mut payload_digest = [0u8; 32];
        payload_digest.copy_from_slice(digest_bytes);
        let signature = read_bytes(&mut cursor)?;

        Ok(Credential {
            uid,
            gid,
            host,
            extra_identity,
            recipient_uid,
            valid_from,
            valid_to,
            payload_digest,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{decode_credential, encode_credential, ProviderRegistry};
    use std::sync::Arc;

    fn registry(provider: Arc<MacCookieProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        registry
    }

    #[test]
    fn mint_then_verify_succeeds() {
        let provider = Arc::new(MacCookieProvider::new(b"secret-key".to_vec(), 300));
        let cred = provider.mint(b"job=42", (1000, 1000), 1000, None).unwrap();
        provider.verify(&cred, 1000).unwrap();
    }

    #[test]
    fn wrong_recipient_is_rejected() {
        let provider = Arc::new(MacCookieProvider::new(b"secret-key".to_vec(), 300));
        let cred = provider.mint(b"job=42", (1000, 1000), 1000, None).unwrap();
        assert!(provider.verify(&cred, 2000).is_err());
    }

    #[test]
    fn any_uid_recipient_matches_anyone() {
        let provider = Arc::new(MacCookieProvider::new(b"secret-key".to_vec(), 300));
        let cred = provider.mint(b"job=42", (1000, 1000), slurm_common::ANY_UID, None).unwrap();
        provider.verify(&cred, 77).unwrap();
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let provider = Arc::new(MacCookieProvider::new(b"secret-key".to_vec(), 300));
        let mut cred = provider.mint(b"job=42", (1000, 1000), 1000, None).unwrap();
        let last = cred.signature.len() - 1;
        cred.signature[last] ^= 0xFF;
        assert!(provider.verify(&cred, 1000).is_err());
    }

    #[test]
    fn encode_decode_roundtrips_through_registry() {
        let provider = Arc::new(MacCookieProvider::new(b"secret-key".to_vec(), 300));
        let cred = provider.mint(b"job=42", (1000, 1000), 1000, Some(b"groups:wheel")).unwrap();
        let wire = encode_credential(provider.as_ref(), &cred);

        let registry = registry(provider.clone());
        let decoded = decode_credential(&wire, &registry).unwrap();
        provider.verify(&decoded, 1000).unwrap();
        assert_eq!(decoded.extra_of(), Some(b"groups:wheel".as_ref()));
    }
}
