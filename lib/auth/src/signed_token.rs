//! Signed bearer token provider (§4.4): a JWT carrying `sub`/`exp`/`aud`
//! claims, HMAC- or Ed25519-signed. Grounded on
//! `original_source/src/plugins/http_auth/jwt/http_auth_jwt.c`'s
//! `sub`-to-uid resolution, with the crate choice (`jsonwebtoken`) aligned
//! with `sl224-casparianflow`'s `cf_security`/`casparian_security` crates.

use crate::credential::{digest_payload, Credential};
use crate::provider::AuthProvider;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use slurm_common::error::{Error, Result};
use slurm_common::time::timestamp_secs;
use slurm_common::{Gid, Uid};
use slurm_wire::{read_string, write_string};
use std::io::Cursor;

pub const PROVIDER_ID: u32 = 2;

/// Resolves between usernames (the JWT `sub` claim) and uid/gid, the
/// indirection the design's `sub`-carrying tokens need that the
/// MAC-cookie provider doesn't (§4.4). Backed by `SlurmConf` or a static
/// map in tests.
pub trait UserResolver: Send + Sync {
    fn resolve(&self, username: &str) -> Option<(Uid, Gid)>;
    fn username_of(&self, uid: Uid) -> Option<String>;
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<String>,
    recipient_uid: u32,
    payload_digest: String,
}

pub struct SignedTokenProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    ttl_secs: u64,
    resolver: Box<dyn UserResolver>,
}

impl SignedTokenProvider {
    pub fn hmac(secret: &[u8], ttl_secs: u64, resolver: Box<dyn UserResolver>) -> SignedTokenProvider {
        SignedTokenProvider {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            ttl_secs,
            resolver,
        }
    }

    pub fn ed25519(encoding_pem: &[u8], decoding_pem: &[u8], ttl_secs: u64, resolver: Box<dyn UserResolver>) -> Result<SignedTokenProvider> {
        Ok(SignedTokenProvider {
            encoding_key: EncodingKey::from_ed_pem(encoding_pem)
                .map_err(|e| Error::Fatal(format!("bad ed25519 signing key: {e}")))?,
            decoding_key: DecodingKey::from_ed_pem(decoding_pem)
                .map_err(|e| Error::Fatal(format!("bad ed25519 verify key: {e}")))?,
            algorithm: Algorithm::EdDSA,
            ttl_secs,
            resolver,
        })
    }
}

impl AuthProvider for SignedTokenProvider {
    fn provider_id(&self) -> u32 {
        PROVIDER_ID
    }

    fn mint(
        &self,
        payload: &[u8],
        subject: (Uid, Gid),
        recipient_uid: Uid,
        extra_identity: Option<&[u8]>,
    ) -> Result<Credential> {
        let (uid, gid) = subject;
        let sub = self
            .resolver
            .username_of(uid)
            .unwrap_or_else(|| format!("uid:{uid}"));
        let exp = timestamp_secs() + self.ttl_secs;
        let payload_digest = digest_payload(payload);

        let claims = Claims {
            sub,
            exp,
            aud: None,
            recipient_uid,
            payload_digest: hex_encode(&payload_digest),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| Error::Fatal(format!("jwt mint failed: {e}")))?;

        Ok(Credential {
            uid,
            gid,
            host: None,
            extra_identity: extra_identity.map(|e| e.to_vec()),
            recipient_uid,
            valid_from: (exp - self.ttl_secs) as i64,
            valid_to: exp as i64,
            payload_digest,
            signature: token.into_bytes(),
        })
    }

    fn verify(&self, cred: &Credential, caller_uid: Uid) -> Result<()> {
        let token = std::str::from_utf8(&cred.signature)
            .map_err(|_| Error::AuthInvalid("bearer token is not utf8".into()))?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_aud = false;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| Error::AuthInvalid(format!("jwt verify failed: {e}")))?;

        let (resolved_uid, resolved_gid) = self
            .resolver
            .resolve(&data.claims.sub)
            .ok_or_else(|| Error::AuthInvalid(format!("unknown subject {}", data.claims.sub)))?;
        if resolved_uid != cred.uid || resolved_gid != cred.gid {
            return Err(Error::AuthInvalid("token subject does not match credential identity".into()));
        }
        if hex_encode(&cred.payload_digest) != data.claims.payload_digest {
            return Err(Error::AuthInvalid("token payload digest mismatch".into()));
        }
        if !cred.recipient_matches(caller_uid) {
            return Err(Error::AuthInvalid("bearer token recipient mismatch".into()));
        }
        Ok(())
    }

    fn encode(&self, cred: &Credential) -> Vec<u8> {
        let mut out = Vec::new();
        write_string(&mut out, cred.host.as_deref());
        out.extend_from_slice(&(cred.signature.len() as u32).to_be_bytes());
        out.extend_from_slice(&cred.signature);
        out
    }

    fn decode(&self, bytes: &[u8]) -> Result<Credential> {
        let mut cursor = Cursor::new(bytes);
        let host = read_string(&mut cursor)?;
        let token = slurm_wire::read_bytes(&mut cursor)?;
        let token = String::from_utf8(token)
            .map_err(|_| Error::ProtocolDecode("bearer token is not utf8".into()))?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.insecure_disable_signature_validation();
        let data = decode::<Claims>(&token, &self.decoding_key, &validation)
            .map_err(|e| Error::ProtocolDecode(format!("malformed bearer token: {e}")))?;
        let (uid, gid) = self
            .resolver
            .resolve(&data.claims.sub)
            .ok_or_else(|| Error::AuthInvalid(format!("unknown subject {}", data.claims.sub)))?;
        let payload_digest = hex_decode(&data.claims.payload_digest)
            .ok_or_else(|| Error::ProtocolDecode("malformed payload digest".into()))?;

        Ok(Credential {
            uid,
            gid,
            host,
            extra_identity: None,
            recipient_uid: data.claims.recipient_uid,
            valid_from: (data.claims.exp.saturating_sub(self.ttl_secs)) as i64,
            valid_to: data.claims.exp as i64,
            payload_digest,
            signature: token.into_bytes(),
        })
    }
}

/// Parses the `Authorization: Bearer <token>` / `X-SLURM-USER-TOKEN`
/// headers per §6, rejecting a request that presents both forms.
pub fn token_from_headers<'a>(
    authorization_bearer: Option<&'a str>,
    x_slurm_user_token: Option<&'a str>,
) -> Result<&'a str> {
    match (authorization_bearer, x_slurm_user_token) {
        (Some(_), Some(_)) => Err(Error::AuthInvalid("both Authorization and X-SLURM-USER-TOKEN present".into())),
        (Some(tok), None) => Ok(tok),
        (None, Some(tok)) => Ok(tok),
        (None, None) => Err(Error::AuthInvalid("no bearer token presented".into())),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<[u8; 32]> {
    if s.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapResolver(Mutex<HashMap<String, (Uid, Gid)>>);

    impl UserResolver for MapResolver {
        fn resolve(&self, username: &str) -> Option<(Uid, Gid)> {
            self.0.lock().unwrap().get(username).copied()
        }

        fn username_of(&self, uid: Uid) -> Option<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .find(|(_, (u, _))| *u == uid)
                .map(|(name, _)| name.clone())
        }
    }

    fn resolver() -> Box<dyn UserResolver> {
        let mut map = HashMap::new();
        map.insert("alice".to_string(), (1000u32, 1000u32));
        Box::new(MapResolver(Mutex::new(map)))
    }

    #[test]
    fn mint_then_verify_succeeds() {
        let provider = SignedTokenProvider::hmac(b"topsecret", 300, resolver());
        let cred = provider.mint(b"job=42", (1000, 1000), 2000, None).unwrap();
        provider.verify(&cred, 2000).unwrap();
    }

    #[test]
    fn unknown_subject_is_rejected() {
        let provider = SignedTokenProvider::hmac(b"topsecret", 300, resolver());
        let mut cred = provider.mint(b"job=42", (1000, 1000), 2000, None).unwrap();
        cred.signature = b"not-a-jwt".to_vec();
        assert!(provider.verify(&cred, 2000).is_err());
    }

    #[test]
    fn header_parsing_rejects_both_present() {
        assert!(token_from_headers(Some("a"), Some("b")).is_err());
        assert_eq!(token_from_headers(Some("a"), None).unwrap(), "a");
        assert_eq!(token_from_headers(None, Some("b")).unwrap(), "b");
    }
}
