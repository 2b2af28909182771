//! Pluggable credential minting/verification (§4.4): an abstract
//! `Credential`/`AuthProvider` pair with MAC-cookie and signed-bearer-token
//! implementations, plus the process-global reconfiguration wrapper both
//! `services/sackd` and the control-plane RPC path share.

mod credential;
mod mac_cookie;
mod provider;
mod reconfig;
mod signed_token;

pub use credential::{digest_payload, Credential};
pub use mac_cookie::MacCookieProvider;
pub use provider::{decode_credential, encode_credential, peek_len, AuthProvider, ProviderRegistry};
pub use reconfig::AuthRegistry;
pub use signed_token::{token_from_headers, SignedTokenProvider, UserResolver};
