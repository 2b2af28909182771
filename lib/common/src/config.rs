//! Configuration loading, in the manner of `flux::logging::init`'s
//! `serdeconv::from_toml_str` use: a small serde struct loaded from a TOML
//! file whose path is resolved from an environment variable with a
//! hardcoded fallback.

use crate::error::{Error, Result};
use serde_derive::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONF_PATH: &str = "/etc/slurm/slurm.conf";
pub const DEFAULT_CACHE_DIR: &str = "/run/slurm/conf";
pub const DEFAULT_SACK_SOCKET: &str = "/run/slurm/sack.socket";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProviderKind {
    MacCookie,
    SignedToken,
}

/// Top level daemon/CLI configuration, discoverable via `$SLURM_CONF`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlurmConf {
    pub slurm_user_id: u32,
    #[serde(default = "default_auth_provider")]
    pub auth_provider: AuthProviderKind,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_sack_socket")]
    pub sack_socket: PathBuf,
    /// Default lifetime of a minted credential, in seconds. Open Question
    /// in the source spec; resolved to 300s here (see DESIGN.md).
    #[serde(default = "default_credential_ttl")]
    pub credential_ttl_secs: u64,
    #[serde(default)]
    pub mac_cookie_secret_hex: Option<String>,
    #[serde(default)]
    pub jwt_hs256_secret: Option<String>,
}

fn default_auth_provider() -> AuthProviderKind {
    AuthProviderKind::MacCookie
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}
fn default_sack_socket() -> PathBuf {
    PathBuf::from(DEFAULT_SACK_SOCKET)
}
fn default_credential_ttl() -> u64 {
    300
}

impl SlurmConf {
    /// Resolves the configuration file path: `$SLURM_CONF`, else the
    /// compiled-in default.
    pub fn discover_path() -> PathBuf {
        std::env::var("SLURM_CONF")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONF_PATH))
    }

    pub fn load_from(path: &Path) -> Result<SlurmConf> {
        let contents = std::fs::read_to_string(path).map_err(Error::from)?;
        serdeconv::from_toml_str(&contents)
            .map_err(|err| Error::ProtocolDecode(format!("invalid config {path:?}: {err}")))
    }

    pub fn load() -> Result<SlurmConf> {
        Self::load_from(&Self::discover_path())
    }
}

/// Parses `SLURM_DEBUG_FLAGS` (comma separated category names) into a set
/// usable for selective structured-debug gating.
pub fn debug_flags_from_env() -> HashSet<String> {
    std::env::var("SLURM_DEBUG_FLAGS")
        .map(|raw| {
            raw.split(',')
                .map(|flag| flag.trim().to_uppercase())
                .filter(|flag| !flag.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_conf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"slurm_user_id = 64030"#).unwrap();
        let conf = SlurmConf::load_from(file.path()).unwrap();
        assert_eq!(conf.slurm_user_id, 64030);
        assert_eq!(conf.credential_ttl_secs, 300);
        assert_eq!(conf.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
    }

    #[test]
    fn debug_flags_parses_categories() {
        std::env::set_var("SLURM_DEBUG_FLAGS", "net, workq,sack");
        let flags = debug_flags_from_env();
        assert!(flags.contains("NET"));
        assert!(flags.contains("WORKQ"));
        assert!(flags.contains("SACK"));
        std::env::remove_var("SLURM_DEBUG_FLAGS");
    }
}
