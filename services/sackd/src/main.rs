//! Local credential daemon (§4.5): binds a unix socket, mints and verifies
//! credentials for processes on this host that ask over it.

mod bootstrap;
mod handler;
mod os_identity;

use clap::Parser;
use handler::SackHandler;
use os_identity::PasswdResolver;
use slog::{error, info};
use slurm_auth::{AuthRegistry, MacCookieProvider, ProviderRegistry, SignedTokenProvider};
use slurm_common::config::{AuthProviderKind, SlurmConf};
use slurm_common::logging;
use slurm_conmgr::Conmgr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const WORKER_THREADS: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "sackd", about = "Local SACK credential daemon")]
struct Cli {
    /// Path to an alternate slurm.conf, overriding $SLURM_CONF.
    #[arg(short = 'f', long = "conf-server")]
    conf_server: Option<PathBuf>,

    /// Increase logging verbosity; repeatable.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let logger = logging::init(cli.verbose);

    let conf = match &cli.conf_server {
        Some(path) => SlurmConf::load_from(path),
        None => SlurmConf::load(),
    };
    let conf = match conf {
        Ok(conf) => conf,
        Err(err) => {
            error!(logger, "failed to load configuration"; "error" => %err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = bootstrap::bootstrap(conf.slurm_user_id, &conf.sack_socket, &logger) {
        error!(logger, "bootstrap failed"; "error" => %err);
        return ExitCode::FAILURE;
    }

    let mint_provider = match build_provider(&conf) {
        Ok(provider) => provider,
        Err(err) => {
            error!(logger, "failed to build auth provider"; "error" => %err);
            return ExitCode::FAILURE;
        }
    };

    let mut registry = ProviderRegistry::new();
    registry.register(mint_provider.clone());
    let auth_registry = AuthRegistry::new(registry);

    let handler = Arc::new(SackHandler::new(mint_provider, auth_registry, logger.clone()));
    let conmgr = match Conmgr::new(WORKER_THREADS, handler.clone(), logger.clone()) {
        Ok(conmgr) => Arc::new(conmgr),
        Err(err) => {
            error!(logger, "failed to construct connection manager"; "error" => %err);
            return ExitCode::FAILURE;
        }
    };
    handler.attach(Arc::clone(&conmgr));

    if let Err(err) = conmgr.add_unix_listener(&conf.sack_socket) {
        error!(logger, "failed to bind sack socket"; "path" => %conf.sack_socket.display(), "error" => %err);
        return ExitCode::FAILURE;
    }

    conmgr.spawn_signal_handler();
    info!(logger, "sackd ready"; "socket" => %conf.sack_socket.display());

    match conmgr.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(logger, "connection manager exited with an error"; "error" => %err);
            ExitCode::FAILURE
        }
    }
}

fn build_provider(conf: &SlurmConf) -> slurm_common::error::Result<Arc<dyn slurm_auth::AuthProvider>> {
    match conf.auth_provider {
        AuthProviderKind::MacCookie => {
            let key = match &conf.mac_cookie_secret_hex {
                Some(hex) => decode_hex(hex)?,
                None => {
                    return Err(slurm_common::error::Error::Fatal(
                        "mac_cookie_secret_hex is required for the mac_cookie provider".into(),
                    ))
                }
            };
            Ok(Arc::new(MacCookieProvider::new(key, conf.credential_ttl_secs)))
        }
        AuthProviderKind::SignedToken => {
            let secret = conf
                .jwt_hs256_secret
                .as_ref()
                .ok_or_else(|| {
                    slurm_common::error::Error::Fatal(
                        "jwt_hs256_secret is required for the signed_token provider".into(),
                    )
                })?;
            Ok(Arc::new(SignedTokenProvider::hmac(
                secret.as_bytes(),
                conf.credential_ttl_secs,
                Box::new(PasswdResolver),
            )))
        }
    }
}

fn decode_hex(hex: &str) -> slurm_common::error::Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(slurm_common::error::Error::Fatal("mac_cookie_secret_hex has odd length".into()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| slurm_common::error::Error::Fatal("mac_cookie_secret_hex is not valid hex".into()))
        })
        .collect()
}
