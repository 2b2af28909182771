//! Directory and socket-node setup (§4.5 rules 1-3), run once before the
//! conmgr listener is registered.

use libc::gid_t;
use slog::{info, warn, Logger};
use slurm_common::error::{Error, Result};
use std::ffi::CString;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

pub const SLURM_RUN_DIR: &str = "/run/slurm";
const RUN_DIR_MODE: u32 = 0o755;
pub const SOCKET_MODE: u32 = 0o777;

pub fn bootstrap(privileged_uid: u32, socket_path: &Path, logger: &Logger) -> Result<()> {
    ensure_run_exists()?;
    ensure_slurm_dir(privileged_uid, logger)?;
    remove_stale_socket(socket_path)?;
    Ok(())
}

fn ensure_run_exists() -> Result<()> {
    let meta = fs::metadata("/run").map_err(|_| Error::Fatal("/run does not exist".into()))?;
    if !meta.is_dir() {
        return Err(Error::Fatal("/run exists but is not a directory".into()));
    }
    Ok(())
}

fn ensure_slurm_dir(privileged_uid: u32, logger: &Logger) -> Result<()> {
    let path = Path::new(SLURM_RUN_DIR);
    match fs::metadata(path) {
        Ok(meta) if meta.uid() == privileged_uid => Ok(()),
        Ok(meta) if meta.uid() == 0 => {
            warn!(
                logger,
                "slurm run dir is owned by root, not the configured privileged uid";
                "path" => SLURM_RUN_DIR, "configured_uid" => privileged_uid,
            );
            Ok(())
        }
        Ok(meta) => Err(Error::Fatal(format!(
            "{SLURM_RUN_DIR} is owned by uid {}, refusing to continue",
            meta.uid()
        ))),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir(path).map_err(Error::from)?;
            fs::set_permissions(path, fs::Permissions::from_mode(RUN_DIR_MODE)).map_err(Error::from)?;
            chown_path(path, privileged_uid)?;
            info!(logger, "created slurm run dir"; "path" => SLURM_RUN_DIR);
            Ok(())
        }
        Err(err) => Err(Error::from(err)),
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::from(err)),
    }
}

fn chown_path(path: &Path, uid: u32) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Fatal("path contains an interior NUL".into()))?;
    let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid_t::MAX) };
    if rc < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn removes_a_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sack.socket");
        UnixListener::bind(&path).unwrap();
        assert!(path.exists());
        remove_stale_socket(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_socket_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.socket");
        remove_stale_socket(&path).unwrap();
    }
}
