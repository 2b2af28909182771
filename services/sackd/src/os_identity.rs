//! Best-effort OS identity lookups backing `extra_identity` (§4.5):
//! primary group name and supplementary group memberships for a peer
//! uid/gid pair. `None` on any lookup failure — sackd mints without the
//! extra field rather than refusing the request.
//!
//! Also provides `PasswdResolver`, the `nss_passwd`-backed `UserResolver`
//! the signed-token provider needs to go between a JWT `sub` claim and a
//! uid/gid pair.

use slurm_auth::UserResolver;
use slurm_common::{Gid, Uid};
use std::ffi::CStr;

/// Formats `"primary=<name>;supplementary=<name>,<name>,..."` for the
/// given peer identity, or `None` if the passwd/group databases don't
/// resolve it (e.g. a uid with no NSS entry).
pub fn extra_identity_for(uid: u32, gid: u32) -> Option<Vec<u8>> {
    let username = username_of(uid)?;
    let primary = group_name_of(gid).unwrap_or_else(|| gid.to_string());
    let supplementary = supplementary_group_ids(&username, gid);

    let supplementary_str = supplementary.iter().map(|g| g.to_string()).collect::<Vec<_>>().join(",");
    Some(format!("primary={primary};supplementary={supplementary_str}").into_bytes())
}

fn username_of(uid: u32) -> Option<std::ffi::CString> {
    unsafe {
        let pwd = libc::getpwuid(uid);
        if pwd.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*pwd).pw_name).to_owned())
    }
}

fn group_name_of(gid: u32) -> Option<String> {
    unsafe {
        let grp = libc::getgrgid(gid);
        if grp.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*grp).gr_name).to_string_lossy().into_owned())
    }
}

fn supplementary_group_ids(username: &std::ffi::CStr, primary_gid: u32) -> Vec<libc::gid_t> {
    let mut ngroups: libc::c_int = 32;
    loop {
        let mut groups: Vec<libc::gid_t> = vec![0; ngroups as usize];
        let rc = unsafe {
            libc::getgrouplist(username.as_ptr(), primary_gid, groups.as_mut_ptr(), &mut ngroups)
        };
        if rc >= 0 {
            groups.truncate(ngroups.max(0) as usize);
            return groups;
        }
        if ngroups > 4096 {
            return Vec::new();
        }
    }
}

/// Resolves usernames against the system passwd database via `getpwnam`/
/// `getpwuid`, directly rather than caching, since sackd's nss lookups are
/// already off the connection's hot path.
pub struct PasswdResolver;

impl UserResolver for PasswdResolver {
    fn resolve(&self, username: &str) -> Option<(Uid, Gid)> {
        let c_username = std::ffi::CString::new(username).ok()?;
        unsafe {
            let pwd = libc::getpwnam(c_username.as_ptr());
            if pwd.is_null() {
                return None;
            }
            Some(((*pwd).pw_uid, (*pwd).pw_gid))
        }
    }

    fn username_of(&self, uid: Uid) -> Option<String> {
        username_of(uid).map(|c| c.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_the_calling_process_own_identity() {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        let extra = extra_identity_for(uid, gid);
        assert!(extra.is_some());
        let text = String::from_utf8(extra.unwrap()).unwrap();
        assert!(text.starts_with("primary="));
    }

    #[test]
    fn unknown_uid_yields_none() {
        assert!(extra_identity_for(u32::MAX - 1, u32::MAX - 1).is_none());
    }
}
