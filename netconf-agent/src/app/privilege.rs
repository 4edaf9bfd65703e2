use nix::unistd::{getuid, initgroups, setgid, setuid, Uid, User};
use std::ffi::CString;

#[derive(Debug, thiserror::Error)]
pub enum PrivilegeError {
    #[error("user name {0:?} contains a NUL byte")]
    InvalidName(String),
    #[error("user {0} does not exist")]
    UnknownUser(String),
    #[error("passwd lookup for {user} failed: {source}")]
    Lookup { user: String, source: nix::Error },
    #[error("switching to {user} failed: {source}")]
    Switch { user: String, source: nix::Error },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrivilegeOutcome {
    /// Not running as root; the transport already switched users.
    Unprivileged,
    Switched { uid: u32, gid: u32 },
}

/// Drops root privileges to `username` for the rest of the process.
pub fn drop_privileges(username: &str) -> Result<PrivilegeOutcome, PrivilegeError> {
    drop_privileges_from(getuid(), username)
}

fn drop_privileges_from(current: Uid, username: &str) -> Result<PrivilegeOutcome, PrivilegeError> {
    if !current.is_root() {
        return Ok(PrivilegeOutcome::Unprivileged);
    }
    let c_name =
        CString::new(username).map_err(|_| PrivilegeError::InvalidName(username.to_string()))?;
    let user = User::from_name(username)
        .map_err(|source| PrivilegeError::Lookup {
            user: username.to_string(),
            source,
        })?
        .ok_or_else(|| PrivilegeError::UnknownUser(username.to_string()))?;
    // Groups first: after setuid the process may no longer change them.
    initgroups(&c_name, user.gid).map_err(|source| PrivilegeError::Switch {
        user: username.to_string(),
        source,
    })?;
    setgid(user.gid).map_err(|source| PrivilegeError::Switch {
        user: username.to_string(),
        source,
    })?;
    setuid(user.uid).map_err(|source| PrivilegeError::Switch {
        user: username.to_string(),
        source,
    })?;
    Ok(PrivilegeOutcome::Switched {
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
    })
}
