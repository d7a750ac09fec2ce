use super::entry::Entry;
use super::errors::FsError;
use super::types::AccessMask;

const S_IRUSR: u32 = 0o400;
const S_IWUSR: u32 = 0o200;
const S_IXUSR: u32 = 0o100;
const S_IRGRP: u32 = 0o040;
const S_IWGRP: u32 = 0o020;
const S_IXGRP: u32 = 0o010;
const S_IROTH: u32 = 0o004;
const S_IWOTH: u32 = 0o002;
const S_IXOTH: u32 = 0o001;

const ROOT_UID: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    pub const ROOT: Credentials = Credentials { uid: 0, gid: 0 };

    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Identity of the running process.
    pub fn current() -> Self {
        // SAFETY: getuid/getgid never fail and touch no memory.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self { uid, gid }
    }

    pub fn is_root(&self) -> bool {
        self.uid == ROOT_UID
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

impl AccessMode {
    fn bits(self) -> (u32, u32, u32) {
        match self {
            AccessMode::Read => (S_IRUSR, S_IRGRP, S_IROTH),
            AccessMode::Write => (S_IWUSR, S_IWGRP, S_IWOTH),
            AccessMode::Execute => (S_IXUSR, S_IXGRP, S_IXOTH),
        }
    }
}

/// Exactly one class applies: owner if the uid matches, else group if the gid
/// matches, else other. Root passes every check.
fn is_allowed(
    mode: AccessMode,
    bits: u32,
    caller_uid: u32,
    caller_gid: u32,
    owner_uid: u32,
    owner_gid: u32,
) -> bool {
    if caller_uid == ROOT_UID {
        return true;
    }

    let (owner_bit, group_bit, other_bit) = mode.bits();
    let bit = if caller_uid == owner_uid {
        owner_bit
    } else if caller_gid == owner_gid {
        group_bit
    } else {
        other_bit
    };
    bits & bit != 0
}

pub fn can_read(bits: u32, caller_uid: u32, caller_gid: u32, owner_uid: u32, owner_gid: u32) -> bool {
    is_allowed(AccessMode::Read, bits, caller_uid, caller_gid, owner_uid, owner_gid)
}

pub fn can_write(bits: u32, caller_uid: u32, caller_gid: u32, owner_uid: u32, owner_gid: u32) -> bool {
    is_allowed(AccessMode::Write, bits, caller_uid, caller_gid, owner_uid, owner_gid)
}

pub fn can_execute(
    bits: u32,
    caller_uid: u32,
    caller_gid: u32,
    owner_uid: u32,
    owner_gid: u32,
) -> bool {
    is_allowed(AccessMode::Execute, bits, caller_uid, caller_gid, owner_uid, owner_gid)
}

/// POSIX chown restriction: non-root callers may only confirm the current
/// uid, and may move the group only when they own the entry.
pub fn can_change_ownership(
    current_uid: u32,
    current_gid: u32,
    caller_uid: u32,
    new_uid: u32,
    new_gid: u32,
) -> bool {
    if caller_uid == ROOT_UID {
        return true;
    }
    new_uid == current_uid && (new_gid == current_gid || caller_uid == current_uid)
}

pub fn check_access(entry: &Entry, creds: &Credentials, mask: AccessMask) -> Result<(), FsError> {
    let (bits, uid, gid) = (entry.mode(), entry.uid(), entry.gid());
    let requested: [(bool, fn(u32, u32, u32, u32, u32) -> bool); 3] = [
        (mask.read, can_read),
        (mask.write, can_write),
        (mask.execute, can_execute),
    ];

    for (wanted, allowed) in requested {
        if wanted && !allowed(bits, creds.uid, creds.gid, uid, gid) {
            return Err(FsError::AccessDenied);
        }
    }
    Ok(())
}

pub fn check_ownership(entry: &Entry, creds: &Credentials) -> Result<(), FsError> {
    if creds.is_root() || creds.uid == entry.uid() {
        Ok(())
    } else {
        Err(FsError::PermissionDenied)
    }
}

pub fn validate_mode(mode: u32) -> u32 {
    mode & 0o7777
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_bypasses_all_bits() {
        assert!(can_read(0o000, 0, 0, 1000, 1000));
        assert!(can_write(0o000, 0, 0, 1000, 1000));
        assert!(can_execute(0o000, 0, 0, 1000, 1000));
    }

    #[test]
    fn test_owner_bits() {
        assert!(can_read(0o400, 1000, 1000, 1000, 1000));
        assert!(!can_write(0o400, 1000, 1000, 1000, 1000));
        // Owner class is selected even when the group bits would allow it.
        assert!(!can_write(0o470, 1000, 1000, 1000, 1000));
    }

    #[test]
    fn test_group_bits() {
        assert!(can_write(0o020, 2000, 1000, 1000, 1000));
        assert!(!can_write(0o002, 2000, 1000, 1000, 1000));
    }

    #[test]
    fn test_other_bits_only_for_strangers() {
        assert!(can_execute(0o001, 2000, 2000, 1000, 1000));
        assert!(!can_execute(0o770, 2000, 2000, 1000, 1000));
        assert!(!can_read(0o770, 2000, 2000, 1000, 1000));
    }

    #[test]
    fn test_chown_rules() {
        // root may do anything
        assert!(can_change_ownership(1000, 1000, 0, 5, 6));
        // owner may confirm uid and move group
        assert!(can_change_ownership(1000, 1000, 1000, 1000, 2000));
        // owner may not give the file away
        assert!(!can_change_ownership(1000, 1000, 1000, 2000, 1000));
        // stranger may confirm current ownership but not move group
        assert!(can_change_ownership(1000, 1000, 3000, 1000, 1000));
        assert!(!can_change_ownership(1000, 1000, 3000, 1000, 3000));
    }

    #[test]
    fn test_validate_mode_strips_type_bits() {
        assert_eq!(validate_mode(0o100644), 0o644);
        assert_eq!(validate_mode(0o4755), 0o4755);
    }
}
