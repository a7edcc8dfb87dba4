use crate::concurrency::lock::LockMode;

/// Access level requested for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadOnly,
    /// The requester intends to mutate the page.
    ReadWrite,
}

impl Permission {
    pub fn is_write(&self) -> bool {
        matches!(self, Permission::ReadWrite)
    }
}

impl From<Permission> for LockMode {
    fn from(perm: Permission) -> Self {
        match perm {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_to_lock_mode() {
        assert_eq!(LockMode::from(Permission::ReadOnly), LockMode::Shared);
        assert_eq!(LockMode::from(Permission::ReadWrite), LockMode::Exclusive);
    }

    #[test]
    fn test_is_write() {
        assert!(Permission::ReadWrite.is_write());
        assert!(!Permission::ReadOnly.is_write());
    }
}
