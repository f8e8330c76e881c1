use serde::{Deserialize, Serialize};

/// Guild-level permissions of the member issuing an admin action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub manage_guild: bool,
    pub administrator: bool,
}

impl Permissions {
    pub fn administrator() -> Self {
        Self {
            manage_guild: true,
            administrator: true,
        }
    }

    pub fn manager() -> Self {
        Self {
            manage_guild: true,
            administrator: false,
        }
    }

    /// Enabling, disabling and re-targeting the relay in a guild.
    pub fn can_manage_relay(&self) -> bool {
        self.manage_guild || self.administrator
    }

    /// Banning and unbanning users network-wide.
    pub fn can_moderate(&self) -> bool {
        self.administrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nobody_by_default() {
        let perms = Permissions::default();
        assert!(!perms.can_manage_relay());
        assert!(!perms.can_moderate());
    }

    #[test]
    fn manager_cannot_moderate() {
        let perms = Permissions::manager();
        assert!(perms.can_manage_relay());
        assert!(!perms.can_moderate());
    }

    #[test]
    fn administrator_can_do_everything() {
        let perms = Permissions::administrator();
        assert!(perms.can_manage_relay());
        assert!(perms.can_moderate());
    }
}
