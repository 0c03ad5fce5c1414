use crate::records::{Profile, Role};

/// Permission flags for one page, fetched once when the page is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_edit: bool,
    pub can_delete: bool,
    pub loaded: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Edit,
    Delete,
}

impl Capabilities {
    pub fn full() -> Self {
        Self {
            can_edit: true,
            can_delete: true,
            loaded: true,
        }
    }

    /// Resolve the flags for `page` from the current profile and its role.
    pub fn derive(profile: &Profile, role: Option<&Role>, page: &str) -> Self {
        let superadmin = profile.is_superuser
            || profile
                .role
                .as_ref()
                .map(|r| r.name == "Superadmin")
                .unwrap_or(false);
        if superadmin {
            return Self::full();
        }
        let perm = role.and_then(|r| r.permissions.iter().find(|p| p.page == page));
        Self {
            can_edit: perm.map(|p| p.can_edit).unwrap_or(false),
            can_delete: perm.map(|p| p.can_delete).unwrap_or(false),
            loaded: true,
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Edit => self.can_edit,
            Action::Delete => self.can_delete,
        }
    }

    /// Gate for a mutating handler: `Err` carries the message to show.
    pub fn check(&self, action: Action, noun: &str) -> Result<(), String> {
        if self.allows(action) {
            return Ok(());
        }
        let verb = match action {
            Action::Edit => "edit",
            Action::Delete => "delete",
        };
        Err(format!("You do not have permission to {verb} {noun}."))
    }
}
