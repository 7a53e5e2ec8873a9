use uuid::Uuid;

use herald_types::MANAGERS_GROUP;

pub fn is_manager(groups: &[String]) -> bool {
    groups.iter().any(|g| g == MANAGERS_GROUP)
}

/// The one access rule: owners may act on their own records, managers on anyone's.
pub fn may_access(caller: Uuid, owner: Uuid, groups: &[String]) -> bool {
    caller == owner || is_manager(groups)
}

/// Authenticated identity plus its group memberships, resolved per request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: Uuid,
    pub groups: Vec<String>,
}

impl Caller {
    pub fn is_manager(&self) -> bool {
        is_manager(&self.groups)
    }

    pub fn may_access(&self, owner: Uuid) -> bool {
        may_access(self.id, owner, &self.groups)
    }

    /// Owner filter for list queries: `None` means "everything".
    pub fn visibility_scope(&self) -> Option<String> {
        if self.is_manager() {
            None
        } else {
            Some(self.id.to_string())
        }
    }
}
