//! Group membership rules.
//!
//! Every group operation first resolves the caller's [`GroupRole`] from the
//! group row and the caller's membership row, then asks one of the checks
//! below whether the operation may proceed.

use crate::error::{ServiceError, ServiceResult};

/// Standing of a user within one group, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroupRole {
    Outsider,
    Member,
    Moderator,
    Admin,
}

impl GroupRole {
    /// `is_moderator` is `None` when the user has no membership row.
    pub fn resolve(admin_id: i64, user_id: i64, is_moderator: Option<bool>) -> Self {
        if admin_id == user_id {
            return GroupRole::Admin;
        }
        match is_moderator {
            Some(true) => GroupRole::Moderator,
            Some(false) => GroupRole::Member,
            None => GroupRole::Outsider,
        }
    }

    pub fn is_member(self) -> bool {
        self >= GroupRole::Member
    }

    pub fn can_moderate(self) -> bool {
        self >= GroupRole::Moderator
    }

    pub fn is_admin(self) -> bool {
        self == GroupRole::Admin
    }
}

/// Messages and discussions: the author, a moderator or the admin.
pub fn can_delete_content(role: GroupRole, author_id: i64, caller: i64) -> bool {
    author_id == caller || role.can_moderate()
}

pub fn check_admin(role: GroupRole, action: &str) -> ServiceResult<()> {
    if role.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::forbidden(format!(
            "Only group admin can {}",
            action
        )))
    }
}

pub fn check_member(role: GroupRole, action: &str) -> ServiceResult<()> {
    if role.is_member() {
        Ok(())
    } else {
        Err(ServiceError::forbidden(format!(
            "Only group members can {}",
            action
        )))
    }
}

pub fn check_join(role: GroupRole) -> ServiceResult<()> {
    if role.is_member() {
        Err(ServiceError::bad_request("Already a member of this group"))
    } else {
        Ok(())
    }
}

pub fn check_leave(role: GroupRole) -> ServiceResult<()> {
    match role {
        GroupRole::Admin => Err(ServiceError::forbidden(
            "Group admin cannot leave the group. Transfer admin role first.",
        )),
        GroupRole::Outsider => Err(ServiceError::bad_request("Not a member of this group")),
        GroupRole::Member | GroupRole::Moderator => Ok(()),
    }
}

pub fn check_remove_member(caller: GroupRole, target: GroupRole) -> ServiceResult<()> {
    if !caller.can_moderate() {
        return Err(ServiceError::forbidden(
            "Only the admin or a moderator can remove members",
        ));
    }
    match target {
        GroupRole::Admin => Err(ServiceError::forbidden("Group admin cannot be removed")),
        GroupRole::Moderator if !caller.is_admin() => Err(ServiceError::forbidden(
            "Only group admin can remove a moderator",
        )),
        GroupRole::Outsider => Err(ServiceError::bad_request("Not a member of this group")),
        GroupRole::Member | GroupRole::Moderator => Ok(()),
    }
}

pub fn check_set_moderator(caller: GroupRole, target: GroupRole, moderator: bool) -> ServiceResult<()> {
    check_admin(
        caller,
        if moderator {
            "add moderators"
        } else {
            "remove moderators"
        },
    )?;
    match target {
        GroupRole::Outsider => Err(ServiceError::bad_request("User is not a member of this group")),
        GroupRole::Admin if !moderator => {
            Err(ServiceError::forbidden("Group admin cannot be demoted"))
        }
        _ => Ok(()),
    }
}

pub fn check_transfer(caller: GroupRole, new_admin: GroupRole) -> ServiceResult<()> {
    check_admin(caller, "transfer ownership")?;
    match new_admin {
        GroupRole::Outsider => Err(ServiceError::bad_request("New admin must be a group member")),
        GroupRole::Admin => Err(ServiceError::bad_request("User already administers this group")),
        GroupRole::Member | GroupRole::Moderator => Ok(()),
    }
}
