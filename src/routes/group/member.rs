use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::{GroupStore, MemberStore, StoreError};
use crate::error::{AppError, AppResult};
use crate::models::{Group, Membership};

#[derive(Debug, Deserialize)]
pub struct JoinGroupRequest {
    pub group_id: Option<String>,
    pub invite_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub user_id: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
pub struct MemberInfo {
    pub user_id: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

impl From<Membership> for MemberInfo {
    fn from(member: Membership) -> Self {
        Self {
            user_id: member.user_id,
            is_admin: member.is_admin,
            joined_at: member.joined_at,
        }
    }
}

/// 群组权限规则
///
/// 所有修改群组的操作都先经过 `require_group_admin`。额外的两条约束：
/// 最后一个管理员不能退出，管理员不能踢出自己。
impl Membership {
    /// 没有成员关系时返回 false 而不是错误
    pub async fn is_group_admin<S>(store: &S, user_id: &str, group_id: &str) -> AppResult<bool>
    where
        S: MemberStore + ?Sized,
    {
        Ok(store
            .find_member(user_id, group_id)
            .await?
            .is_some_and(|m| m.is_admin))
    }

    pub async fn require_group_admin<S>(store: &S, user_id: &str, group_id: &str) -> AppResult<()>
    where
        S: MemberStore + ?Sized,
    {
        if !Self::is_group_admin(store, user_id, group_id).await? {
            tracing::debug!("User {} is not an admin of group {}", user_id, group_id);
            return Err(AppError::forbidden("Only group admins can perform this action"));
        }
        Ok(())
    }

    /// 公开群组不校验邀请码
    pub async fn join<S>(
        store: &S,
        user_id: &str,
        group_id: &str,
        invite_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppResult<Self>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        let group = Group::find_by_id(store, group_id).await?;

        if store.find_member(user_id, group_id).await?.is_some() {
            return Err(AppError::conflict("Already a member of this group"));
        }

        if !group.is_public && invite_code != Some(group.invite_code.as_str()) {
            return Err(AppError::bad_request("Invalid invite code"));
        }

        let member = Membership {
            user_id: user_id.to_string(),
            group_id: group_id.to_string(),
            is_admin: false,
            joined_at: now,
        };
        match store.create_member(&member).await {
            Ok(()) => {}
            // 并发加入时由唯一约束兜底
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::conflict("Already a member of this group"));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!("User {} joined group {}", user_id, group_id);
        Ok(member)
    }

    /// 只凭邀请码加入
    pub async fn join_by_invite_code<S>(
        store: &S,
        user_id: &str,
        invite_code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Group>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        let group = store
            .find_group_by_invite_code(invite_code.trim())
            .await?
            .ok_or_else(|| AppError::not_found("No group matches this invite code"))?;
        Self::join(store, user_id, &group.group_id, Some(invite_code.trim()), now).await?;
        Ok(group)
    }

    /// 不阻止管理员取消自己的管理员身份
    pub async fn update_role<S>(
        store: &S,
        group_id: &str,
        target_user_id: &str,
        is_admin: bool,
        acting_user_id: &str,
    ) -> AppResult<Self>
    where
        S: MemberStore + ?Sized,
    {
        Self::require_group_admin(store, acting_user_id, group_id).await?;

        let mut member = store
            .find_member(target_user_id, group_id)
            .await?
            .ok_or_else(|| AppError::not_found("Member not found in this group"))?;
        member.is_admin = is_admin;

        if !store.update_member(&member).await? {
            return Err(AppError::not_found("Member not found in this group"));
        }
        tracing::info!(
            "User {} set admin={} for {} in group {}",
            acting_user_id,
            is_admin,
            target_user_id,
            group_id
        );
        Ok(member)
    }

    pub async fn kick<S>(
        store: &S,
        group_id: &str,
        target_user_id: &str,
        acting_user_id: &str,
    ) -> AppResult<()>
    where
        S: MemberStore + ?Sized,
    {
        Self::require_group_admin(store, acting_user_id, group_id).await?;

        if target_user_id == acting_user_id {
            return Err(AppError::bad_request("Use leave instead of removing yourself"));
        }

        let target = store
            .find_member(target_user_id, group_id)
            .await?
            .ok_or_else(|| AppError::not_found("Member not found in this group"))?;

        if target.is_admin {
            return Err(AppError::forbidden("Admins cannot be removed by other admins"));
        }

        store.delete_member(target_user_id, group_id).await?;
        tracing::info!(
            "User {} removed {} from group {}",
            acting_user_id,
            target_user_id,
            group_id
        );
        Ok(())
    }

    pub async fn leave<S>(store: &S, group_id: &str, user_id: &str) -> AppResult<()>
    where
        S: MemberStore + ?Sized,
    {
        if store.find_member(user_id, group_id).await?.is_none() {
            return Err(AppError::not_found("Not a member of this group"));
        }

        if !store.delete_member_keeping_admin(user_id, group_id).await? {
            return Err(AppError::bad_request(
                "The last admin cannot leave the group",
            ));
        }
        tracing::info!("User {} left group {}", user_id, group_id);
        Ok(())
    }

    /// 仅群组成员可查看
    pub async fn list<S>(store: &S, group_id: &str, acting_user_id: &str) -> AppResult<Vec<Self>>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        Group::find_by_id(store, group_id).await?;
        if store.find_member(acting_user_id, group_id).await?.is_none() {
            return Err(AppError::forbidden("Only members can view the member list"));
        }
        Ok(store.find_members_by_group(group_id).await?)
    }
}
