use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{GroupStore, MemberStore};
use crate::error::{AppError, AppResult};
use crate::models::{Group, Membership};
use crate::utils::generate_invite_code;

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub group_name: String,
    #[serde(default)]
    pub is_public: bool,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateGroupRequest {
    pub group_name: Option<String>,
    pub is_public: Option<bool>,
    pub description: Option<String>,
    #[serde(default)]
    pub regenerate_invite_code: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchGroupQuery {
    pub keyword: Option<String>,
    pub sort_by: Option<SortBy>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Name,
    Members,
    Created,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// 返回给客户端的群组信息，邀请码仅对管理员可见
#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub group_name: String,
    pub is_public: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub is_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
}

impl GroupInfo {
    pub fn new(group: Group, is_admin: bool) -> Self {
        Self {
            invite_code: is_admin.then_some(group.invite_code),
            group_id: group.group_id,
            group_name: group.group_name,
            is_public: group.is_public,
            description: group.description,
            created_at: group.created_at,
            is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: Group,
    pub member_count: usize,
}

fn require_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("Group name cannot be blank"));
    }
    Ok(name.to_string())
}

impl Group {
    /// 创建群组，创建者成为管理员
    pub async fn create<S>(
        store: &S,
        req: CreateGroupRequest,
        creator_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Self>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        let group = Group {
            group_id: Uuid::new_v4().to_string(),
            group_name: require_name(&req.group_name)?,
            is_public: req.is_public,
            invite_code: generate_invite_code(),
            description: req.description.unwrap_or_default(),
            created_at: now,
        };
        let admin = Membership {
            user_id: creator_id.to_string(),
            group_id: group.group_id.clone(),
            is_admin: true,
            joined_at: now,
        };
        store.create_group_with_admin(&group, &admin).await?;

        tracing::info!("Group {} created by {}", group.group_id, creator_id);
        Ok(group)
    }

    pub async fn find_by_id<S>(store: &S, group_id: &str) -> AppResult<Self>
    where
        S: GroupStore + ?Sized,
    {
        store
            .find_group_by_id(group_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Group {} not found", group_id)))
    }

    pub async fn find_with_admin_status<S>(
        store: &S,
        group_id: &str,
        user_id: &str,
    ) -> AppResult<GroupInfo>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        let group = Self::find_by_id(store, group_id).await?;
        let is_admin = Membership::is_group_admin(store, user_id, group_id).await?;
        Ok(GroupInfo::new(group, is_admin))
    }

    /// 当前用户加入的群组
    pub async fn find_user_groups<S>(store: &S, user_id: &str) -> AppResult<Vec<GroupInfo>>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        let mut groups = Vec::new();
        for member in store.find_members_by_user(user_id).await? {
            // 群组删除后成员关系会残留，跳过
            match store.find_group_by_id(&member.group_id).await? {
                Some(group) => groups.push(GroupInfo::new(group, member.is_admin)),
                None => tracing::debug!("Skipping membership of deleted group {}", member.group_id),
            }
        }
        Ok(groups)
    }

    pub async fn find_public<S>(store: &S) -> AppResult<Vec<Self>>
    where
        S: GroupStore + ?Sized,
    {
        Ok(store.find_public_groups().await?)
    }

    pub async fn search<S>(store: &S, query: SearchGroupQuery) -> AppResult<Vec<GroupSummary>>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        let groups = match query.keyword.as_deref().map(str::trim) {
            Some(keyword) if !keyword.is_empty() => store.find_groups_by_keyword(keyword).await?,
            _ => store.find_public_groups().await?,
        };

        let mut summaries = Vec::with_capacity(groups.len());
        for group in groups {
            let member_count = store.find_members_by_group(&group.group_id).await?.len();
            summaries.push(GroupSummary {
                group,
                member_count,
            });
        }

        if let Some(sort_by) = query.sort_by {
            summaries.sort_by(|a, b| {
                let ord = compare(sort_by, a, b);
                match query.sort_order.unwrap_or_default() {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        Ok(summaries)
    }

    pub async fn update<S>(
        store: &S,
        group_id: &str,
        req: UpdateGroupRequest,
        acting_user_id: &str,
    ) -> AppResult<Self>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        let mut group = Self::find_by_id(store, group_id).await?;
        Membership::require_group_admin(store, acting_user_id, group_id).await?;

        if let Some(name) = req.group_name {
            group.group_name = require_name(&name)?;
        }
        if let Some(is_public) = req.is_public {
            group.is_public = is_public;
        }
        if let Some(description) = req.description {
            group.description = description;
        }
        if req.regenerate_invite_code {
            group.invite_code = generate_invite_code();
            tracing::info!("Invite code regenerated for group {}", group_id);
        }

        store.update_group(&group).await?;
        Ok(group)
    }

    /// 删除群组，成员关系和日程保留
    pub async fn remove<S>(store: &S, group_id: &str, acting_user_id: &str) -> AppResult<()>
    where
        S: GroupStore + MemberStore + ?Sized,
    {
        Self::find_by_id(store, group_id).await?;
        Membership::require_group_admin(store, acting_user_id, group_id).await?;
        store.delete_group(group_id).await?;
        tracing::info!("Group {} removed by {}", group_id, acting_user_id);
        Ok(())
    }
}

fn compare(sort_by: SortBy, a: &GroupSummary, b: &GroupSummary) -> Ordering {
    match sort_by {
        SortBy::Name => a.group.group_name.cmp(&b.group.group_name),
        SortBy::Members => a.member_count.cmp(&b.member_count),
        SortBy::Created => a.group.created_at.cmp(&b.group.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use chrono::Duration;

    fn request(name: &str, is_public: bool) -> CreateGroupRequest {
        CreateGroupRequest {
            group_name: name.into(),
            is_public,
            description: None,
        }
    }

    #[tokio::test]
    async fn creator_becomes_admin() {
        let store = MemoryStore::new();
        let group = Group::create(&store, request("Seoul trip", false), "u1", Utc::now())
            .await
            .unwrap();

        assert_eq!(group.invite_code.len(), 8);
        assert!(Membership::is_group_admin(&store, "u1", &group.group_id).await.unwrap());
        assert_eq!(store.find_admins_by_group(&group.group_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let store = MemoryStore::new();
        let err = Group::create(&store, request("   ", true), "u1", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn update_requires_admin_and_regenerates_code() {
        let store = MemoryStore::new();
        let group = Group::create(&store, request("Busan", true), "u1", Utc::now())
            .await
            .unwrap();
        Membership::join(&store, "u2", &group.group_id, None, Utc::now())
            .await
            .unwrap();

        let err = Group::update(
            &store,
            &group.group_id,
            UpdateGroupRequest {
                group_name: Some("Hijacked".into()),
                ..Default::default()
            },
            "u2",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut regenerated = group.clone();
        // 随机码可能碰巧相同，多试几次
        for _ in 0..5 {
            regenerated = Group::update(
                &store,
                &group.group_id,
                UpdateGroupRequest {
                    is_public: Some(false),
                    regenerate_invite_code: true,
                    ..Default::default()
                },
                "u1",
            )
            .await
            .unwrap();
            if regenerated.invite_code != group.invite_code {
                break;
            }
        }
        assert!(!regenerated.is_public);
        assert_ne!(regenerated.invite_code, group.invite_code);
    }

    #[tokio::test]
    async fn remove_keeps_memberships() {
        let store = MemoryStore::new();
        let group = Group::create(&store, request("Jeju", true), "u1", Utc::now())
            .await
            .unwrap();

        Group::remove(&store, &group.group_id, "u1").await.unwrap();

        assert!(store.find_group_by_id(&group.group_id).await.unwrap().is_none());
        assert!(store.find_member("u1", &group.group_id).await.unwrap().is_some());
        assert!(Group::find_user_groups(&store, "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_sorts_by_member_count() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let small = Group::create(&store, request("Hiking club", true), "u1", now)
            .await
            .unwrap();
        let large = Group::create(&store, request("Hiking crew", true), "u2", now + Duration::seconds(1))
            .await
            .unwrap();
        Group::create(&store, request("Hiking secret", false), "u3", now)
            .await
            .unwrap();
        Membership::join(&store, "u4", &large.group_id, None, now)
            .await
            .unwrap();

        let found = Group::search(
            &store,
            SearchGroupQuery {
                keyword: Some("hiking".into()),
                sort_by: Some(SortBy::Members),
                sort_order: Some(SortOrder::Desc),
            },
        )
        .await
        .unwrap();

        let ids: Vec<_> = found.iter().map(|s| s.group.group_id.as_str()).collect();
        assert_eq!(ids, vec![large.group_id.as_str(), small.group_id.as_str()]);
        assert_eq!(found[0].member_count, 2);
    }

    #[tokio::test]
    async fn invite_code_is_only_shown_to_admins() {
        let store = MemoryStore::new();
        let group = Group::create(&store, request("Private", false), "u1", Utc::now())
            .await
            .unwrap();
        Membership::join(&store, "u2", &group.group_id, Some(&group.invite_code), Utc::now())
            .await
            .unwrap();

        let admin_view = Group::find_with_admin_status(&store, &group.group_id, "u1")
            .await
            .unwrap();
        let member_view = Group::find_with_admin_status(&store, &group.group_id, "u2")
            .await
            .unwrap();
        assert_eq!(admin_view.invite_code.as_deref(), Some(group.invite_code.as_str()));
        assert!(member_view.invite_code.is_none());
        assert!(!member_view.is_admin);
    }
}
