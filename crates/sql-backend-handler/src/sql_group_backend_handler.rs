use crate::{
    model::{self, GroupColumn, UserColumn},
    sql_backend_handler::SqlBackendHandler,
};
use async_trait::async_trait;
use idbridge_domain::types::{Group, IdentityRecord};
use idbridge_domain_handlers::{error::Result, handler::GroupListerBackendHandler};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use tracing::instrument;

fn into_group(group: model::GroupModel, users: &[IdentityRecord]) -> Group {
    let group_id = format!("{}/{}", group.owner, group.name);
    let members = users
        .iter()
        .filter(|user| user.owner == group.owner && user.groups.contains(&group_id))
        .map(|user| user.name.clone())
        .collect();
    Group {
        owner: group.owner,
        name: group.name,
        display_name: group.display_name,
        members,
    }
}

#[async_trait]
impl GroupListerBackendHandler for SqlBackendHandler {
    #[instrument(skip(self), level = "debug", err)]
    async fn list_groups(&self, organization: Option<String>) -> Result<Vec<Group>> {
        let (group_condition, user_condition) = match &organization {
            Some(organization) => (
                Condition::all().add(GroupColumn::Owner.eq(organization.as_str())),
                Condition::all().add(UserColumn::Owner.eq(organization.as_str())),
            ),
            None => (Condition::all(), Condition::all()),
        };
        let groups = model::Group::find()
            .filter(group_condition)
            .order_by_asc(GroupColumn::Owner)
            .order_by_asc(GroupColumn::Name)
            .all(&self.sql_pool)
            .await?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let users = self.list_users(user_condition).await?;
        Ok(groups
            .into_iter()
            .map(|group| into_group(group, &users))
            .collect())
    }
}
