use crate::{
    model::{self, UserColumn},
    password_service::passwords_match,
    sql_backend_handler::SqlBackendHandler,
};
use async_trait::async_trait;
use idbridge_domain::types::{IdentityId, IdentityRecord, BUILT_IN_ORGANIZATION};
use idbridge_domain_handlers::{
    error::{DomainError, Result},
    handler::{IdentityBackendHandler, IdentityListerBackendHandler, LoginHandler},
    predicate::Predicate,
};
use sea_orm::{
    sea_query::{Expr, IntoCondition, SimpleExpr},
    ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{debug, instrument};

fn predicate_condition(predicate: Option<Predicate>) -> Condition {
    match predicate {
        Some(predicate) => {
            let (sql, args) = predicate.into_parts();
            Expr::cust_with_values(format!("({sql})"), args).into_condition()
        }
        None => SimpleExpr::Value(true.into()).into_condition(),
    }
}

fn split_identity_id(id: &IdentityId) -> Result<(&str, &str)> {
    id.split()
        .ok_or_else(|| DomainError::InternalError(format!(r#"Malformed identity id "{id}""#)))
}

impl SqlBackendHandler {
    async fn find_user(&self, organization: &str, name: &str) -> Result<Option<model::UserModel>> {
        Ok(model::User::find_by_id((organization.to_owned(), name.to_owned()))
            .one(&self.sql_pool)
            .await?)
    }

    pub(crate) async fn list_users(&self, condition: Condition) -> Result<Vec<IdentityRecord>> {
        Ok(model::User::find()
            .filter(condition)
            .order_by_asc(UserColumn::Owner)
            .order_by_asc(UserColumn::Name)
            .all(&self.sql_pool)
            .await?
            .into_iter()
            .map(IdentityRecord::from)
            .collect())
    }
}

#[async_trait]
impl LoginHandler for SqlBackendHandler {
    #[instrument(skip(self, password), level = "debug", err)]
    async fn check_credentials(
        &self,
        organization: &str,
        name: &str,
        password: &str,
    ) -> Result<IdentityRecord> {
        let user = self.find_user(organization, name).await?.ok_or_else(|| {
            DomainError::AuthenticationError(format!(r#"User "{organization}/{name}" doesn't exist"#))
        })?;
        if user.is_forbidden || user.is_deleted {
            return Err(DomainError::AuthenticationError(format!(
                r#"User "{organization}/{name}" is disabled"#
            )));
        }
        let mut record = IdentityRecord::from(user);
        if let Some(organization) = self.get_organization_model(organization).await? {
            record.password_type = organization.password_type.into();
        }
        if !passwords_match(&record, password)? {
            return Err(DomainError::AuthenticationError(format!(
                r#"Wrong password for "{organization}/{name}""#
            )));
        }
        debug!("Credentials accepted");
        Ok(record)
    }
}

#[async_trait]
impl IdentityBackendHandler for SqlBackendHandler {
    #[instrument(skip(self), level = "debug", err)]
    async fn get_identity(&self, id: &IdentityId) -> Result<Option<IdentityRecord>> {
        let (organization, name) = split_identity_id(id)?;
        Ok(self
            .find_user(organization, name)
            .await?
            .map(IdentityRecord::from))
    }

    #[instrument(skip(self), level = "debug", ret, err)]
    async fn check_permission(&self, requester: &IdentityId, target: &IdentityId) -> Result<bool> {
        if requester == target {
            return Ok(true);
        }
        let (requester_organization, requester_name) = split_identity_id(requester)?;
        let (target_organization, _) = split_identity_id(target)?;
        let requester = match self
            .find_user(requester_organization, requester_name)
            .await?
        {
            Some(user) => user,
            None => return Ok(false),
        };
        if requester.is_forbidden || requester.is_deleted {
            return Ok(false);
        }
        Ok(requester.owner == BUILT_IN_ORGANIZATION
            || (requester.is_admin && requester.owner == target_organization))
    }
}

#[async_trait]
impl IdentityListerBackendHandler for SqlBackendHandler {
    #[instrument(skip(self), level = "debug", err)]
    async fn list_identities_in_organization(
        &self,
        organization: &str,
        predicate: Option<Predicate>,
    ) -> Result<Vec<IdentityRecord>> {
        self.list_users(
            Condition::all()
                .add(UserColumn::Owner.eq(organization))
                .add(predicate_condition(predicate)),
        )
        .await
    }

    #[instrument(skip(self), level = "debug", err)]
    async fn list_all_identities(
        &self,
        predicate: Option<Predicate>,
    ) -> Result<Vec<IdentityRecord>> {
        self.list_users(predicate_condition(predicate)).await
    }
}
