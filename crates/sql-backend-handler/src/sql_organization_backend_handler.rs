use crate::{
    model::{self, OrganizationColumn},
    sql_backend_handler::SqlBackendHandler,
};
use async_trait::async_trait;
use idbridge_domain::types::Organization;
use idbridge_domain_handlers::{error::Result, handler::OrganizationBackendHandler};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use tracing::instrument;

impl SqlBackendHandler {
    /// Organizations are keyed by (owner, name) but looked up by name only;
    /// the first match wins.
    pub(crate) async fn get_organization_model(
        &self,
        name: &str,
    ) -> Result<Option<model::OrganizationModel>> {
        Ok(model::Organization::find()
            .filter(OrganizationColumn::Name.eq(name))
            .order_by_asc(OrganizationColumn::Owner)
            .one(&self.sql_pool)
            .await?)
    }
}

#[async_trait]
impl OrganizationBackendHandler for SqlBackendHandler {
    #[instrument(skip(self), level = "debug", ret, err)]
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>> {
        Ok(self
            .get_organization_model(name)
            .await?
            .map(Organization::from))
    }
}
