use crate::sql_tables::DbConnection;
use async_trait::async_trait;
use idbridge_domain_handlers::handler::BackendHandler;

#[derive(Clone)]
pub struct SqlBackendHandler {
    pub(crate) sql_pool: DbConnection,
}

impl SqlBackendHandler {
    pub fn new(sql_pool: DbConnection) -> Self {
        SqlBackendHandler { sql_pool }
    }

    pub fn pool(&self) -> &DbConnection {
        &self.sql_pool
    }
}

#[async_trait]
impl BackendHandler for SqlBackendHandler {}
