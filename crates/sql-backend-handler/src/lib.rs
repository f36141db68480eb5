pub(crate) mod password_service;
pub(crate) mod sql_backend_handler;
pub(crate) mod sql_group_backend_handler;
pub(crate) mod sql_organization_backend_handler;
pub(crate) mod sql_user_backend_handler;

pub use sql_backend_handler::SqlBackendHandler;
pub mod model;
pub mod sql_tables;
