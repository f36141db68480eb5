use crate::{error::Result, predicate::Predicate};
use async_trait::async_trait;
use idbridge_domain::types::{Group, IdentityId, IdentityRecord, Organization};

#[async_trait]
pub trait LoginHandler: Send + Sync {
    /// Checks the password of `name` inside `organization`, returning the
    /// matching record. Fails with `DomainError::AuthenticationError` when
    /// the identity does not exist or the password is wrong.
    async fn check_credentials(
        &self,
        organization: &str,
        name: &str,
        password: &str,
    ) -> Result<IdentityRecord>;
}

#[async_trait]
pub trait IdentityBackendHandler: Send + Sync {
    async fn get_identity(&self, id: &IdentityId) -> Result<Option<IdentityRecord>>;
    /// Whether `requester` may read `target`.
    async fn check_permission(&self, requester: &IdentityId, target: &IdentityId)
        -> Result<bool>;
}

#[async_trait]
pub trait IdentityListerBackendHandler: Send + Sync {
    async fn list_identities_in_organization(
        &self,
        organization: &str,
        predicate: Option<Predicate>,
    ) -> Result<Vec<IdentityRecord>>;
    async fn list_all_identities(&self, predicate: Option<Predicate>)
        -> Result<Vec<IdentityRecord>>;
}

#[async_trait]
pub trait GroupListerBackendHandler: Send + Sync {
    /// Groups owned by `organization`, or by every organization when `None`,
    /// with their members filled in.
    async fn list_groups(&self, organization: Option<String>) -> Result<Vec<Group>>;
}

#[async_trait]
pub trait OrganizationBackendHandler: Send + Sync {
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>>;
}

#[async_trait]
pub trait BackendHandler:
    Send
    + Sync
    + LoginHandler
    + IdentityBackendHandler
    + IdentityListerBackendHandler
    + GroupListerBackendHandler
    + OrganizationBackendHandler
{
}
