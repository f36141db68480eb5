use async_trait::async_trait;
use idbridge_domain::types::{Group, IdentityId, IdentityRecord, Organization};
use idbridge_domain_handlers::{error::Result, handler::*, predicate::Predicate};

mockall::mock! {
    pub TestBackendHandler{}
    impl Clone for TestBackendHandler {
        fn clone(&self) -> Self;
    }
    #[async_trait]
    impl LoginHandler for TestBackendHandler {
        async fn check_credentials(
            &self,
            organization: &str,
            name: &str,
            password: &str,
        ) -> Result<IdentityRecord>;
    }
    #[async_trait]
    impl IdentityBackendHandler for TestBackendHandler {
        async fn get_identity(&self, id: &IdentityId) -> Result<Option<IdentityRecord>>;
        async fn check_permission(
            &self,
            requester: &IdentityId,
            target: &IdentityId,
        ) -> Result<bool>;
    }
    #[async_trait]
    impl IdentityListerBackendHandler for TestBackendHandler {
        async fn list_identities_in_organization(
            &self,
            organization: &str,
            predicate: Option<Predicate>,
        ) -> Result<Vec<IdentityRecord>>;
        async fn list_all_identities(
            &self,
            predicate: Option<Predicate>,
        ) -> Result<Vec<IdentityRecord>>;
    }
    #[async_trait]
    impl GroupListerBackendHandler for TestBackendHandler {
        async fn list_groups(&self, organization: Option<String>) -> Result<Vec<Group>>;
    }
    #[async_trait]
    impl OrganizationBackendHandler for TestBackendHandler {
        async fn get_organization(&self, name: &str) -> Result<Option<Organization>>;
    }
    #[async_trait]
    impl BackendHandler for TestBackendHandler {}
}

/// Sends `tracing` output to the test harness. Every test may call it.
pub fn init_test_logging() {
    if let Err(e) = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
    {
        log::warn!("Could not set up test logging: {:#}", e);
    }
}
