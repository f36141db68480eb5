use crate::{
    core::{
        dn::get_name_and_org_from_dn,
        error::{LdapError, LdapResult},
    },
    session::{BoundIdentity, SessionScope},
};
use idbridge_domain::types::BUILT_IN_ORGANIZATION;
use idbridge_domain_handlers::handler::LoginHandler;
use ldap3_proto::proto::{LdapBindCred, LdapBindRequest, LdapResultCode};
use tracing::{debug, instrument, warn};

/// Checks the credentials of a bind request and computes the scope of the
/// resulting session.
#[instrument(skip_all, level = "debug", fields(dn = %request.dn))]
pub(crate) async fn do_bind(
    login_handler: &impl LoginHandler,
    request: &LdapBindRequest,
) -> LdapResult<BoundIdentity> {
    let password = match &request.cred {
        LdapBindCred::Simple(password) => password,
        LdapBindCred::SASL(_) => {
            return Err(LdapError {
                code: LdapResultCode::AuthMethodNotSupported,
                message: "Authentication method not supported, please use simple authentication"
                    .to_string(),
            });
        }
    };
    let (name, organization) = get_name_and_org_from_dn(&request.dn)?;
    let identity = login_handler
        .check_credentials(&organization, &name, password)
        .await
        .map_err(|e| {
            warn!(r#"Bind failed for "{}": {:#}"#, &request.dn, e);
            LdapError {
                code: LdapResultCode::InvalidCredentials,
                message: "Invalid credentials".to_string(),
            }
        })?;
    let scope = if organization == BUILT_IN_ORGANIZATION || identity.is_global_admin {
        SessionScope::GlobalAdmin
    } else if identity.is_admin {
        SessionScope::OrgAdmin
    } else {
        SessionScope::User
    };
    debug!(?scope, "Success!");
    Ok(BoundIdentity {
        name,
        organization,
        scope,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use idbridge_domain::types::IdentityRecord;
    use idbridge_domain_handlers::error::DomainError;
    use idbridge_test_utils::MockTestBackendHandler;
    use ldap3_proto::proto::SaslCredentials;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    pub fn make_bind_request(dn: &str, password: &str) -> LdapBindRequest {
        LdapBindRequest {
            dn: dn.to_string(),
            cred: LdapBindCred::Simple(password.to_string()),
        }
    }

    pub fn expect_credentials(
        mock: &mut MockTestBackendHandler,
        organization: &str,
        name: &str,
        record: IdentityRecord,
    ) {
        mock.expect_check_credentials()
            .with(eq(organization.to_string()), eq(name.to_string()), eq("pass".to_string()))
            .times(1)
            .return_once(move |_, _, _| Ok(record));
    }

    #[tokio::test]
    async fn test_bind_user() {
        let mut mock = MockTestBackendHandler::new();
        expect_credentials(&mut mock, "acme", "alice", IdentityRecord::default());
        assert_eq!(
            do_bind(&mock, &make_bind_request("cn=alice,ou=acme,dc=example,dc=com", "pass")).await,
            Ok(BoundIdentity {
                name: "alice".to_string(),
                organization: "acme".to_string(),
                scope: SessionScope::User,
            })
        );
    }

    #[tokio::test]
    async fn test_bind_org_admin() {
        let mut mock = MockTestBackendHandler::new();
        expect_credentials(
            &mut mock,
            "acme",
            "boss",
            IdentityRecord {
                is_admin: true,
                ..Default::default()
            },
        );
        let identity = do_bind(&mock, &make_bind_request("cn=boss,ou=acme", "pass"))
            .await
            .unwrap();
        assert_eq!(identity.scope, SessionScope::OrgAdmin);
    }

    #[tokio::test]
    async fn test_bind_global_admin() {
        let mut mock = MockTestBackendHandler::new();
        expect_credentials(
            &mut mock,
            "acme",
            "root",
            IdentityRecord {
                is_global_admin: true,
                ..Default::default()
            },
        );
        let identity = do_bind(&mock, &make_bind_request("cn=root,ou=acme", "pass"))
            .await
            .unwrap();
        assert_eq!(identity.scope, SessionScope::GlobalAdmin);
    }

    #[tokio::test]
    async fn test_bind_built_in_organization_is_global_admin() {
        let mut mock = MockTestBackendHandler::new();
        expect_credentials(&mut mock, "built-in", "admin", IdentityRecord::default());
        let identity = do_bind(&mock, &make_bind_request("cn=admin,dc=example,dc=com", "pass"))
            .await
            .unwrap();
        assert_eq!(identity.organization, "built-in");
        assert_eq!(identity.scope, SessionScope::GlobalAdmin);
    }

    #[tokio::test]
    async fn test_bind_invalid_credentials_hides_reason() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_check_credentials()
            .times(1)
            .return_once(|_, _, _| {
                Err(DomainError::AuthenticationError(
                    "user alice does not exist".to_string(),
                ))
            });
        assert_eq!(
            do_bind(&mock, &make_bind_request("cn=alice,ou=acme", "pass")).await,
            Err(LdapError {
                code: LdapResultCode::InvalidCredentials,
                message: "Invalid credentials".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_bind_invalid_dn() {
        let mock = MockTestBackendHandler::new();
        assert_eq!(
            do_bind(&mock, &make_bind_request("ou=acme,dc=example", "pass"))
                .await
                .unwrap_err()
                .code,
            LdapResultCode::InvalidDNSyntax
        );
    }

    #[tokio::test]
    async fn test_bind_sasl_does_not_check_credentials() {
        let mock = MockTestBackendHandler::new();
        let request = LdapBindRequest {
            dn: "cn=alice,ou=acme".to_string(),
            cred: LdapBindCred::SASL(SaslCredentials {
                mechanism: "EXTERNAL".to_string(),
                credentials: vec![],
            }),
        };
        assert_eq!(
            do_bind(&mock, &request).await.unwrap_err().code,
            LdapResultCode::AuthMethodNotSupported
        );
    }
}
