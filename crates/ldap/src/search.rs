use crate::{
    core::{
        attributes::{
            UserFieldType, expand_attribute_wildcards, make_ldap_search_user_result_entry,
            map_user_field,
        },
        dn::get_search_target,
        error::{LdapError, LdapResult},
        filter::compile_filter,
        group::{expand_group_attribute_wildcards, make_ldap_search_group_result_entry},
    },
    scope::{SearchTarget, resolve_group_search_scope, resolve_search_target},
    session::{Session, SessionState},
};
use idbridge_domain::{filter::FilterExpression, types::IdentityRecord};
use idbridge_domain_handlers::{
    error::DomainError,
    handler::{
        BackendHandler, GroupListerBackendHandler, IdentityBackendHandler,
        IdentityListerBackendHandler, OrganizationBackendHandler,
    },
    predicate::Predicate,
};
use ldap3_proto::{
    LdapFilter, LdapResultCode, LdapSearchResultEntry, LdapSearchScope,
    proto::{LdapDerefAliases, LdapOp, LdapResult as LdapResultOp, LdapSearchRequest},
};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

pub(crate) fn make_search_request<S: Into<String>>(
    base: &str,
    filter: LdapFilter,
    attrs: Vec<S>,
) -> LdapSearchRequest {
    LdapSearchRequest {
        base: base.to_string(),
        scope: LdapSearchScope::Subtree,
        aliases: LdapDerefAliases::Never,
        sizelimit: 0,
        timelimit: 0,
        typesonly: false,
        filter,
        attrs: attrs.into_iter().map(Into::into).collect(),
    }
}

pub(crate) fn make_search_success() -> LdapOp {
    make_search_error(LdapResultCode::Success, "".to_string())
}

pub(crate) fn make_search_error(code: LdapResultCode, message: String) -> LdapOp {
    LdapOp::SearchResultDone(LdapResultOp {
        code,
        matcheddn: "".to_string(),
        message,
        referral: vec![],
    })
}

fn backend_error(context: &str, error: DomainError) -> LdapError {
    warn!("{context}: {:#}", error);
    LdapError {
        code: LdapResultCode::Other,
        message: format!("{context}, see the server logs"),
    }
}

async fn get_identities(
    backend_handler: &(impl IdentityBackendHandler + IdentityListerBackendHandler),
    target: SearchTarget,
    predicate: Predicate,
) -> LdapResult<Vec<IdentityRecord>> {
    debug!(?target, %predicate);
    match target {
        SearchTarget::AllOrganizations => backend_handler
            .list_all_identities(Some(predicate))
            .await
            .map_err(|e| backend_error("Error while listing identities", e)),
        SearchTarget::Organization(organization) => backend_handler
            .list_identities_in_organization(&organization, Some(predicate))
            .await
            .map_err(|e| backend_error("Error while listing identities", e)),
        SearchTarget::Single(id) => Ok(backend_handler
            .get_identity(&id)
            .await
            .map_err(|e| backend_error("Error while fetching the identity", e))?
            .into_iter()
            .collect()),
    }
}

/// Fills in the password scheme of each record from its organization.
async fn resolve_password_types(
    backend_handler: &impl OrganizationBackendHandler,
    records: &mut [IdentityRecord],
) -> LdapResult<()> {
    let owners: BTreeSet<String> = records.iter().map(|r| r.owner.clone()).collect();
    for owner in owners {
        let organization = backend_handler
            .get_organization(&owner)
            .await
            .map_err(|e| backend_error("Error while fetching the organization", e))?;
        match organization {
            Some(organization) => records
                .iter_mut()
                .filter(|r| r.owner == owner)
                .for_each(|r| r.password_type = organization.password_type.clone()),
            None => warn!(
                r#"Organization "{owner}" not found, keeping the password type of its identities"#
            ),
        }
    }
    Ok(())
}

async fn search_identities(
    backend_handler: &impl BackendHandler,
    session: &Session,
    request: &LdapSearchRequest,
    filter: &FilterExpression,
) -> LdapResult<Vec<LdapSearchResultEntry>> {
    let target = get_search_target(&request.base, filter)?;
    let search_target =
        resolve_search_target(backend_handler, session.bound_identity(), &target).await?;
    let predicate = compile_filter(filter).to_predicate();
    let mut records = get_identities(backend_handler, search_target, predicate).await?;
    let attributes = expand_attribute_wildcards(&request.attrs);
    if attributes
        .iter()
        .any(|a| map_user_field(a) == UserFieldType::UserPassword)
    {
        resolve_password_types(backend_handler, &mut records).await?;
    }
    Ok(records
        .iter()
        .map(|record| make_ldap_search_user_result_entry(record, &request.base, &attributes))
        .collect())
}

/// Lists the groups visible to the session. The filter is not applied
/// beyond selecting groups.
async fn search_groups(
    backend_handler: &impl GroupListerBackendHandler,
    session: &Session,
    request: &LdapSearchRequest,
) -> LdapResult<Vec<LdapSearchResultEntry>> {
    let organization = resolve_group_search_scope(session.bound_identity())?;
    let groups = backend_handler
        .list_groups(organization)
        .await
        .map_err(|e| backend_error("Error while listing groups", e))?;
    let attributes = expand_group_attribute_wildcards(&request.attrs);
    Ok(groups
        .iter()
        .map(|group| make_ldap_search_group_result_entry(group, &request.base, &attributes))
        .collect())
}

/// Runs a search for a bound session. Returns no message at all when the
/// request was cancelled before the results could be sent.
#[instrument(skip_all, level = "debug", fields(base = %request.base))]
pub(crate) async fn do_search(
    backend_handler: &impl BackendHandler,
    session: &mut Session,
    request: &LdapSearchRequest,
) -> LdapResult<Vec<LdapOp>> {
    let filter = FilterExpression::try_from(&request.filter).map_err(|e| LdapError {
        code: LdapResultCode::UnwillingToPerform,
        message: format!("Unsupported search filter: {e}"),
    })?;
    if filter.is_match_everything() {
        debug!("Match-everything filter, returning no entries");
        return Ok(vec![make_search_success()]);
    }
    let entries = if filter.is_group_search() {
        search_groups(backend_handler, session, request).await?
    } else {
        search_identities(backend_handler, session, request, &filter).await?
    };
    if session.is_cancelled() {
        info!("Request cancelled, dropping the search results");
        return Ok(Vec::new());
    }
    session.set_state(SessionState::StreamingResults);
    debug!(entries = entries.len());
    Ok(entries
        .into_iter()
        .map(LdapOp::SearchResultEntry)
        .chain(std::iter::once(make_search_success()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bind::tests::make_bind_request,
        handler::{
            tests::{
                make_bind_success, make_user_search_request, setup_bound_admin_handler,
                setup_bound_global_admin_handler, setup_bound_handler,
            },
            LdapHandler,
        },
    };
    use idbridge_domain::types::{Group, IdentityId, Organization, PasswordType};
    use idbridge_test_utils::MockTestBackendHandler;
    use ldap3_proto::LdapPartialAttribute;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn record(owner: &str, name: &str) -> IdentityRecord {
        IdentityRecord {
            id: format!("id-{name}"),
            owner: owner.to_string(),
            name: name.to_string(),
            email: format!("{name}@{owner}.com"),
            password: "secret".to_string(),
            updated_time: chrono::DateTime::from_timestamp(1_700_000_000, 0)
                .map(|t| t.naive_utc()),
            ..Default::default()
        }
    }

    fn entry(base: &str, record: &IdentityRecord, attributes: &[(&str, &str)]) -> LdapOp {
        LdapOp::SearchResultEntry(LdapSearchResultEntry {
            dn: format!("uid={},cn={},{}", record.id, record.name, base),
            attributes: attributes
                .iter()
                .map(|(atype, value)| LdapPartialAttribute {
                    atype: atype.to_string(),
                    vals: vec![value.as_bytes().to_vec()],
                })
                .collect(),
        })
    }

    fn is_search_done(op: &LdapOp) -> bool {
        matches!(op, LdapOp::SearchResultDone(_))
    }

    #[tokio::test]
    async fn test_search_unbound_makes_no_store_calls() {
        let mut ldap_handler = LdapHandler::new_for_tests(MockTestBackendHandler::new());
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Equality("cn".to_string(), "alice".to_string()),
            vec!["cn"],
        );
        assert_eq!(
            ldap_handler.handle_ldap_message(LdapOp::SearchRequest(request)).await,
            Some(vec![make_search_error(
                LdapResultCode::UnwillingToPerform,
                "No user currently bound".to_string()
            )])
        );
        assert_eq!(ldap_handler.session().state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_search_org_admin_own_organization() {
        let mut mock = MockTestBackendHandler::new();
        let alice = record("acme", "alice");
        let bob = record("acme", "bob");
        let records = vec![alice.clone(), bob.clone()];
        mock.expect_list_identities_in_organization()
            .with(
                eq("acme".to_string()),
                eq(Some(Predicate::new("1=1", vec![]))),
            )
            .times(1)
            .return_once(move |_, _| Ok(records));
        let mut ldap_handler = setup_bound_admin_handler(mock, "acme").await;
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::And(vec![]),
            vec!["cn", "mail"],
        );
        let base = "ou=acme,dc=example,dc=com";
        assert_eq!(
            ldap_handler.do_search(&request).await,
            Ok(vec![
                entry(
                    base,
                    &alice,
                    &[("cn", "alice"), ("title", "alice"), ("mail", "alice@acme.com")]
                ),
                entry(
                    base,
                    &bob,
                    &[("cn", "bob"), ("title", "bob"), ("mail", "bob@acme.com")]
                ),
                make_search_success(),
            ])
        );
        assert_eq!(ldap_handler.session().state(), SessionState::Done);
    }

    #[tokio::test]
    async fn test_search_org_admin_other_organization() {
        let mut ldap_handler =
            setup_bound_admin_handler(MockTestBackendHandler::new(), "acme").await;
        let request = make_user_search_request(
            "ou=other,dc=example,dc=com",
            LdapFilter::Present("mail".to_string()),
            vec!["cn"],
        );
        assert_eq!(
            ldap_handler.do_search(&request).await.unwrap_err().code,
            LdapResultCode::InsufficentAccessRights
        );
    }

    #[tokio::test]
    async fn test_search_global_admin_all_organizations() {
        let mut mock = MockTestBackendHandler::new();
        let records = vec![record("acme", "alice"), record("other", "carol")];
        mock.expect_list_all_identities()
            .with(eq(Some(Predicate::new(
                "email LIKE ?",
                vec!["%@%".to_string()],
            ))))
            .times(1)
            .return_once(move |_| Ok(records));
        let mut ldap_handler = setup_bound_global_admin_handler(mock).await;
        let request = make_user_search_request(
            "ou=*,dc=example,dc=com",
            LdapFilter::Substring(
                "mail".to_string(),
                ldap3_proto::proto::LdapSubstringFilter {
                    initial: None,
                    any: vec!["@".to_string()],
                    final_: None,
                },
            ),
            vec!["uid"],
        );
        let results = ldap_handler.do_search(&request).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(is_search_done(&results[2]));
        assert_eq!(results.iter().filter(|op| is_search_done(op)).count(), 1);
    }

    #[tokio::test]
    async fn test_search_single_identity() {
        let mut mock = MockTestBackendHandler::new();
        let alice = record("acme", "alice");
        let found = alice.clone();
        mock.expect_check_permission()
            .with(
                eq(IdentityId::new("acme", "alice")),
                eq(IdentityId::new("acme", "alice")),
            )
            .times(1)
            .return_once(|_, _| Ok(true));
        mock.expect_get_identity()
            .with(eq(IdentityId::new("acme", "alice")))
            .times(1)
            .return_once(move |_| Ok(Some(found)));
        let mut ldap_handler = setup_bound_handler(mock, "acme", "alice").await;
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::And(vec![
                LdapFilter::Equality("objectClass".to_string(), "posixAccount".to_string()),
                LdapFilter::Equality("uid".to_string(), "alice".to_string()),
            ]),
            vec!["homeDirectory"],
        );
        assert_eq!(
            ldap_handler.do_search(&request).await,
            Ok(vec![
                entry(
                    "ou=acme,dc=example,dc=com",
                    &alice,
                    &[("homeDirectory", "/home/alice")]
                ),
                make_search_success(),
            ])
        );
    }

    #[tokio::test]
    async fn test_search_single_identity_not_found() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_check_permission()
            .times(1)
            .return_once(|_, _| Ok(true));
        mock.expect_get_identity()
            .times(1)
            .return_once(|_| Ok(None));
        let mut ldap_handler = setup_bound_handler(mock, "acme", "alice").await;
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Equality("cn".to_string(), "ghost".to_string()),
            vec!["cn"],
        );
        assert_eq!(
            ldap_handler.do_search(&request).await,
            Ok(vec![make_search_success()])
        );
    }

    #[tokio::test]
    async fn test_search_password_uses_organization_type() {
        let mut mock = MockTestBackendHandler::new();
        let alice = record("acme", "alice");
        let records = vec![alice.clone()];
        mock.expect_list_identities_in_organization()
            .times(1)
            .return_once(move |_, _| Ok(records));
        mock.expect_get_organization()
            .with(eq("acme".to_string()))
            .times(1)
            .return_once(|_| {
                Ok(Some(Organization {
                    owner: "admin".to_string(),
                    name: "acme".to_string(),
                    password_type: PasswordType::Salt,
                }))
            });
        let mut ldap_handler = setup_bound_admin_handler(mock, "acme").await;
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Present("cn".to_string()),
            vec!["userPassword"],
        );
        assert_eq!(
            ldap_handler.do_search(&request).await,
            Ok(vec![
                entry(
                    "ou=acme,dc=example,dc=com",
                    &alice,
                    &[("userPassword", "{sha256}secret")]
                ),
                make_search_success(),
            ])
        );
    }

    #[tokio::test]
    async fn test_search_match_everything() {
        let mut ldap_handler =
            setup_bound_admin_handler(MockTestBackendHandler::new(), "acme").await;
        let request = make_user_search_request(
            "",
            LdapFilter::Present("OBJECTCLASS".to_string()),
            vec!["namingContexts"],
        );
        assert_eq!(
            ldap_handler.do_search(&request).await,
            Ok(vec![make_search_success()])
        );
    }

    #[tokio::test]
    async fn test_search_base_without_organization() {
        let mut ldap_handler =
            setup_bound_admin_handler(MockTestBackendHandler::new(), "acme").await;
        let request = make_user_search_request(
            "dc=example,dc=com",
            LdapFilter::Equality("cn".to_string(), "alice".to_string()),
            vec!["cn"],
        );
        assert_eq!(
            ldap_handler.do_search(&request).await.unwrap_err().code,
            LdapResultCode::InvalidDNSyntax
        );
    }

    #[tokio::test]
    async fn test_search_unsupported_filter() {
        let mut ldap_handler =
            setup_bound_admin_handler(MockTestBackendHandler::new(), "acme").await;
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Approx("cn".to_string(), "alice".to_string()),
            vec!["cn"],
        );
        assert_eq!(
            ldap_handler.do_search(&request).await.unwrap_err().code,
            LdapResultCode::UnwillingToPerform
        );
    }

    #[tokio::test]
    async fn test_search_backend_error() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_list_identities_in_organization()
            .times(1)
            .return_once(|_, _| Err(DomainError::InternalError("db down".to_string())));
        let mut ldap_handler = setup_bound_admin_handler(mock, "acme").await;
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Present("mail".to_string()),
            vec!["cn"],
        );
        let response = ldap_handler
            .handle_ldap_message(LdapOp::SearchRequest(request))
            .await
            .unwrap();
        let [LdapOp::SearchResultDone(result)] = response.as_slice() else {
            panic!("Expected a single SearchResultDone, got {response:?}");
        };
        assert_eq!(result.code, LdapResultCode::Other);
        assert!(!result.message.contains("db down"));
        assert!(ldap_handler.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_search_cancelled_session_writes_nothing() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_list_identities_in_organization()
            .times(1)
            .return_once(|_, _| Ok(vec![record("acme", "alice")]));
        let mut ldap_handler = setup_bound_admin_handler(mock, "acme").await;
        ldap_handler.session().cancellation_token().cancel();
        let request = make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Present("mail".to_string()),
            vec!["cn"],
        );
        assert_eq!(
            ldap_handler
                .handle_ldap_message(LdapOp::SearchRequest(request))
                .await,
            Some(vec![])
        );
    }

    #[tokio::test]
    async fn test_bind_and_search_sequence_is_idempotent() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_check_credentials()
            .with(
                eq("acme".to_string()),
                eq("admin".to_string()),
                eq("pass".to_string()),
            )
            .times(2)
            .returning(|_, _, _| {
                Ok(IdentityRecord {
                    is_admin: true,
                    ..Default::default()
                })
            });
        mock.expect_list_identities_in_organization()
            .times(2)
            .returning(|_, _| Ok(vec![record("acme", "alice"), record("acme", "bob")]));
        mock.expect_get_organization()
            .times(2)
            .returning(|_| Ok(None));
        let mut ldap_handler = LdapHandler::new_for_tests(mock);
        let bind = LdapOp::BindRequest(make_bind_request("cn=admin,ou=acme", "pass"));
        let search = LdapOp::SearchRequest(make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Or(vec![
                LdapFilter::Equality("mail".to_string(), "alice@acme.com".to_string()),
                LdapFilter::Present("mobile".to_string()),
            ]),
            vec!["*"],
        ));
        let mut rounds = Vec::new();
        for _ in 0..2 {
            let bound = ldap_handler.handle_ldap_message(bind.clone()).await;
            let results = ldap_handler.handle_ldap_message(search.clone()).await;
            rounds.push((bound, results));
        }
        assert_eq!(rounds[0], rounds[1]);
        assert_eq!(rounds[0].0, Some(make_bind_success()));
        assert_eq!(rounds[0].1.as_ref().map(Vec::len), Some(3));
    }

    fn staff() -> Group {
        Group {
            owner: "acme".to_string(),
            name: "staff".to_string(),
            display_name: "Staff".to_string(),
            members: vec!["alice".to_string()],
        }
    }

    fn group_search_request(attrs: Vec<&str>) -> LdapSearchRequest {
        make_user_search_request(
            "ou=acme,dc=example,dc=com",
            LdapFilter::Equality("objectClass".to_string(), "posixGroup".to_string()),
            attrs,
        )
    }

    #[tokio::test]
    async fn test_group_search_org_admin() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_list_groups()
            .with(eq(Some("acme".to_string())))
            .times(1)
            .return_once(|_| Ok(vec![staff()]));
        let mut ldap_handler = setup_bound_admin_handler(mock, "acme").await;
        assert_eq!(
            ldap_handler
                .do_search(&group_search_request(vec!["cn", "gidNumber", "memberUid"]))
                .await,
            Ok(vec![
                LdapOp::SearchResultEntry(LdapSearchResultEntry {
                    dn: "cn=staff,ou=acme,dc=example,dc=com".to_string(),
                    attributes: vec![
                        LdapPartialAttribute {
                            atype: "cn".to_string(),
                            vals: vec![b"staff".to_vec()],
                        },
                        LdapPartialAttribute {
                            atype: "gidNumber".to_string(),
                            vals: vec![b"1734124753".to_vec()],
                        },
                        LdapPartialAttribute {
                            atype: "memberUid".to_string(),
                            vals: vec![b"alice".to_vec()],
                        },
                    ],
                }),
                make_search_success(),
            ])
        );
    }

    #[tokio::test]
    async fn test_group_search_global_admin_lists_every_organization() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_list_groups()
            .with(eq(None))
            .times(1)
            .return_once(|_| Ok(vec![staff()]));
        let mut ldap_handler = setup_bound_global_admin_handler(mock).await;
        let results = ldap_handler
            .do_search(&group_search_request(vec![]))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let LdapOp::SearchResultEntry(entry) = &results[0] else {
            panic!("Expected an entry, got {results:?}");
        };
        assert_eq!(
            entry
                .attributes
                .iter()
                .map(|a| a.atype.as_str())
                .collect::<Vec<_>>(),
            vec!["cn", "gidNumber", "member", "memberUid", "objectClass"]
        );
    }

    #[tokio::test]
    async fn test_group_search_plain_user_is_denied() {
        let mut ldap_handler =
            setup_bound_handler(MockTestBackendHandler::new(), "acme", "alice").await;
        assert_eq!(
            ldap_handler
                .do_search(&group_search_request(vec!["cn"]))
                .await
                .unwrap_err()
                .code,
            LdapResultCode::InsufficentAccessRights
        );
    }

    #[tokio::test]
    async fn test_group_search_backend_error() {
        let mut mock = MockTestBackendHandler::new();
        mock.expect_list_groups()
            .times(1)
            .return_once(|_| Err(DomainError::InternalError("db down".to_string())));
        let mut ldap_handler = setup_bound_admin_handler(mock, "acme").await;
        let err = ldap_handler
            .do_search(&group_search_request(vec!["cn"]))
            .await
            .unwrap_err();
        assert_eq!(err.code, LdapResultCode::Other);
        assert!(!err.message.contains("db down"));
    }
}
