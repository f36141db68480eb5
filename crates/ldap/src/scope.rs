use crate::{
    core::{
        dn::RequestTarget,
        error::{LdapError, LdapResult},
    },
    session::BoundIdentity,
};
use idbridge_domain::types::{IdentityId, WILDCARD};
use idbridge_domain_handlers::handler::IdentityBackendHandler;
use ldap3_proto::LdapResultCode;
use tracing::{debug, instrument, warn};

/// Set of identities a permitted search may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    AllOrganizations,
    Organization(String),
    Single(IdentityId),
}

fn insufficient_access_rights(message: String) -> LdapError {
    LdapError {
        code: LdapResultCode::InsufficentAccessRights,
        message,
    }
}

/// Decides what a session may see for the given target.
///
/// Listing a whole organization needs admin scope: global admins can list
/// any organization or all of them at once, organization admins only their
/// own. Any other lookup, including one by an admin for a specific name,
/// goes through the store's permission check.
#[instrument(skip_all, level = "debug", fields(name = %target.name, organization = %target.organization))]
pub(crate) async fn resolve_search_target(
    backend_handler: &impl IdentityBackendHandler,
    bound: Option<&BoundIdentity>,
    target: &RequestTarget,
) -> LdapResult<SearchTarget> {
    let bound = bound.ok_or_else(|| LdapError {
        code: LdapResultCode::UnwillingToPerform,
        message: "No user currently bound".to_string(),
    })?;
    if target.is_wildcard_name() && bound.is_org_admin() {
        if bound.is_global_admin() && target.organization == WILDCARD {
            return Ok(SearchTarget::AllOrganizations);
        }
        if bound.is_global_admin() || bound.organization == target.organization {
            return Ok(SearchTarget::Organization(target.organization.clone()));
        }
        return Err(insufficient_access_rights(format!(
            r#"Not allowed to list the organization "{}""#,
            target.organization
        )));
    }
    let requester = bound.identity_id();
    let target_id = IdentityId::new(&target.organization, &target.name);
    match backend_handler
        .check_permission(&requester, &target_id)
        .await
    {
        Ok(true) => {
            debug!(%requester, %target_id, "Permission granted");
            Ok(SearchTarget::Single(target_id))
        }
        Ok(false) => {
            warn!(%requester, %target_id, "Permission denied");
            Err(insufficient_access_rights(format!(
                r#"Not allowed to read "{target_id}""#
            )))
        }
        Err(e) => {
            warn!(%requester, %target_id, "Permission check failed: {:#}", e);
            Err(insufficient_access_rights(format!(
                r#"Not allowed to read "{target_id}""#
            )))
        }
    }
}

/// Decides whose groups a session may list: `None` stands for every
/// organization. Only admins may list groups, organization admins only
/// those of their own organization.
pub(crate) fn resolve_group_search_scope(
    bound: Option<&BoundIdentity>,
) -> LdapResult<Option<String>> {
    let bound = bound.ok_or_else(|| LdapError {
        code: LdapResultCode::UnwillingToPerform,
        message: "No user currently bound".to_string(),
    })?;
    if bound.is_global_admin() {
        Ok(None)
    } else if bound.is_org_admin() {
        Ok(Some(bound.organization.clone()))
    } else {
        Err(insufficient_access_rights(
            "Only administrators may list groups".to_string(),
        ))
    }
}
