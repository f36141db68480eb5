use crate::core::error::{LdapError, LdapResult};
use idbridge_domain::{
    filter::FilterExpression,
    types::{BUILT_IN_ORGANIZATION, WILDCARD},
};
use ldap3_proto::LdapResultCode;

/// RDN components of a DN, in order. Keys are lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DistinguishedName {
    parts: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Value of the last component with the given (lower-case) key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.parts
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.parts
    }
}

/// Splits a DN on `,` and each component on its first `=`. Components
/// without a `=` are skipped.
pub fn parse_distinguished_name(dn: &str) -> DistinguishedName {
    DistinguishedName {
        parts: dn
            .split(',')
            .filter_map(|part| part.split_once('='))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect(),
    }
}

/// Extracts the (name, organization) pair from a bind DN such as
/// `cn=alice,ou=acme,dc=example,dc=com`. A missing `ou` means the built-in
/// organization.
pub fn get_name_and_org_from_dn(dn: &str) -> LdapResult<(String, String)> {
    let parts = parse_distinguished_name(dn);
    let name = match parts.get("cn") {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => {
            return Err(LdapError {
                code: LdapResultCode::InvalidDNSyntax,
                message: format!(
                    r#"Missing cn in "{dn}", expected a DN like "cn=name,ou=organization,dc=example,dc=com""#
                ),
            });
        }
    };
    let organization = parts
        .get("ou")
        .unwrap_or(BUILT_IN_ORGANIZATION)
        .to_string();
    Ok((name, organization))
}

/// Organization and identity name a search is aimed at. Either can be the
/// wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub name: String,
    pub organization: String,
}

impl RequestTarget {
    pub fn is_wildcard_name(&self) -> bool {
        self.name == WILDCARD
    }
}

fn find_equality<'a>(filter: &'a FilterExpression, attribute: &str) -> Option<&'a str> {
    match filter {
        FilterExpression::Equality(attr, value)
            if attr.eq_ignore_ascii_case(attribute) && !value.is_empty() =>
        {
            Some(value.as_str())
        }
        FilterExpression::And(filters) => filters
            .iter()
            .find_map(|filter| find_equality(filter, attribute)),
        _ => None,
    }
}

/// Resolves the search base and filter into the organization and name being
/// looked up. The base must name an organization with `ou`; the name comes
/// from a `cn` (or failing that `uid`) equality of the filter, and is the
/// wildcard otherwise.
pub fn get_search_target(base: &str, filter: &FilterExpression) -> LdapResult<RequestTarget> {
    let base_dn = parse_distinguished_name(base);
    let organization = base_dn.get("ou").ok_or_else(|| LdapError {
        code: LdapResultCode::InvalidDNSyntax,
        message: format!(r#"The search base "{base}" has no ou component"#),
    })?;
    let name = find_equality(filter, "cn")
        .or_else(|| find_equality(filter, "uid"))
        .unwrap_or(WILDCARD);
    Ok(RequestTarget {
        name: name.to_string(),
        organization: organization.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target(base: &str, filter: &str) -> LdapResult<RequestTarget> {
        get_search_target(base, &filter.parse::<FilterExpression>().unwrap())
    }

    #[test]
    fn test_name_and_org() {
        assert_eq!(
            get_name_and_org_from_dn("cn=foo,ou=bar,dc=x,dc=y"),
            Ok(("foo".to_string(), "bar".to_string()))
        );
        assert_eq!(
            get_name_and_org_from_dn("cn=foo,dc=x"),
            Ok(("foo".to_string(), "built-in".to_string()))
        );
    }

    #[test]
    fn test_name_and_org_missing_cn() {
        let err = get_name_and_org_from_dn("ou=bar,dc=x").unwrap_err();
        assert_eq!(err.code, LdapResultCode::InvalidDNSyntax);
        assert_eq!(
            get_name_and_org_from_dn("cn=,ou=bar").unwrap_err().code,
            LdapResultCode::InvalidDNSyntax
        );
        assert_eq!(
            get_name_and_org_from_dn("").unwrap_err().code,
            LdapResultCode::InvalidDNSyntax
        );
    }

    #[test]
    fn test_name_and_org_empty_ou_is_kept() {
        assert_eq!(
            get_name_and_org_from_dn("cn=foo,ou=,dc=x"),
            Ok(("foo".to_string(), "".to_string()))
        );
    }

    #[test]
    fn test_parse_lenient() {
        let dn = parse_distinguished_name(" CN = foo ,garbage,ou=a,ou=b,x=y=z");
        assert_eq!(
            dn.parts(),
            &[
                ("cn".to_string(), "foo".to_string()),
                ("ou".to_string(), "a".to_string()),
                ("ou".to_string(), "b".to_string()),
                ("x".to_string(), "y=z".to_string()),
            ]
        );
        assert_eq!(dn.get("ou"), Some("b"));
        assert_eq!(dn.get("dc"), None);
    }

    #[test]
    fn test_search_target() {
        assert_eq!(
            target("ou=acme,dc=example,dc=com", "(&(objectClass=posixAccount)(cn=alice))"),
            Ok(RequestTarget {
                name: "alice".to_string(),
                organization: "acme".to_string(),
            })
        );
        assert_eq!(
            target("ou=acme,dc=example,dc=com", "(uid=bob)").unwrap().name,
            "bob"
        );
        assert_eq!(
            target("ou=acme,dc=example,dc=com", "(&(uid=bob)(cn=alice))")
                .unwrap()
                .name,
            "alice"
        );
        assert!(target("ou=*", "(mail=a@b.c)").unwrap().is_wildcard_name());
        assert!(target("ou=acme", "(|(cn=a)(cn=b))").unwrap().is_wildcard_name());
        assert_eq!(target("ou=*", "(cn=*)").unwrap().organization, "*");
    }

    #[test]
    fn test_search_target_without_ou() {
        assert_eq!(
            target("dc=example,dc=com", "(cn=alice)").unwrap_err().code,
            LdapResultCode::InvalidDNSyntax
        );
    }
}
