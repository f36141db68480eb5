use chrono::{NaiveDateTime, Utc};
use idbridge_domain::types::{split_object_id, IdentityRecord};
use idbridge_domain_handlers::predicate::StoreColumn;
use ldap3_proto::{LdapPartialAttribute, LdapSearchResultEntry};
use std::collections::HashSet;
use tracing::{debug, instrument};

const USER_OBJECT_CLASSES: &[&str] = &[
    "top",
    "posixAccount",
    "shadowAccount",
    "person",
    "organizationalPerson",
    "inetOrgPerson",
    "apple-user",
    "sambaSamAccount",
    "sambaIdmapEntry",
    "extensibleObject",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFieldType {
    Name,
    DisplayName,
    FirstName,
    LastName,
    Email,
    Phone,
    Title,
    LoginDisabled,
    UserPassword,
    UidNumber,
    GidNumber,
    HomeDirectory,
    LoginShell,
    ShadowLastChange,
    PwdChangedTime,
    ShadowExpire,
    MemberOf,
    SshPublicKey,
    Constant(&'static [&'static str]),
    NoMatch,
}

/// Maps a directory attribute name, in any case, to the identity field it
/// reads.
pub fn map_user_field(attribute: &str) -> UserFieldType {
    match attribute.to_ascii_lowercase().as_str() {
        "cn" | "uid" => UserFieldType::Name,
        "displayname" | "gecos" | "description" => UserFieldType::DisplayName,
        "givenname" => UserFieldType::FirstName,
        "sn" => UserFieldType::LastName,
        "email" | "mail" => UserFieldType::Email,
        "mobile" | "telephonenumber" => UserFieldType::Phone,
        "title" => UserFieldType::Title,
        "logindisabled" => UserFieldType::LoginDisabled,
        "userpassword" => UserFieldType::UserPassword,
        "uidnumber" => UserFieldType::UidNumber,
        "gidnumber" => UserFieldType::GidNumber,
        "homedirectory" => UserFieldType::HomeDirectory,
        "loginshell" => UserFieldType::LoginShell,
        "shadowlastchange" => UserFieldType::ShadowLastChange,
        "pwdchangedtime" => UserFieldType::PwdChangedTime,
        "shadowexpire" => UserFieldType::ShadowExpire,
        "shadowmin" | "shadowinactive" | "shadowflag" => UserFieldType::Constant(&["0"]),
        "shadowmax" => UserFieldType::Constant(&["99999"]),
        "shadowwarning" => UserFieldType::Constant(&["7"]),
        "memberof" => UserFieldType::MemberOf,
        "sshpublickey" => UserFieldType::SshPublicKey,
        "objectclass" => UserFieldType::Constant(USER_OBJECT_CLASSES),
        _ => UserFieldType::NoMatch,
    }
}

impl UserFieldType {
    /// Store column a filter on this field compiles against. Computed
    /// fields are not searchable.
    pub fn store_column(self) -> Option<StoreColumn> {
        Some(match self {
            UserFieldType::Name => StoreColumn::Name,
            UserFieldType::DisplayName => StoreColumn::DisplayName,
            UserFieldType::FirstName => StoreColumn::FirstName,
            UserFieldType::LastName => StoreColumn::LastName,
            UserFieldType::Email => StoreColumn::Email,
            UserFieldType::Phone => StoreColumn::Phone,
            UserFieldType::Title => StoreColumn::Title,
            UserFieldType::LoginDisabled => StoreColumn::IsForbidden,
            UserFieldType::UserPassword
            | UserFieldType::UidNumber
            | UserFieldType::GidNumber
            | UserFieldType::HomeDirectory
            | UserFieldType::LoginShell
            | UserFieldType::ShadowLastChange
            | UserFieldType::PwdChangedTime
            | UserFieldType::ShadowExpire
            | UserFieldType::MemberOf
            | UserFieldType::SshPublicKey
            | UserFieldType::Constant(_)
            | UserFieldType::NoMatch => return None,
        })
    }
}

/// Attributes returned for `*` or an empty attribute list. `cn` and `uid`
/// are only returned when asked for by name.
const ALL_USER_ATTRIBUTE_KEYS: &[&str] = &[
    "displayName",
    "givenName",
    "sn",
    "email",
    "mail",
    "mobile",
    "telephoneNumber",
    "title",
    "gecos",
    "description",
    "loginDisabled",
    "userPassword",
    "uidNumber",
    "gidNumber",
    "homeDirectory",
    "loginShell",
    "shadowLastChange",
    "pwdChangedTime",
    "shadowMin",
    "shadowMax",
    "shadowWarning",
    "shadowExpire",
    "shadowInactive",
    "shadowFlag",
    "memberOf",
    "sshPublicKey",
    "objectClass",
];

/// 32-bit FNV-1a, used to derive stable POSIX ids from names.
pub fn fnv1a_32(value: &str) -> u32 {
    value.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Renders the stored password as `{scheme}hash`, or the raw value for
/// clear-text storage.
pub fn get_password_with_type(record: &IdentityRecord) -> String {
    match record.password_type.hash_prefix() {
        None => record.password.clone(),
        Some(prefix) => format!("{{{prefix}}}{}", record.password),
    }
}

/// Owner and name of one of the identity's groups. An id without an owner
/// refers to a group of the identity's own organization.
fn split_group_id<'a>(record: &'a IdentityRecord, group_id: &'a str) -> (&'a str, &'a str) {
    split_object_id(group_id).unwrap_or((record.owner.as_str(), group_id))
}

fn updated_time(record: &IdentityRecord) -> NaiveDateTime {
    record
        .updated_time
        .unwrap_or_else(|| Utc::now().naive_utc())
}

/// Values of one attribute for an identity. Unknown attributes yield a
/// single empty value.
pub fn get_user_attribute(record: &IdentityRecord, attribute: &str) -> Vec<String> {
    match map_user_field(attribute) {
        UserFieldType::Name => vec![record.name.clone()],
        UserFieldType::DisplayName => vec![record.display_name.clone()],
        UserFieldType::FirstName => vec![record.first_name.clone()],
        UserFieldType::LastName => vec![record.last_name.clone()],
        UserFieldType::Email => vec![record.email.clone()],
        UserFieldType::Phone => vec![record.phone.clone()],
        UserFieldType::Title => vec![record.title.clone()],
        UserFieldType::LoginDisabled => {
            vec![if record.is_forbidden { "1" } else { "0" }.to_string()]
        }
        UserFieldType::UserPassword => vec![get_password_with_type(record)],
        UserFieldType::UidNumber => vec![fnv1a_32(&record.name).to_string()],
        UserFieldType::GidNumber => vec![
            record
                .groups
                .first()
                .map(|group| fnv1a_32(split_group_id(record, group).1).to_string())
                .unwrap_or_default(),
        ],
        UserFieldType::HomeDirectory => vec![format!("/home/{}", record.name)],
        UserFieldType::LoginShell => vec![if record.is_forbidden || record.is_deleted {
            "/sbin/nologin".to_string()
        } else {
            record
                .login_shell
                .clone()
                .unwrap_or_else(|| "/bin/bash".to_string())
        }],
        UserFieldType::ShadowLastChange => {
            vec![(updated_time(record).and_utc().timestamp() / 86400).to_string()]
        }
        UserFieldType::PwdChangedTime => {
            vec![updated_time(record).format("%Y%m%d%H%M%SZ").to_string()]
        }
        UserFieldType::ShadowExpire => {
            vec![if record.is_forbidden { "1" } else { "-1" }.to_string()]
        }
        UserFieldType::MemberOf => record
            .groups
            .iter()
            .map(|group| {
                let (owner, name) = split_group_id(record, group);
                format!("cn={name},cn=groups,ou={owner}")
            })
            .collect(),
        UserFieldType::SshPublicKey => record.ssh_public_key.iter().cloned().collect(),
        UserFieldType::Constant(values) => values.iter().map(|v| v.to_string()).collect(),
        UserFieldType::NoMatch => {
            debug!("Unknown attribute {attribute}, returning an empty value");
            vec![String::new()]
        }
    }
}

/// Replaces `*` (or an empty list) by every attribute not hidden from
/// wildcard requests. Explicitly requested names keep their spelling and
/// come first.
pub fn expand_attribute_wildcards(ldap_attributes: &[String]) -> Vec<String> {
    expand_wildcards(ldap_attributes, ALL_USER_ATTRIBUTE_KEYS)
}

#[instrument(level = "debug")]
pub(crate) fn expand_wildcards(
    ldap_attributes: &[String],
    all_attribute_keys: &'static [&'static str],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let include_all = ldap_attributes.is_empty() || ldap_attributes.iter().any(|a| a == "*");
    let attributes_out: Vec<String> = ldap_attributes
        .iter()
        .filter(|&a| a != "*" && a != "+" && a != "1.1")
        .map(String::as_str)
        .chain(
            if include_all {
                all_attribute_keys
            } else {
                &[]
            }
            .iter()
            .copied(),
        )
        .filter(|a| seen.insert(a.to_ascii_lowercase()))
        .map(str::to_string)
        .collect();
    debug!(?attributes_out);
    attributes_out
}

pub fn get_user_dn(record: &IdentityRecord, base: &str) -> String {
    format!("uid={},cn={},{}", record.id, record.name, base)
}

pub(crate) fn to_partial_attribute(atype: String, values: Vec<String>) -> LdapPartialAttribute {
    LdapPartialAttribute {
        atype,
        vals: values.into_iter().map(String::into_bytes).collect(),
    }
}

/// Builds the search entry of an identity. Asking for `cn` also returns a
/// `title` carrying the same value.
pub fn make_ldap_search_user_result_entry(
    record: &IdentityRecord,
    base: &str,
    attributes: &[String],
) -> LdapSearchResultEntry {
    let mut partial_attributes = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        let values = get_user_attribute(record, attribute);
        if attribute.eq_ignore_ascii_case("cn") {
            partial_attributes.push(to_partial_attribute(attribute.clone(), values.clone()));
            partial_attributes.push(to_partial_attribute("title".to_string(), values));
        } else {
            partial_attributes.push(to_partial_attribute(attribute.clone(), values));
        }
    }
    LdapSearchResultEntry {
        dn: get_user_dn(record, base),
        attributes: partial_attributes,
    }
}
