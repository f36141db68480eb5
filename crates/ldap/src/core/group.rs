use crate::core::attributes::{expand_wildcards, fnv1a_32, to_partial_attribute};
use idbridge_domain::types::Group;
use ldap3_proto::LdapSearchResultEntry;
use tracing::debug;

const GROUP_OBJECT_CLASSES: &[&str] = &["top", "posixGroup"];

/// Attributes returned for `*` or an empty attribute list.
const ALL_GROUP_ATTRIBUTE_KEYS: &[&str] =
    &["cn", "gidNumber", "member", "memberUid", "objectClass"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupFieldType {
    Name,
    GidNumber,
    Member,
    MemberUid,
    Description,
    ObjectClass,
    NoMatch,
}

pub fn map_group_field(attribute: &str) -> GroupFieldType {
    match attribute.to_ascii_lowercase().as_str() {
        "cn" => GroupFieldType::Name,
        "gidnumber" => GroupFieldType::GidNumber,
        "member" => GroupFieldType::Member,
        "memberuid" => GroupFieldType::MemberUid,
        "description" => GroupFieldType::Description,
        "objectclass" => GroupFieldType::ObjectClass,
        _ => GroupFieldType::NoMatch,
    }
}

pub fn get_group_attribute(group: &Group, attribute: &str) -> Vec<String> {
    match map_group_field(attribute) {
        GroupFieldType::Name => vec![group.name.clone()],
        GroupFieldType::GidNumber => vec![fnv1a_32(&group.name).to_string()],
        GroupFieldType::Member => group
            .members
            .iter()
            .map(|member| format!("uid={member},cn=users,ou={}", group.owner))
            .collect(),
        GroupFieldType::MemberUid => group.members.clone(),
        GroupFieldType::Description => vec![group.display_name.clone()],
        GroupFieldType::ObjectClass => {
            GROUP_OBJECT_CLASSES.iter().map(|c| c.to_string()).collect()
        }
        GroupFieldType::NoMatch => {
            debug!("Unknown group attribute {attribute}, returning an empty value");
            vec![String::new()]
        }
    }
}

pub fn expand_group_attribute_wildcards(ldap_attributes: &[String]) -> Vec<String> {
    expand_wildcards(ldap_attributes, ALL_GROUP_ATTRIBUTE_KEYS)
}

pub fn get_group_dn(group: &Group, base: &str) -> String {
    format!("cn={},{}", group.name, base)
}

pub fn make_ldap_search_group_result_entry(
    group: &Group,
    base: &str,
    attributes: &[String],
) -> LdapSearchResultEntry {
    LdapSearchResultEntry {
        dn: get_group_dn(group, base),
        attributes: attributes
            .iter()
            .map(|attribute| {
                to_partial_attribute(attribute.clone(), get_group_attribute(group, attribute))
            })
            .collect(),
    }
}
