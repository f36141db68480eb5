use chrono::{DateTime, NaiveDateTime};
use idbridge_domain::types::{IdentityRecord, BUILT_IN_ORGANIZATION};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Row of the platform's `user` table. Only the columns the directory reads
/// are mapped.
#[derive(Clone, Debug, Default, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub id: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub title: String,
    pub password: String,
    pub password_salt: String,
    pub is_admin: bool,
    pub is_forbidden: bool,
    pub is_deleted: bool,
    /// RFC 3339 timestamp, possibly empty.
    pub updated_time: String,
    /// JSON array of group ids.
    #[sea_orm(column_type = "Text")]
    pub groups: String,
    /// JSON object of free-form string properties.
    #[sea_orm(column_type = "Text")]
    pub properties: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn parse_updated_time(value: &str) -> Option<NaiveDateTime> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.naive_utc())
        .map_err(|e| warn!(r#"Invalid updated time "{}": {}"#, value, e))
        .ok()
}

fn parse_groups(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    serde_json::from_str(value).unwrap_or_else(|e| {
        warn!(r#"Invalid group list "{}": {}"#, value, e);
        Vec::new()
    })
}

fn parse_properties(value: &str) -> HashMap<String, String> {
    if value.is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(value).unwrap_or_else(|e| {
        warn!(r#"Invalid properties "{}": {}"#, value, e);
        HashMap::new()
    })
}

impl From<Model> for IdentityRecord {
    fn from(user: Model) -> Self {
        let updated_time = parse_updated_time(&user.updated_time);
        let groups = parse_groups(&user.groups);
        let mut properties = parse_properties(&user.properties);
        let mut property = |key: &str| properties.remove(key).filter(|v| !v.is_empty());
        Self {
            is_global_admin: user.owner == BUILT_IN_ORGANIZATION,
            id: user.id,
            owner: user.owner,
            name: user.name,
            display_name: user.display_name,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            title: user.title,
            password: user.password,
            password_salt: user.password_salt,
            password_type: Default::default(),
            is_admin: user.is_admin,
            is_forbidden: user.is_forbidden,
            is_deleted: user.is_deleted,
            updated_time,
            groups,
            ssh_public_key: property("sshPublicKey"),
            login_shell: property("loginShell"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_updated_time() {
        assert_eq!(parse_updated_time(""), None);
        assert_eq!(parse_updated_time("yesterday"), None);
        assert_eq!(
            parse_updated_time("2024-01-02T03:04:05+08:00"),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(19, 4, 5))
        );
    }

    #[test]
    fn test_parse_groups() {
        assert_eq!(parse_groups(""), Vec::<String>::new());
        assert_eq!(parse_groups("not json"), Vec::<String>::new());
        assert_eq!(
            parse_groups(r#"["acme/dev","acme/ops"]"#),
            vec!["acme/dev".to_string(), "acme/ops".to_string()]
        );
    }

    #[test]
    fn test_properties() {
        let user = Model {
            owner: "acme".to_string(),
            name: "alice".to_string(),
            properties: r#"{"sshPublicKey":"ssh-ed25519 AAAA","loginShell":"","badge":"7"}"#
                .to_string(),
            ..Default::default()
        };
        let record = IdentityRecord::from(user.clone());
        assert_eq!(record.ssh_public_key.as_deref(), Some("ssh-ed25519 AAAA"));
        assert_eq!(record.login_shell, None);
        let record = IdentityRecord::from(Model {
            properties: "[1, 2]".to_string(),
            ..user
        });
        assert_eq!(record.ssh_public_key, None);
    }
}
