use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Organization that owns the platform administrators. Binding against it
/// grants global-admin scope.
pub const BUILT_IN_ORGANIZATION: &str = "built-in";

/// Name or organization value matching every entry.
pub const WILDCARD: &str = "*";

/// Splits an `<owner>/<name>` store id.
pub fn split_object_id(id: &str) -> Option<(&str, &str)> {
    id.split_once('/')
}

#[derive(
    PartialEq,
    Eq,
    Hash,
    Clone,
    Default,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Debug,
    derive_more::Display,
)]
#[debug(r#""{_0}""#)]
#[display("{_0}")]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(organization: &str, name: &str) -> Self {
        Self(format!("{organization}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id back into (organization, name).
    pub fn split(&self) -> Option<(&str, &str)> {
        split_object_id(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Password storage scheme configured on an organization.
#[derive(PartialEq, Eq, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PasswordType {
    #[default]
    Plain,
    Salt,
    Md5Salt,
    Pbkdf2Salt,
    Other(String),
}

impl PasswordType {
    /// Prefix used for the `{scheme}hash` rendering of a stored password,
    /// or `None` if the password is stored in the clear.
    pub fn hash_prefix(&self) -> Option<&str> {
        match self {
            PasswordType::Plain => None,
            PasswordType::Salt => Some("sha256"),
            PasswordType::Md5Salt => Some("md5"),
            PasswordType::Pbkdf2Salt => Some("pbkdf2"),
            PasswordType::Other(other) => Some(other.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PasswordType::Plain => "plain",
            PasswordType::Salt => "salt",
            PasswordType::Md5Salt => "md5-salt",
            PasswordType::Pbkdf2Salt => "pbkdf2-salt",
            PasswordType::Other(other) => other.as_str(),
        }
    }
}

impl From<&str> for PasswordType {
    fn from(value: &str) -> Self {
        match value {
            "" | "plain" => PasswordType::Plain,
            "salt" => PasswordType::Salt,
            "md5-salt" => PasswordType::Md5Salt,
            "pbkdf2-salt" => PasswordType::Pbkdf2Salt,
            other => PasswordType::Other(other.to_owned()),
        }
    }
}

impl From<String> for PasswordType {
    fn from(value: String) -> Self {
        PasswordType::from(value.as_str())
    }
}

impl From<PasswordType> for String {
    fn from(value: PasswordType) -> Self {
        value.as_str().to_owned()
    }
}

#[derive(PartialEq, Eq, Clone, Debug, Default, Serialize, Deserialize)]
pub struct Organization {
    pub owner: String,
    pub name: String,
    pub password_type: PasswordType,
}

/// Read-only view of a store user, as much as the directory needs.
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Opaque id assigned by the identity platform.
    pub id: String,
    /// Name of the owning organization.
    pub owner: String,
    pub name: String,
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub title: String,
    pub password: String,
    pub password_salt: String,
    /// Password scheme of the owning organization.
    pub password_type: PasswordType,
    pub is_admin: bool,
    pub is_global_admin: bool,
    pub is_forbidden: bool,
    pub is_deleted: bool,
    pub updated_time: Option<NaiveDateTime>,
    /// Ids of the groups the identity belongs to, as `<owner>/<name>`.
    pub groups: Vec<String>,
    pub ssh_public_key: Option<String>,
    /// Shell chosen by the identity, overriding the default one.
    pub login_shell: Option<String>,
}

impl Default for IdentityRecord {
    fn default() -> Self {
        IdentityRecord {
            id: String::new(),
            owner: BUILT_IN_ORGANIZATION.to_owned(),
            name: String::new(),
            display_name: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            title: String::new(),
            password: String::new(),
            password_salt: String::new(),
            password_type: PasswordType::Plain,
            is_admin: false,
            is_global_admin: false,
            is_forbidden: false,
            is_deleted: false,
            updated_time: None,
            groups: Vec::new(),
            ssh_public_key: None,
            login_shell: None,
        }
    }
}

impl IdentityRecord {
    pub fn identity_id(&self) -> IdentityId {
        IdentityId::new(&self.owner, &self.name)
    }
}

/// A store group, with the names of its members. Members always belong to
/// the group's organization.
#[derive(PartialEq, Eq, Clone, Debug, Default, Serialize, Deserialize)]
pub struct Group {
    pub owner: String,
    pub name: String,
    pub display_name: String,
    pub members: Vec<String>,
}

impl Group {
    pub fn group_id(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}
