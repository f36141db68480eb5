pub(crate) mod bind;
pub(crate) mod core;
pub(crate) mod handler;
pub(crate) mod scope;
pub(crate) mod search;
pub mod session;

pub use crate::core::{
    attributes::{UserFieldType, map_user_field},
    dn::{get_name_and_org_from_dn, parse_distinguished_name},
    error::{LdapError, LdapResult},
    filter::compile_filter,
};
pub use handler::LdapHandler;
pub use scope::SearchTarget;
