//! Search filters as received from directory clients.
//!
//! A [`FilterExpression`] is built either from the codec's [`LdapFilter`] or
//! from the textual form described in RFC 4515, e.g. `(&(mail=a*)(!(cn=b)))`.

use ldap3_proto::proto::{LdapFilter, LdapSubstringFilter};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::str::FromStr;

#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubstringParts {
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub final_: Option<String>,
}

impl From<LdapSubstringFilter> for SubstringParts {
    fn from(
        LdapSubstringFilter {
            initial,
            any,
            final_,
        }: LdapSubstringFilter,
    ) -> Self {
        Self {
            initial,
            any,
            final_,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub enum FilterExpression {
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
    Not(Box<FilterExpression>),
    Equality(String, String),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
    Present(String),
    Substrings(String, SubstringParts),
}

impl FilterExpression {
    /// Whether this is the `(objectClass=*)` filter that clients send to
    /// check that a server answers.
    pub fn is_match_everything(&self) -> bool {
        matches!(self, FilterExpression::Present(attribute) if attribute.eq_ignore_ascii_case("objectclass"))
    }

    /// Whether this is the `(objectClass=posixGroup)` filter asking for
    /// groups instead of identities.
    pub fn is_group_search(&self) -> bool {
        matches!(self, FilterExpression::Equality(attribute, value)
            if attribute.eq_ignore_ascii_case("objectclass")
                && value.eq_ignore_ascii_case("posixgroup"))
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("Invalid filter syntax: {0}")]
    Syntax(String),
    #[error("Invalid escape sequence in `{0}`")]
    InvalidEscape(String),
    #[error("Assertion value is not valid UTF-8")]
    InvalidUtf8,
    #[error("Unsupported filter: {0}")]
    Unsupported(String),
}

impl TryFrom<&LdapFilter> for FilterExpression {
    type Error = FilterParseError;

    fn try_from(filter: &LdapFilter) -> Result<Self, Self::Error> {
        let convert_all = |filters: &[LdapFilter]| {
            filters
                .iter()
                .map(FilterExpression::try_from)
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(match filter {
            LdapFilter::And(filters) => FilterExpression::And(convert_all(filters)?),
            LdapFilter::Or(filters) => FilterExpression::Or(convert_all(filters)?),
            LdapFilter::Not(filter) => {
                FilterExpression::Not(Box::new(FilterExpression::try_from(filter.as_ref())?))
            }
            LdapFilter::Equality(attribute, value) => {
                FilterExpression::Equality(attribute.clone(), value.clone())
            }
            LdapFilter::GreaterOrEqual(attribute, value) => {
                FilterExpression::GreaterOrEqual(attribute.clone(), value.clone())
            }
            LdapFilter::LessOrEqual(attribute, value) => {
                FilterExpression::LessOrEqual(attribute.clone(), value.clone())
            }
            LdapFilter::Present(attribute) => FilterExpression::Present(attribute.clone()),
            LdapFilter::Substring(attribute, substrings) => {
                FilterExpression::Substrings(attribute.clone(), substrings.clone().into())
            }
            other => return Err(FilterParseError::Unsupported(format!("{other:?}"))),
        })
    }
}

/// Decodes the `\XX` hex escapes of an assertion value.
fn unescape_value(value: &str) -> Result<String, FilterParseError> {
    if !value.contains('\\') {
        return Ok(value.to_owned());
    }
    let invalid_escape = || FilterParseError::InvalidEscape(value.to_owned());
    let mut bytes = Vec::with_capacity(value.len());
    let mut rest = value.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'\\' {
            let hex = tail
                .get(..2)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .ok_or_else(invalid_escape)?;
            bytes.push(u8::from_str_radix(hex, 16).map_err(|_| invalid_escape())?);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).map_err(|_| FilterParseError::InvalidUtf8)
}

impl FilterExpression {
    fn unescape_values(self) -> Result<Self, FilterParseError> {
        let unescape_all = |filters: Vec<FilterExpression>| {
            filters
                .into_iter()
                .map(FilterExpression::unescape_values)
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(match self {
            FilterExpression::And(filters) => FilterExpression::And(unescape_all(filters)?),
            FilterExpression::Or(filters) => FilterExpression::Or(unescape_all(filters)?),
            FilterExpression::Not(filter) => {
                FilterExpression::Not(Box::new(filter.unescape_values()?))
            }
            FilterExpression::Equality(attribute, value) => {
                FilterExpression::Equality(attribute, unescape_value(&value)?)
            }
            FilterExpression::GreaterOrEqual(attribute, value) => {
                FilterExpression::GreaterOrEqual(attribute, unescape_value(&value)?)
            }
            FilterExpression::LessOrEqual(attribute, value) => {
                FilterExpression::LessOrEqual(attribute, unescape_value(&value)?)
            }
            FilterExpression::Present(attribute) => FilterExpression::Present(attribute),
            FilterExpression::Substrings(attribute, parts) => FilterExpression::Substrings(
                attribute,
                SubstringParts {
                    initial: parts.initial.as_deref().map(unescape_value).transpose()?,
                    any: parts
                        .any
                        .iter()
                        .map(|any| unescape_value(any))
                        .collect::<Result<_, _>>()?,
                    final_: parts.final_.as_deref().map(unescape_value).transpose()?,
                },
            ),
        })
    }
}

impl FromStr for FilterExpression {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Clients commonly omit the outer parentheses of a single item.
        let wrapped;
        let input = if trimmed.starts_with('(') {
            trimmed
        } else {
            wrapped = format!("({trimmed})");
            wrapped.as_str()
        };
        let filter = ldap3_proto::parse_ldap_filter_str(input)
            .map_err(|e| FilterParseError::Syntax(e.to_string()))?;
        FilterExpression::try_from(&filter)?.unescape_values()
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '*' => f.write_str("\\2a")?,
            '(' => f.write_str("\\28")?,
            ')' => f.write_str("\\29")?,
            '\\' => f.write_str("\\5c")?,
            '\0' => f.write_str("\\00")?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_list = |f: &mut fmt::Formatter<'_>, op: char, filters: &[FilterExpression]| {
            write!(f, "({op}")?;
            for filter in filters {
                write!(f, "{filter}")?;
            }
            f.write_char(')')
        };
        match self {
            FilterExpression::And(filters) => write_list(f, '&', filters),
            FilterExpression::Or(filters) => write_list(f, '|', filters),
            FilterExpression::Not(filter) => write!(f, "(!{filter})"),
            FilterExpression::Equality(attribute, value) => {
                write!(f, "({attribute}=")?;
                write_escaped(f, value)?;
                f.write_char(')')
            }
            FilterExpression::GreaterOrEqual(attribute, value) => {
                write!(f, "({attribute}>=")?;
                write_escaped(f, value)?;
                f.write_char(')')
            }
            FilterExpression::LessOrEqual(attribute, value) => {
                write!(f, "({attribute}<=")?;
                write_escaped(f, value)?;
                f.write_char(')')
            }
            FilterExpression::Present(attribute) => write!(f, "({attribute}=*)"),
            FilterExpression::Substrings(attribute, parts) => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = &parts.initial {
                    write_escaped(f, initial)?;
                }
                f.write_char('*')?;
                for any in &parts.any {
                    write_escaped(f, any)?;
                    f.write_char('*')?;
                }
                if let Some(final_) = &parts.final_ {
                    write_escaped(f, final_)?;
                }
                f.write_char(')')
            }
        }
    }
}
