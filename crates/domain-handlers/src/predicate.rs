use idbridge_domain::filter::SubstringParts;
use serde::{Deserialize, Serialize};

/// Column of the identity store's user table that a filter can target.
#[derive(
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    Debug,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum StoreColumn {
    Name,
    DisplayName,
    FirstName,
    LastName,
    Email,
    Phone,
    Title,
    IsForbidden,
}

impl StoreColumn {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct SubStringFilter {
    pub initial: Option<String>,
    pub any: Vec<String>,
    pub final_: Option<String>,
}

impl SubStringFilter {
    pub fn to_sql_filter(&self) -> String {
        let mut filter = String::with_capacity(
            self.initial.as_ref().map(String::len).unwrap_or_default()
                + 1
                + self.any.iter().map(String::len).sum::<usize>()
                + self.any.len()
                + self.final_.as_ref().map(String::len).unwrap_or_default(),
        );
        if let Some(f) = &self.initial {
            filter.push_str(f);
        }
        filter.push('%');
        for part in self.any.iter() {
            filter.push_str(part);
            filter.push('%');
        }
        if let Some(f) = &self.final_ {
            filter.push_str(f);
        }
        filter
    }
}

impl From<SubstringParts> for SubStringFilter {
    fn from(
        SubstringParts {
            initial,
            any,
            final_,
        }: SubstringParts,
    ) -> Self {
        Self {
            initial,
            any,
            final_,
        }
    }
}

/// Filter over identity records, expressed in store columns.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub enum StoreFilter {
    False,
    And(Vec<StoreFilter>),
    Or(Vec<StoreFilter>),
    Not(Box<StoreFilter>),
    Equality(StoreColumn, String),
    GreaterOrEqual(StoreColumn, String),
    LessOrEqual(StoreColumn, String),
    Present(StoreColumn),
    SubString(StoreColumn, SubStringFilter),
}

/// A compiled backing-store condition: SQL text with `?` placeholders and
/// the values to bind to them, in placeholder order.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct Predicate {
    sql: String,
    args: Vec<String>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<String>) {
        (self.sql, self.args)
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.sql, self.args)
    }
}

const ALWAYS_TRUE: &str = "1=1";
const ALWAYS_FALSE: &str = "1=0";

impl StoreFilter {
    /// Renders the filter as SQL. Arguments are emitted in the order their
    /// placeholders appear, which is the pre-order of the filter tree.
    pub fn to_predicate(&self) -> Predicate {
        let mut sql = String::new();
        let mut args = Vec::new();
        self.render(&mut sql, &mut args);
        Predicate { sql, args }
    }

    fn is_compound(&self) -> bool {
        match self {
            StoreFilter::And(fs) | StoreFilter::Or(fs) => fs.len() > 1,
            _ => false,
        }
    }

    fn render_operand(&self, sql: &mut String, args: &mut Vec<String>) {
        if self.is_compound() {
            sql.push('(');
            self.render(sql, args);
            sql.push(')');
        } else {
            self.render(sql, args);
        }
    }

    fn render(&self, sql: &mut String, args: &mut Vec<String>) {
        let render_list =
            |fs: &[StoreFilter], separator: &str, empty: &str, sql: &mut String, args: &mut Vec<String>| {
                match fs {
                    [] => sql.push_str(empty),
                    [single] => single.render(sql, args),
                    _ => {
                        for (i, f) in fs.iter().enumerate() {
                            if i > 0 {
                                sql.push_str(separator);
                            }
                            f.render_operand(sql, args);
                        }
                    }
                }
            };
        let comparison = |column: &StoreColumn,
                          operator: &str,
                          value: &str,
                          sql: &mut String,
                          args: &mut Vec<String>| {
            sql.push_str(column.as_str());
            sql.push_str(operator);
            sql.push('?');
            args.push(value.to_owned());
        };
        match self {
            StoreFilter::False => sql.push_str(ALWAYS_FALSE),
            StoreFilter::Equality(column, value) => comparison(column, "=", value, sql, args),
            StoreFilter::GreaterOrEqual(column, value) => {
                comparison(column, ">=", value, sql, args)
            }
            StoreFilter::LessOrEqual(column, value) => comparison(column, "<=", value, sql, args),
            StoreFilter::Present(column) => {
                sql.push_str(column.as_str());
                sql.push_str(" IS NOT NULL");
            }
            StoreFilter::SubString(column, filter) => {
                sql.push_str(column.as_str());
                sql.push_str(" LIKE ?");
                args.push(filter.to_sql_filter());
            }
            StoreFilter::Not(f) => {
                sql.push_str("NOT ");
                f.render_operand(sql, args);
            }
            StoreFilter::And(fs) => render_list(fs, " AND ", ALWAYS_TRUE, sql, args),
            StoreFilter::Or(fs) => render_list(fs, " OR ", ALWAYS_FALSE, sql, args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn email_eq(value: &str) -> StoreFilter {
        StoreFilter::Equality(StoreColumn::Email, value.to_owned())
    }

    #[test]
    fn test_column_names() {
        assert_eq!(StoreColumn::Email.as_str(), "email");
        assert_eq!(StoreColumn::DisplayName.as_str(), "display_name");
        assert_eq!(StoreColumn::IsForbidden.to_string(), "is_forbidden");
    }

    #[test]
    fn test_substring_sql_filter() {
        let filter = SubStringFilter {
            initial: Some("admin".to_owned()),
            any: vec!["ex".to_owned(), "c".to_owned()],
            final_: Some("m".to_owned()),
        };
        assert_eq!(filter.to_sql_filter(), "admin%ex%c%m");
        let filter = SubStringFilter {
            initial: None,
            any: vec![],
            final_: Some("admin".to_owned()),
        };
        assert_eq!(filter.to_sql_filter(), "%admin");
    }

    #[test]
    fn test_render_nested() {
        let filter = StoreFilter::And(vec![
            StoreFilter::Or(vec![email_eq("a"), email_eq("b")]),
            StoreFilter::Not(Box::new(StoreFilter::And(vec![
                email_eq("c"),
                StoreFilter::Present(StoreColumn::Phone),
            ]))),
            email_eq("d"),
        ]);
        assert_eq!(
            filter.to_predicate(),
            Predicate::new(
                "(email=? OR email=?) AND NOT (email=? AND phone IS NOT NULL) AND email=?",
                vec!["a".into(), "b".into(), "c".into(), "d".into()]
            )
        );
    }

    #[test]
    fn test_render_constants() {
        assert_eq!(StoreFilter::And(vec![]).to_predicate().sql(), "1=1");
        assert_eq!(StoreFilter::Or(vec![]).to_predicate().sql(), "1=0");
        assert_eq!(StoreFilter::False.to_predicate().args(), &[] as &[String]);
        assert_eq!(
            StoreFilter::Not(Box::new(StoreFilter::False))
                .to_predicate()
                .sql(),
            "NOT 1=0"
        );
        assert_eq!(
            StoreFilter::And(vec![email_eq("x")]).to_predicate(),
            Predicate::new("email=?", vec!["x".into()])
        );
    }
}
