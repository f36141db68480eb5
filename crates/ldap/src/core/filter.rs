use crate::core::attributes::map_user_field;
use idbridge_domain::filter::FilterExpression;
use idbridge_domain_handlers::predicate::{StoreColumn, StoreFilter};
use tracing::debug;

fn get_column(attribute: &str) -> Option<StoreColumn> {
    let column = map_user_field(attribute).store_column();
    if column.is_none() {
        debug!(r#"Attribute "{attribute}" is not searchable, the filter will match nothing"#);
    }
    column
}

/// Translates a directory filter into a filter over store columns.
/// Attributes without a store column match nothing.
pub fn compile_filter(filter: &FilterExpression) -> StoreFilter {
    let compile_all =
        |filters: &[FilterExpression]| filters.iter().map(compile_filter).collect::<Vec<_>>();
    match filter {
        FilterExpression::And(filters) => StoreFilter::And(compile_all(filters)),
        FilterExpression::Or(filters) => StoreFilter::Or(compile_all(filters)),
        FilterExpression::Not(filter) => StoreFilter::Not(Box::new(compile_filter(filter))),
        FilterExpression::Equality(attribute, value) => match get_column(attribute) {
            Some(column) => StoreFilter::Equality(column, value.clone()),
            None => StoreFilter::False,
        },
        FilterExpression::GreaterOrEqual(attribute, value) => match get_column(attribute) {
            Some(column) => StoreFilter::GreaterOrEqual(column, value.clone()),
            None => StoreFilter::False,
        },
        FilterExpression::LessOrEqual(attribute, value) => match get_column(attribute) {
            Some(column) => StoreFilter::LessOrEqual(column, value.clone()),
            None => StoreFilter::False,
        },
        FilterExpression::Present(attribute) => match get_column(attribute) {
            Some(column) => StoreFilter::Present(column),
            None => StoreFilter::False,
        },
        FilterExpression::Substrings(attribute, parts) => match get_column(attribute) {
            Some(column) => StoreFilter::SubString(column, parts.clone().into()),
            None => StoreFilter::False,
        },
    }
}
