//! Query validation.
//!
//! A query is valid when it is a string whose trimmed length, counted in
//! characters, lies in `[MIN_QUERY_LENGTH, MAX_QUERY_LENGTH]`. Trimming
//! removes Unicode whitespace and the ASCII separators U+001C..=U+001F.

use serde_json::Value;

use crate::error::InvalidQuery;
use crate::models::Query;

pub const MIN_QUERY_LENGTH: usize = 1;
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Validates raw JSON input. Anything other than a JSON string is
/// [`InvalidQuery::WrongType`].
pub fn validate(input: &Value) -> Result<Query, InvalidQuery> {
    match input {
        Value::String(text) => validate_str(text),
        _ => Err(InvalidQuery::WrongType),
    }
}

fn is_padding(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

pub fn validate_str(text: &str) -> Result<Query, InvalidQuery> {
    let length = text.trim_matches(is_padding).chars().count();
    if length < MIN_QUERY_LENGTH {
        return Err(InvalidQuery::Empty);
    }
    if length > MAX_QUERY_LENGTH {
        return Err(InvalidQuery::TooLong {
            length,
            max: MAX_QUERY_LENGTH,
        });
    }
    Ok(Query::new_unchecked(text.to_string()))
}
