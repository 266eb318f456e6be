//! Translation of HTTP query strings into structured database queries.
//!
//! The translator is pure: it never executes anything, and the same
//! parameter map always produces the same `QuerySpec`.

use std::collections::HashMap;

pub mod sql;

/// Keys that drive the query shape and never become filters.
pub const RESERVED_KEYS: &[&str] = &["page", "sort", "limit", "fields"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown filter operator `{0}`")]
    UnknownOperator(String),
    #[error("invalid field name `{0}`")]
    InvalidField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gt" => Some(Comparison::Gt),
            "gte" => Some(Comparison::Gte),
            "lt" => Some(Comparison::Lt),
            "lte" => Some(Comparison::Lte),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }
}

/// A filter value binds as a number when it parses as one, otherwise as
/// text. This is the typed analogue of the source API's string coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

impl FilterValue {
    fn parse(raw: &str) -> Self {
        match raw.parse::<f64>() {
            Ok(n) => FilterValue::Number(n),
            Err(_) => FilterValue::Text(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Comparison,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy)]
pub struct PageDefaults {
    pub default_limit: i64,
    pub max_limit: i64,
}

/// Request-scoped query description: built once, consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub fields: Option<Vec<String>>,
    pub page: i64,
    pub limit: i64,
}

/// Guard for names interpolated into SQL. Not schema validation: any
/// identifier-shaped field passes through to the store untouched.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn checked_field(name: &str) -> Result<String, QueryError> {
    if is_identifier(name) {
        Ok(name.to_string())
    } else {
        Err(QueryError::InvalidField(name.to_string()))
    }
}

impl QuerySpec {
    pub fn from_params(
        params: &HashMap<String, String>,
        pages: PageDefaults,
    ) -> Result<QuerySpec, QueryError> {
        let mut filters = Vec::new();
        for (key, value) in params {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let (field, op) = match key.find('[') {
                Some(open) if key.ends_with(']') => {
                    let token = &key[open + 1..key.len() - 1];
                    let op = Comparison::from_token(token)
                        .ok_or_else(|| QueryError::UnknownOperator(token.to_string()))?;
                    (checked_field(&key[..open])?, op)
                }
                _ => (checked_field(key)?, Comparison::Eq),
            };
            filters.push(Filter {
                field,
                op,
                value: FilterValue::parse(value),
            });
        }
        // The parameter map is unordered; fix an order so equal inputs
        // produce equal specs.
        filters.sort_by(|a, b| a.field.cmp(&b.field).then(a.op.cmp(&b.op)));

        let mut sort = Vec::new();
        if let Some(raw) = params.get("sort") {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (field, direction) = match part.strip_prefix('-') {
                    Some(rest) => (rest, Direction::Desc),
                    None => (part, Direction::Asc),
                };
                sort.push(SortKey {
                    field: checked_field(field)?,
                    direction,
                });
            }
        }
        if sort.is_empty() {
            // Deterministic default so pagination windows are stable.
            sort.push(SortKey {
                field: "created_at".into(),
                direction: Direction::Desc,
            });
            sort.push(SortKey {
                field: "id".into(),
                direction: Direction::Asc,
            });
        }

        let fields = match params.get("fields") {
            Some(raw) => {
                let list: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(checked_field)
                    .collect::<Result<_, _>>()?;
                if list.is_empty() {
                    None
                } else {
                    Some(list)
                }
            }
            None => None,
        };

        let page = params
            .get("page")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);
        let limit = params
            .get("limit")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(pages.default_limit)
            .clamp(1, pages.max_limit);

        Ok(QuerySpec {
            filters,
            sort,
            fields,
            page,
            limit,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Restricts a serialized record to the projected fields. The store
/// identifier is always kept.
pub fn project_fields(mut value: serde_json::Value, fields: &[String]) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut value {
        map.retain(|key, _| key == "id" || fields.iter().any(|f| f == key));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pages() -> PageDefaults {
        PageDefaults {
            default_limit: 100,
            max_limit: 1000,
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reserved_keys_only_yield_empty_filter() {
        let spec = QuerySpec::from_params(
            &params(&[("page", "3"), ("sort", "name"), ("limit", "10"), ("fields", "name")]),
            pages(),
        )
        .unwrap();
        assert!(spec.filters.is_empty());
    }

    #[test]
    fn bracket_operators_become_comparisons() {
        let spec = QuerySpec::from_params(
            &params(&[("price[gte]", "100"), ("price[lte]", "200")]),
            pages(),
        )
        .unwrap();
        assert_eq!(
            spec.filters,
            vec![
                Filter {
                    field: "price".into(),
                    op: Comparison::Gte,
                    value: FilterValue::Number(100.0),
                },
                Filter {
                    field: "price".into(),
                    op: Comparison::Lte,
                    value: FilterValue::Number(200.0),
                },
            ]
        );
    }

    #[test]
    fn bare_key_is_equality_and_text_stays_text() {
        let spec =
            QuerySpec::from_params(&params(&[("difficulty", "easy")]), pages()).unwrap();
        assert_eq!(
            spec.filters,
            vec![Filter {
                field: "difficulty".into(),
                op: Comparison::Eq,
                value: FilterValue::Text("easy".into()),
            }]
        );
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err =
            QuerySpec::from_params(&params(&[("price[within]", "5")]), pages()).unwrap_err();
        assert_eq!(err, QueryError::UnknownOperator("within".into()));
    }

    #[test]
    fn malformed_field_name_is_rejected() {
        let err = QuerySpec::from_params(&params(&[("price; DROP TABLE", "5")]), pages())
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidField(_)));
    }

    #[test]
    fn sort_parses_directions_in_listed_order() {
        let spec =
            QuerySpec::from_params(&params(&[("sort", "-price,name")]), pages()).unwrap();
        assert_eq!(
            spec.sort,
            vec![
                SortKey {
                    field: "price".into(),
                    direction: Direction::Desc,
                },
                SortKey {
                    field: "name".into(),
                    direction: Direction::Asc,
                },
            ]
        );
    }

    #[test]
    fn default_sort_is_stable_tiebreak() {
        let spec = QuerySpec::from_params(&params(&[]), pages()).unwrap();
        assert_eq!(
            spec.sort,
            vec![
                SortKey {
                    field: "created_at".into(),
                    direction: Direction::Desc,
                },
                SortKey {
                    field: "id".into(),
                    direction: Direction::Asc,
                },
            ]
        );
    }

    #[test]
    fn fields_parse_into_projection() {
        let spec =
            QuerySpec::from_params(&params(&[("fields", "name,price")]), pages()).unwrap();
        assert_eq!(spec.fields, Some(vec!["name".to_string(), "price".to_string()]));
    }

    #[test]
    fn pagination_computes_window() {
        let spec =
            QuerySpec::from_params(&params(&[("page", "2"), ("limit", "10")]), pages()).unwrap();
        assert_eq!(spec.page, 2);
        assert_eq!(spec.limit, 10);
        assert_eq!(spec.offset(), 10);
    }

    #[test]
    fn pagination_defaults_and_clamps() {
        let spec = QuerySpec::from_params(&params(&[]), pages()).unwrap();
        assert_eq!(spec.page, 1);
        assert_eq!(spec.limit, 100);
        assert_eq!(spec.offset(), 0);

        let spec = QuerySpec::from_params(
            &params(&[("page", "0"), ("limit", "999999")]),
            pages(),
        )
        .unwrap();
        assert_eq!(spec.page, 1);
        assert_eq!(spec.limit, 1000);
    }

    #[test]
    fn parsing_is_idempotent() {
        let input = params(&[
            ("price[gte]", "500"),
            ("difficulty", "easy"),
            ("sort", "-price,name"),
            ("fields", "name,price"),
            ("page", "2"),
            ("limit", "10"),
        ]);
        let a = QuerySpec::from_params(&input, pages()).unwrap();
        let b = QuerySpec::from_params(&input, pages()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn projection_keeps_listed_fields_and_id() {
        let record = json!({
            "id": "abc",
            "name": "Forest Hiker",
            "price": 497.0,
            "summary": "hidden",
        });
        let projected = project_fields(record, &["name".to_string(), "price".to_string()]);
        let obj = projected.as_object().unwrap();
        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["id", "name", "price"]);
    }
}
