//! Rendering of a `QuerySpec` onto a `sqlx::QueryBuilder`.
//!
//! Field names reaching this module have already passed the identifier
//! guard in the parser; values are always bound, never interpolated.

use sqlx::{Postgres, QueryBuilder};

use super::{FilterValue, QuerySpec};

/// Appends WHERE, ORDER BY, LIMIT and OFFSET clauses for the spec.
/// The builder is expected to hold a bare `SELECT ... FROM ...` so far.
pub fn apply(qb: &mut QueryBuilder<'_, Postgres>, spec: &QuerySpec) {
    for (i, filter) in spec.filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(filter.field.as_str());
        match &filter.value {
            FilterValue::Number(n) => {
                qb.push(" ");
                qb.push(filter.op.sql());
                qb.push(" ");
                qb.push_bind(*n);
            }
            FilterValue::Text(t) => {
                // Text comparisons go through ::text so enum and uuid
                // columns accept equality filters.
                qb.push("::text ");
                qb.push(filter.op.sql());
                qb.push(" ");
                qb.push_bind(t.clone());
            }
        }
    }

    qb.push(" ORDER BY ");
    let mut keys = qb.separated(", ");
    for key in &spec.sort {
        keys.push(format!("{} {}", key.field, key.direction.sql()));
    }

    qb.push(" LIMIT ");
    qb.push_bind(spec.limit);
    qb.push(" OFFSET ");
    qb.push_bind(spec.offset());
}
