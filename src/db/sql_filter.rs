//! SQL compilation of normalized filters
//!
//! Field names never reach the SQL text directly: known fields map to fixed
//! column expressions and everything else becomes a bound JSON path.

use crate::filter::{Bound, Constraint, Filter, Scalar};
use rusqlite::types::Value as SqlValue;

pub const PROFILE_COLUMNS: &str =
    "id, lat, lon, time, temperature, pressure, salinity, metadata, extra, created_at, updated_at";

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Debug, Clone, PartialEq)]
enum Target {
    /// Scalar column
    Column(&'static str),
    /// JSON array column; matches when any element satisfies the constraint
    Series(&'static str),
    /// Value at a JSON path inside an object column
    Json { column: &'static str, path: String },
}

fn target(field: &str) -> Target {
    match field {
        "lat" => Target::Column("lat"),
        "lon" => Target::Column("lon"),
        "time" => Target::Column("time"),
        "_id" => Target::Column("id"),
        "temperature" => Target::Series("temperature"),
        "pressure" => Target::Series("pressure"),
        "salinity" => Target::Series("salinity"),
        _ => match field.strip_prefix("metadata.") {
            Some(path) => Target::Json {
                column: "metadata",
                path: json_path(path.split('.')),
            },
            None => Target::Json {
                column: "extra",
                path: json_path(std::iter::once(field)),
            },
        },
    }
}

fn json_path<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    let mut path = String::from("$");
    for segment in segments {
        path.push_str(".\"");
        path.push_str(segment);
        path.push('"');
    }
    path
}

fn bind(scalar: &Scalar) -> SqlValue {
    match scalar {
        Scalar::Int(i) => SqlValue::Integer(*i),
        Scalar::Float(f) => SqlValue::Real(*f),
        Scalar::Text(s) => SqlValue::Text(s.clone()),
        // json_extract reports booleans as 0/1
        Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}

/// `expr_params` are bound again at every occurrence of `expr`.
fn predicate(
    expr: &str,
    expr_params: &[SqlValue],
    constraint: &Constraint,
    params: &mut Vec<SqlValue>,
) -> String {
    match constraint {
        Constraint::Equals(value) => {
            params.extend_from_slice(expr_params);
            params.push(bind(value));
            format!("{} = ?", expr)
        }
        Constraint::OneOf(values) if values.is_empty() => "0".to_string(),
        Constraint::OneOf(values) => {
            params.extend_from_slice(expr_params);
            params.extend(values.iter().map(bind));
            let marks = vec!["?"; values.len()].join(", ");
            format!("{} IN ({})", expr, marks)
        }
        Constraint::Range { .. } | Constraint::ProximityExpanded { .. } => {
            let (lower, upper) = constraint.bounds().unwrap_or((None, None));
            let mut parts = Vec::new();
            let mut push = |bound: Option<Bound>, inclusive_op: &str, exclusive_op: &str| {
                if let Some(b) = bound {
                    params.extend_from_slice(expr_params);
                    params.push(bind(&b.value));
                    let op = if b.inclusive { inclusive_op } else { exclusive_op };
                    parts.push(format!("{} {} ?", expr, op));
                }
            };
            push(lower, ">=", ">");
            push(upper, "<=", "<");
            if parts.is_empty() {
                "1".to_string()
            } else {
                parts.join(" AND ")
            }
        }
    }
}

/// WHERE clause (without the keyword) for a filter; `None` when unconstrained.
pub fn compile_where(filter: &Filter, params: &mut Vec<SqlValue>) -> Option<String> {
    if filter.is_empty() {
        return None;
    }
    let clauses: Vec<String> = filter
        .iter()
        .map(|(field, constraint)| match target(field) {
            Target::Column(column) => predicate(column, &[], constraint, params),
            Target::Series(column) => format!(
                "EXISTS (SELECT 1 FROM json_each(profiles.{}) AS level WHERE {})",
                column,
                predicate("level.value", &[], constraint, params)
            ),
            Target::Json { column, path } => {
                let expr = format!("json_extract(profiles.{}, ?)", column);
                format!("({})", predicate(&expr, &[SqlValue::Text(path)], constraint, params))
            }
        })
        .collect();
    Some(clauses.join(" AND "))
}

pub fn compile_find(filter: &Filter, limit: Option<usize>) -> CompiledQuery {
    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM profiles", PROFILE_COLUMNS);
    if let Some(clause) = compile_where(filter, &mut params) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    sql.push_str(" ORDER BY rowid");
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    }
    CompiledQuery { sql, params }
}
