//! Read-only data console for development environments.
//!
//! Understands a deliberately small statement shape:
//! `SELECT <columns | * | COUNT(*)> FROM applications|payments [WHERE column = 'value'] [LIMIT n]`.
//! Anything else, including every write statement, is refused.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::record::ApplicationRecord;

const APPLICATION_COLUMNS: &[&str] = &[
    "id",
    "number",
    "owner",
    "property_name",
    "category",
    "total_rooms",
    "validity_years",
    "status",
    "review_cycle",
    "total_fee",
    "created_at",
    "submitted_at",
    "version",
];

const PAYMENT_COLUMNS: &[&str] = &[
    "id",
    "application_id",
    "gateway",
    "external_ref",
    "amount",
    "status",
    "outcome",
    "verified_amount",
    "failure_reason",
    "created_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Applications,
    Payments,
}

impl Table {
    fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Applications => APPLICATION_COLUMNS,
            Table::Payments => PAYMENT_COLUMNS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Projection {
    All,
    Count,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Query {
    projection: Projection,
    table: Table,
    filter: Option<(String, String)>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("only SELECT statements are allowed")]
    NotReadOnly,
    #[error("could not parse statement: {0}")]
    Syntax(String),
    #[error("unknown table '{0}' (expected applications or payments)")]
    UnknownTable(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
}

/// Evaluate `statement` against a snapshot of the stored records.
pub fn execute(
    statement: &str,
    records: &[ApplicationRecord],
) -> Result<ConsoleResult, ConsoleError> {
    let query = parse(statement)?;
    let rows: Vec<BTreeMap<&'static str, Value>> = match query.table {
        Table::Applications => records.iter().map(application_row).collect(),
        Table::Payments => records.iter().flat_map(payment_rows).collect(),
    };

    let mut matching: Vec<BTreeMap<&'static str, Value>> = rows
        .into_iter()
        .filter(|row| match &query.filter {
            Some((column, expected)) => row
                .get(column.as_str())
                .is_some_and(|value| plain_text(value) == *expected),
            None => true,
        })
        .collect();

    // LIMIT bounds the result rows, so a count always covers every matching row.
    if query.projection == Projection::Count {
        let mut rows = vec![vec![json!(matching.len())]];
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        return Ok(ConsoleResult {
            columns: vec!["count".to_string()],
            row_count: rows.len(),
            rows,
        });
    }
    if let Some(limit) = query.limit {
        matching.truncate(limit);
    }

    let columns: Vec<String> = match query.projection {
        Projection::Columns(columns) => columns,
        _ => query
            .table
            .columns()
            .iter()
            .map(|column| column.to_string())
            .collect(),
    };
    let rows: Vec<Vec<Value>> = matching
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column.as_str()).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Ok(ConsoleResult {
        columns,
        row_count: rows.len(),
        rows,
    })
}

fn parse(statement: &str) -> Result<Query, ConsoleError> {
    let statement = statement.trim().trim_end_matches(';').trim();
    let tokens: Vec<&str> = statement.split_whitespace().collect();
    let Some(first) = tokens.first() else {
        return Err(ConsoleError::Syntax("empty statement".to_string()));
    };
    if !first.eq_ignore_ascii_case("select") {
        return Err(ConsoleError::NotReadOnly);
    }

    let from = tokens
        .iter()
        .position(|token| token.eq_ignore_ascii_case("from"))
        .ok_or_else(|| ConsoleError::Syntax("missing FROM".to_string()))?;
    let projection_text = tokens[1..from].join(" ");
    let table_name = tokens
        .get(from + 1)
        .ok_or_else(|| ConsoleError::Syntax("missing table name".to_string()))?;
    let table = match table_name.to_ascii_lowercase().as_str() {
        "applications" => Table::Applications,
        "payments" => Table::Payments,
        other => return Err(ConsoleError::UnknownTable(other.to_string())),
    };

    let projection = parse_projection(&projection_text, table)?;

    let mut rest = &tokens[from + 2..];
    let mut filter = None;
    if rest
        .first()
        .is_some_and(|token| token.eq_ignore_ascii_case("where"))
    {
        let limit_at = rest
            .iter()
            .position(|token| token.eq_ignore_ascii_case("limit"))
            .unwrap_or(rest.len());
        filter = Some(parse_filter(&rest[1..limit_at].join(" "), table)?);
        rest = &rest[limit_at..];
    }

    let mut limit = None;
    if let Some(token) = rest.first() {
        if !token.eq_ignore_ascii_case("limit") {
            return Err(ConsoleError::Syntax(format!("unexpected '{token}'")));
        }
        let value = rest
            .get(1)
            .ok_or_else(|| ConsoleError::Syntax("LIMIT needs a number".to_string()))?;
        limit = Some(
            value
                .parse::<usize>()
                .map_err(|_| ConsoleError::Syntax(format!("invalid LIMIT '{value}'")))?,
        );
        if rest.len() > 2 {
            return Err(ConsoleError::Syntax(format!("unexpected '{}'", rest[2])));
        }
    }

    Ok(Query {
        projection,
        table,
        filter,
        limit,
    })
}

fn parse_projection(text: &str, table: Table) -> Result<Projection, ConsoleError> {
    let compact: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ConsoleError::Syntax("missing column list".to_string()));
    }
    if compact == "*" {
        return Ok(Projection::All);
    }
    if compact.eq_ignore_ascii_case("count(*)") {
        return Ok(Projection::Count);
    }

    let columns = compact
        .split(',')
        .map(|column| known_column(column, table))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Projection::Columns(columns))
}

fn parse_filter(text: &str, table: Table) -> Result<(String, String), ConsoleError> {
    let (column, value) = text
        .split_once('=')
        .ok_or_else(|| ConsoleError::Syntax("WHERE supports only column = 'value'".to_string()))?;
    let column = known_column(column.trim(), table)?;
    let value = value.trim();
    let value = value
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(value);
    Ok((column, value.to_string()))
}

fn known_column(column: &str, table: Table) -> Result<String, ConsoleError> {
    let column = column.trim().to_ascii_lowercase();
    if table.columns().contains(&column.as_str()) {
        Ok(column)
    } else {
        Err(ConsoleError::UnknownColumn(column))
    }
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn application_row(record: &ApplicationRecord) -> BTreeMap<&'static str, Value> {
    BTreeMap::from([
        ("id", json!(record.id)),
        ("number", json!(record.number)),
        ("owner", json!(record.owner)),
        ("property_name", json!(record.property.property_name)),
        ("category", json!(record.property.category)),
        ("total_rooms", json!(record.property.total_rooms)),
        ("validity_years", json!(record.property.validity_years)),
        ("status", json!(record.status)),
        ("review_cycle", json!(record.review_cycle)),
        (
            "total_fee",
            json!(record.fee.as_ref().map(|fee| fee.total_fee)),
        ),
        ("created_at", json!(record.created_at)),
        ("submitted_at", json!(record.submitted_at)),
        ("version", json!(record.version)),
    ])
}

fn payment_rows(record: &ApplicationRecord) -> Vec<BTreeMap<&'static str, Value>> {
    record
        .payments
        .iter()
        .map(|payment| {
            BTreeMap::from([
                ("id", json!(payment.id)),
                ("application_id", json!(record.id)),
                ("gateway", json!(payment.gateway)),
                ("external_ref", json!(payment.external_ref)),
                ("amount", json!(payment.amount)),
                ("status", json!(payment.status)),
                ("outcome", json!(payment.outcome())),
                ("verified_amount", json!(payment.verified_amount)),
                ("failure_reason", json!(payment.failure_reason)),
                ("created_at", json!(payment.created_at)),
            ])
        })
        .collect()
}
