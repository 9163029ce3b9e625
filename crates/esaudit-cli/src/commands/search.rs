//! `esaudit search` command implementation.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use esaudit_core::{DateFormat, EsAuditConfig};
use esaudit_driver::QueryBuilder;
use serde_json::{Value, json};

use super::{connect, parse_identifier, print_json};

/// Filters given on the command line.
#[derive(Debug, Default)]
pub struct SearchArgs {
    pub auditable_type: Option<String>,
    pub auditable_id: Option<String>,
    pub terms: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub size: Option<usize>,
}

pub async fn run(config: &EsAuditConfig, args: SearchArgs) -> Result<()> {
    let driver = connect(config)?;
    let query = apply(driver.documents().query(), &args, driver.documents().date_format())?;
    let result = query.search().await?;

    print_json(&json!({
        "total": result.total(),
        "hits": result.as_array(),
    }))
}

/// Add the command line filters to a query.
pub fn apply<'a>(
    mut query: QueryBuilder<'a>,
    args: &SearchArgs,
    format: &DateFormat,
) -> Result<QueryBuilder<'a>> {
    if let Some(auditable_type) = &args.auditable_type {
        query = query.set_term("auditable_type", auditable_type.as_str());
    }
    if let Some(auditable_id) = &args.auditable_id {
        query = query.set_term("auditable_id", parse_identifier(auditable_id));
    }
    for term in &args.terms {
        let (field, value) = parse_term(term)?;
        query = query.set_term(field, value);
    }

    let from = args.from.as_deref().map(|raw| parse_date(raw, format)).transpose()?;
    let to = args.to.as_deref().map(|raw| parse_date(raw, format)).transpose()?;
    query = query.set_date_range(from, to);

    if let Some(size) = args.size {
        query = query.size(size);
    }
    Ok(query)
}

/// Split `field=value`. The value is read as JSON when it parses, so
/// `auditable_id=42` filters on a number.
pub fn parse_term(raw: &str) -> Result<(String, Value)> {
    let Some((field, value)) = raw.split_once('=') else {
        bail!("invalid term '{}', expected FIELD=VALUE", raw);
    };
    if field.is_empty() {
        bail!("invalid term '{}', field is empty", raw);
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

/// Accept the configured date pattern first, then RFC 3339.
pub fn parse_date(raw: &str, format: &DateFormat) -> Result<DateTime<Utc>> {
    if let Some(at) = format.parse_datetime(raw) {
        return Ok(at);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .with_context(|| format!("invalid date '{}', expected {} or RFC 3339", raw, format.pattern()))
}
