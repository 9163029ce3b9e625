//! Structured audit queries.
//!
//! [`QueryCriteria`] is a plain value: a date range on `created_at` plus exact
//! term filters, rendered into a `bool`/`must` query. [`QueryBuilder`] binds
//! criteria to a document service and is consumed by [`QueryBuilder::search`].

use chrono::{DateTime, Utc};
use esaudit_core::DateFormat;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::document::AuditDocumentService;
use crate::error::AuditError;

/// Field the date range applies to.
pub const DATE_FIELD: &str = "created_at";

/// Inclusive date range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Accumulated filters for one logical query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCriteria {
    date_range: Option<DateRange>,
    terms: BTreeMap<String, Value>,
    size: Option<usize>,
}

impl QueryCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the date range. Passing two open bounds clears it.
    pub fn set_date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_range = match (from, to) {
            (None, None) => None,
            (from, to) => Some(DateRange { from, to }),
        };
        self
    }

    /// Set an exact-match filter. A null value clears the filter on `field`.
    pub fn set_term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        let field = field.into();
        match value.into() {
            Value::Null => {
                self.terms.remove(&field);
            }
            value => {
                self.terms.insert(field, value);
            }
        }
        self
    }

    /// Cap the number of returned hits.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    pub fn terms(&self) -> &BTreeMap<String, Value> {
        &self.terms
    }

    /// No filter at all: the query matches every document.
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none() && self.terms.is_empty()
    }

    /// Render the `query` clause.
    pub fn to_query(&self, format: &DateFormat) -> Value {
        if self.is_empty() {
            return json!({ "match_all": {} });
        }

        let mut must = Vec::with_capacity(self.terms.len() + 1);

        if let Some(range) = &self.date_range {
            let mut bounds = Map::new();
            if let Some(from) = &range.from {
                bounds.insert("gte".to_string(), Value::String(format.format(from)));
            }
            if let Some(to) = &range.to {
                bounds.insert("lte".to_string(), Value::String(format.format(to)));
            }
            bounds.insert("format".to_string(), Value::String(format.pattern().to_string()));
            must.push(json!({ "range": { DATE_FIELD: bounds } }));
        }

        for (field, value) in &self.terms {
            must.push(json!({ "term": { field.as_str(): value } }));
        }

        json!({ "bool": { "must": must } })
    }

    /// Render the full `_search` body.
    pub fn render(&self, format: &DateFormat) -> Value {
        let mut body = json!({ "query": self.to_query(format) });
        if let Some(size) = self.size {
            body["size"] = json!(size);
        }
        body
    }
}

/// Criteria bound to the document service that will run them.
///
/// `search` takes the builder by value, so a builder runs exactly one query.
pub struct QueryBuilder<'a> {
    service: &'a AuditDocumentService,
    criteria: QueryCriteria,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(service: &'a AuditDocumentService) -> Self {
        Self {
            service,
            criteria: QueryCriteria::new(),
        }
    }

    pub fn set_date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.criteria = self.criteria.set_date_range(from, to);
        self
    }

    pub fn set_term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria = self.criteria.set_term(field, value);
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.criteria = self.criteria.size(size);
        self
    }

    pub fn criteria(&self) -> &QueryCriteria {
        &self.criteria
    }

    /// Run the query.
    pub async fn search(self) -> Result<SearchResult, AuditError> {
        self.service.search(self.criteria).await
    }
}

/// Outcome of one executed query.
///
/// Holds the engine response; the accessors never query again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    total: u64,
    hits: Vec<Value>,
}

impl SearchResult {
    /// Read `hits.total` and `hits.hits` from a `_search` response.
    pub fn from_response(body: &Value) -> Self {
        let hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // `hits.total` is an object since 7.x and a bare number before
        let total = body
            .pointer("/hits/total/value")
            .or_else(|| body.pointer("/hits/total"))
            .and_then(Value::as_u64)
            .unwrap_or(hits.len() as u64);

        Self { total, hits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether at least one document matched.
    pub fn as_bool(&self) -> bool {
        self.total > 0 || !self.hits.is_empty()
    }

    /// The matched hits as returned by the engine.
    pub fn as_array(&self) -> &[Value] {
        &self.hits
    }

    /// Total number of matches, which can exceed the returned hits.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Document ids of the returned hits.
    pub fn ids(&self) -> Vec<&str> {
        self.hits
            .iter()
            .filter_map(|hit| hit.get("_id").and_then(Value::as_str))
            .collect()
    }

    /// Stored documents of the returned hits.
    pub fn sources(&self) -> impl Iterator<Item = &Value> {
        self.hits.iter().filter_map(|hit| hit.get("_source"))
    }
}
