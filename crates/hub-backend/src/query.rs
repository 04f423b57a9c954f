//! Declarative queries against named collections.
//!
//! A [`QueryBuilder`] accumulates a [`Query`] and hands it to the backend's
//! [`Datastore`] together with the bearer token of the current session.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::BackendClient;
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    Is,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::ILike => "ilike",
            Self::Is => "is",
            Self::In => "in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    /// Query-string form, e.g. `("status", "eq.open")`.
    pub fn to_param(&self) -> (String, String) {
        let rendered = match (&self.op, &self.value) {
            (FilterOp::In, Value::Array(items)) => {
                let inner: Vec<String> = items.iter().map(render_in_item).collect();
                format!("({})", inner.join(","))
            }
            (_, value) => render_scalar(value),
        };
        (self.column.clone(), format!("{}.{}", self.op.as_str(), rendered))
    }

    /// Evaluate against a row held in memory.
    pub fn matches(&self, row: &Value) -> bool {
        let field = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => values_equal(field, &self.value),
            FilterOp::Neq => !field.is_null() && !values_equal(field, &self.value),
            FilterOp::Gt => compare(field, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(field, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare(field, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(field, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Like => like(field, &self.value, false),
            FilterOp::ILike => like(field, &self.value, true),
            FilterOp::Is => match &self.value {
                Value::Null => field.is_null(),
                other => field == other,
            },
            FilterOp::In => match &self.value {
                Value::Array(items) => items.iter().any(|v| values_equal(field, v)),
                _ => false,
            },
        }
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_in_item(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains([',', '(', ')', '"']) => {
            format!("\"{}\"", s.replace('"', "\\\""))
        }
        other => render_scalar(other),
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two scalars of the same kind; `None` otherwise.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like(field: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Value::String(text), Value::String(pattern)) = (field, pattern) else {
        return false;
    };
    if case_insensitive {
        wildcard_match(&text.to_lowercase(), &pattern.to_lowercase())
    } else {
        wildcard_match(text, pattern)
    }
}

/// `%` and `*` match any run of characters.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && matches!(pattern[p], '%' | '*') {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| matches!(c, '%' | '*'))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select { columns: String },
    Insert { rows: Vec<Value> },
    Update { patch: Value },
    Delete,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Select { .. } => "select",
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub operation: Operation,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    /// Ask for the total number of matching rows, ignoring offset/limit.
    pub count: bool,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            operation: Operation::Select {
                columns: "*".to_string(),
            },
            filters: Vec::new(),
            order: Vec::new(),
            offset: None,
            limit: None,
            count: false,
        }
    }

    pub fn validate(&self) -> Result<(), BackendError> {
        if self.collection.is_empty()
            || !self
                .collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(BackendError::InvalidQuery(format!(
                "invalid collection name '{}'",
                self.collection
            )));
        }
        match &self.operation {
            Operation::Update { .. } | Operation::Delete if self.filters.is_empty() => {
                Err(BackendError::InvalidQuery(format!(
                    "{} on '{}' requires at least one filter",
                    self.operation.name(),
                    self.collection
                )))
            }
            Operation::Insert { rows } if rows.is_empty() => Err(BackendError::InvalidQuery(
                format!("insert into '{}' has no rows", self.collection),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub rows: Vec<Value>,
    pub count: Option<usize>,
}

impl QueryResponse {
    pub fn first(self) -> Option<Value> {
        self.rows.into_iter().next()
    }

    pub fn into_typed<T: DeserializeOwned>(self) -> Result<Vec<T>, BackendError> {
        self.rows
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(BackendError::from))
            .collect()
    }
}

/// Remote (or in-process) collection storage.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Run `query` on behalf of the holder of `bearer`.
    async fn execute(&self, query: Query, bearer: &str) -> Result<QueryResponse, BackendError>;
}

/// Query under construction; created by [`BackendClient::from`].
pub struct QueryBuilder<'a> {
    client: &'a BackendClient,
    query: Query,
    deferred: Option<BackendError>,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(client: &'a BackendClient, collection: &str) -> Self {
        Self {
            client,
            query: Query::new(collection),
            deferred: None,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.query.operation = Operation::Select {
            columns: columns.to_string(),
        };
        self
    }

    /// Insert one row (an object) or several (an array of objects).
    pub fn insert(mut self, rows: impl Serialize) -> Self {
        match serde_json::to_value(rows) {
            Ok(Value::Array(rows)) => self.query.operation = Operation::Insert { rows },
            Ok(row @ Value::Object(_)) => self.query.operation = Operation::Insert { rows: vec![row] },
            Ok(_) => self.defer(BackendError::InvalidQuery("insert expects objects".into())),
            Err(e) => self.defer(e.into()),
        }
        self
    }

    pub fn update(mut self, patch: impl Serialize) -> Self {
        match serde_json::to_value(patch) {
            Ok(patch @ Value::Object(_)) => self.query.operation = Operation::Update { patch },
            Ok(_) => self.defer(BackendError::InvalidQuery("update expects an object".into())),
            Err(e) => self.defer(e.into()),
        }
        self
    }

    pub fn delete(mut self) -> Self {
        self.query.operation = Operation::Delete;
        self
    }

    fn filter(mut self, column: &str, op: FilterOp, value: Value) -> Self {
        self.query.filters.push(Filter {
            column: column.to_string(),
            op,
            value,
        });
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Eq, value.into())
    }

    pub fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Neq, value.into())
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gt, value.into())
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Gte, value.into())
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lt, value.into())
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, FilterOp::Lte, value.into())
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, FilterOp::Like, Value::from(pattern))
    }

    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(column, FilterOp::ILike, Value::from(pattern))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, FilterOp::Is, Value::Null)
    }

    pub fn in_list<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(column, FilterOp::In, Value::Array(values))
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.query.order.push(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    /// Inclusive row range, zero-based.
    pub fn range(mut self, from: usize, to: usize) -> Self {
        if to < from {
            self.defer(BackendError::InvalidQuery(format!(
                "range end {to} is before start {from}"
            )));
            return self;
        }
        self.query.offset = Some(from);
        self.query.limit = Some(to - from + 1);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.query.limit = Some(n);
        self
    }

    pub fn count_exact(mut self) -> Self {
        self.query.count = true;
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    fn defer(&mut self, err: BackendError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    pub async fn execute(self) -> Result<QueryResponse, BackendError> {
        if let Some(err) = self.deferred {
            return Err(err);
        }
        self.query.validate()?;
        let bearer = self.client.bearer_token().await?;
        self.client
            .backend()
            .store()
            .execute(self.query, &bearer)
            .await
    }

    /// First row, if any.
    pub async fn execute_one(self) -> Result<Option<Value>, BackendError> {
        Ok(self.limit(1).execute().await?.first())
    }

    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>, BackendError> {
        self.execute().await?.into_typed()
    }
}
