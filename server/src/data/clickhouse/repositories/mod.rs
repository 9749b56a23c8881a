//! Warehouse repositories
//!
//! Row structs plus batch insert and fetch operations per table. All
//! user-controllable values are bound as parameters; table and column names
//! are compile-time constants.

pub mod enriched;
pub mod log;
pub mod metric;
pub mod span;
pub mod watermark;

use time::OffsetDateTime;

use crate::utils::time::unix_nanos;

/// Query parameter that can be bound to ClickHouse queries
#[derive(Clone)]
enum QueryParam {
    String(String),
    /// Timestamps as unix nanoseconds
    Int64(i64),
}

/// Builder for constructing parameterized SQL WHERE clauses.
///
/// Collects conditions and their parameter values, then binds all
/// parameters to a query in order.
#[derive(Default)]
struct ConditionBuilder {
    conditions: Vec<String>,
    params: Vec<QueryParam>,
}

impl ConditionBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Add an IN condition: `column IN (?, ?, ...)`. Empty lists add nothing.
    fn add_in(&mut self, column: &str, values: &[String]) {
        if values.is_empty() {
            return;
        }
        let placeholders: Vec<&str> = values.iter().map(|_| "?").collect();
        self.conditions
            .push(format!("{} IN ({})", column, placeholders.join(", ")));
        for v in values {
            self.params.push(QueryParam::String(v.clone()));
        }
    }

    /// Add a timestamp >= condition bound as unix nanoseconds
    fn add_timestamp_gte(&mut self, column: &str, ts: OffsetDateTime) {
        self.conditions
            .push(format!("{} >= fromUnixTimestamp64Nano(?)", column));
        self.params.push(QueryParam::Int64(unix_nanos(ts)));
    }

    /// Add a timestamp <= condition bound as unix nanoseconds
    fn add_timestamp_lte(&mut self, column: &str, ts: OffsetDateTime) {
        self.conditions
            .push(format!("{} <= fromUnixTimestamp64Nano(?)", column));
        self.params.push(QueryParam::Int64(unix_nanos(ts)));
    }

    /// Build the WHERE clause (without the "WHERE" keyword)
    fn build(&self) -> String {
        self.conditions.join(" AND ")
    }

    /// Bind all collected parameters to a query, in condition order
    fn bind_to(&self, mut query: clickhouse::query::Query) -> clickhouse::query::Query {
        for param in &self.params {
            query = match param {
                QueryParam::String(s) => query.bind(s),
                QueryParam::Int64(i) => query.bind(i),
            };
        }
        query
    }
}
