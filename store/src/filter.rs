use crate::value::IndexValue;

/// Comparison applied by a single filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Matches when the column value is one of the supplied set.
    In,
    IsNull,
    IsNotNull,
}

impl FilterOp {
    fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::In => "IN",
            FilterOp::IsNull => "IS NULL",
            FilterOp::IsNotNull => "IS NOT NULL",
        }
    }
}

/// A single `field op value` clause. Clauses on a [`crate::record::Filter`]
/// are AND-ed together; a clause whose operand is a list is rendered as an
/// `IN (...)` clause.
#[derive(Debug, Clone)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub values: Vec<IndexValue>,
}

/// A query against one collection: a set of AND-ed field filters plus
/// optional ordering and limit. `Filter::new()` with no clauses matches the
/// whole collection.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub clauses: Vec<FilterClause>,
    pub order_by: Option<(&'static str, bool)>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<IndexValue>) -> Self {
        self.clauses.push(FilterClause {
            field: field.to_string(),
            op: FilterOp::Eq,
            values: vec![value.into()],
        });
        self
    }

    pub fn op(mut self, field: &str, op: FilterOp, value: impl Into<IndexValue>) -> Self {
        self.clauses.push(FilterClause {
            field: field.to_string(),
            op,
            values: vec![value.into()],
        });
        self
    }

    pub fn in_set(mut self, field: &str, values: Vec<IndexValue>) -> Self {
        self.clauses.push(FilterClause {
            field: field.to_string(),
            op: FilterOp::In,
            values,
        });
        self
    }

    pub fn order_by(mut self, field: &'static str, ascending: bool) -> Self {
        self.order_by = Some((field, ascending));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Render the `WHERE ...` clause (without the `WHERE` keyword) and the
    /// bound parameters in positional order. Returns `("1=1", [])` for an
    /// unconstrained filter so callers can always splice the result in.
    pub fn to_sql(&self) -> (String, Vec<IndexValue>) {
        if self.clauses.is_empty() {
            return ("1=1".to_string(), Vec::new());
        }
        let mut parts = Vec::with_capacity(self.clauses.len());
        let mut params = Vec::new();
        for clause in &self.clauses {
            match clause.op {
                FilterOp::IsNull | FilterOp::IsNotNull => {
                    parts.push(format!("{} {}", clause.field, clause.op.sql()));
                }
                FilterOp::In => {
                    let placeholders = vec!["?"; clause.values.len()].join(", ");
                    parts.push(format!("{} IN ({})", clause.field, placeholders));
                    params.extend(clause.values.iter().cloned());
                }
                _ => {
                    parts.push(format!("{} {} ?", clause.field, clause.op.sql()));
                    params.push(clause.values[0].clone());
                }
            }
        }
        (parts.join(" AND "), params)
    }

    pub fn order_sql(&self) -> String {
        match self.order_by {
            Some((field, true)) => format!(" ORDER BY {field} ASC"),
            Some((field, false)) => format!(" ORDER BY {field} DESC"),
            None => String::new(),
        }
    }

    pub fn limit_sql(&self) -> String {
        match self.limit {
            Some(n) => format!(" LIMIT {n}"),
            None => String::new(),
        }
    }
}
