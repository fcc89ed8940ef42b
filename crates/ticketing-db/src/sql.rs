//! Renders query arguments into parameterized PostgreSQL.
//!
//! Identifiers only ever come from [`Field`] metadata; every caller supplied
//! value travels as a bind parameter.

use crate::{
    query::{
        AggregateFn, Aggregations, Direction, Field, FieldKind, FindMany, GroupBy, GroupOrder,
        Having, Mode, Nulls, OrderBy, Predicate, Value, Where,
    },
    Error,
};
use diesel::{
    pg::Pg,
    query_builder::{BoxedSqlQuery, SqlQuery},
    sql_types, QueryableByName,
};
use itertools::Itertools;

pub(crate) type RawQuery = BoxedSqlQuery<'static, Pg, SqlQuery>;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Bind {
    Text(String),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Bool(bool),
    Timestamp(jiff_diesel::Timestamp),
    Date(jiff_diesel::Date),
    TextArray(Vec<String>),
    BigIntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    BoolArray(Vec<bool>),
    TimestampArray(Vec<jiff_diesel::Timestamp>),
    DateArray(Vec<jiff_diesel::Date>),
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct Sql {
    pub(crate) text: String,
    pub(crate) binds: Vec<Bind>,
}

impl Sql {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.text.push_str(text.as_ref());
        self
    }

    /// Registers a bind parameter and returns its placeholder.
    pub(crate) fn bind(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    pub(crate) fn push_bind(&mut self, bind: Bind) -> &mut Self {
        let placeholder = self.bind(bind);
        self.push(placeholder)
    }

    pub(crate) fn into_query(self) -> RawQuery {
        tracing::trace!(sql = %self.text, binds = self.binds.len(), "rendered query");
        let mut query = diesel::sql_query(self.text).into_boxed::<Pg>();
        for bind in self.binds {
            query = match bind {
                Bind::Text(v) => query.bind::<sql_types::Text, _>(v),
                Bind::Int(v) => query.bind::<sql_types::Integer, _>(v),
                Bind::BigInt(v) => query.bind::<sql_types::BigInt, _>(v),
                Bind::Double(v) => query.bind::<sql_types::Double, _>(v),
                Bind::Bool(v) => query.bind::<sql_types::Bool, _>(v),
                Bind::Timestamp(v) => query.bind::<sql_types::Timestamptz, _>(v),
                Bind::Date(v) => query.bind::<sql_types::Date, _>(v),
                Bind::TextArray(v) => query.bind::<sql_types::Array<sql_types::Text>, _>(v),
                Bind::BigIntArray(v) => query.bind::<sql_types::Array<sql_types::BigInt>, _>(v),
                Bind::DoubleArray(v) => query.bind::<sql_types::Array<sql_types::Double>, _>(v),
                Bind::BoolArray(v) => query.bind::<sql_types::Array<sql_types::Bool>, _>(v),
                Bind::TimestampArray(v) => {
                    query.bind::<sql_types::Array<sql_types::Timestamptz>, _>(v)
                }
                Bind::DateArray(v) => query.bind::<sql_types::Array<sql_types::Date>, _>(v),
            };
        }
        query
    }
}

#[derive(QueryableByName)]
pub(crate) struct CountRow {
    #[diesel(sql_type = sql_types::BigInt)]
    pub(crate) count: i64,
}

#[derive(QueryableByName)]
pub(crate) struct FoundRow {
    #[diesel(sql_type = sql_types::Bool)]
    pub(crate) found: bool,
}

#[derive(QueryableByName)]
pub(crate) struct IdRow {
    #[diesel(sql_type = sql_types::Text)]
    pub(crate) id: String,
}

#[derive(QueryableByName)]
pub(crate) struct AggregateRow {
    #[diesel(sql_type = sql_types::Jsonb)]
    pub(crate) aggregates: serde_json::Value,
}

#[derive(QueryableByName)]
pub(crate) struct GroupRow {
    #[diesel(sql_type = sql_types::Jsonb)]
    pub(crate) keys: serde_json::Value,
    #[diesel(sql_type = sql_types::Jsonb)]
    pub(crate) aggregates: serde_json::Value,
}

pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub(crate) fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn mismatch(kind: FieldKind, value: &Value) -> Error {
    Error::Validation(format!("value {value:?} cannot be compared with {kind:?}"))
}

pub(crate) fn scalar_bind(kind: FieldKind, value: &Value) -> Result<Bind, Error> {
    let bind = match (kind, value) {
        (FieldKind::Text, Value::Text(v)) => Bind::Text(v.clone()),
        (FieldKind::Int, Value::Int(v)) => Bind::Int(*v),
        (FieldKind::Int, Value::BigInt(v)) => Bind::BigInt(*v),
        (FieldKind::Double, v) => Bind::Double(v.as_f64().ok_or_else(|| mismatch(kind, v))?),
        (FieldKind::Bool, Value::Bool(v)) => Bind::Bool(*v),
        (FieldKind::Timestamp, Value::Timestamp(v)) => Bind::Timestamp((*v).into()),
        (FieldKind::Date, Value::Date(v)) => Bind::Date((*v).into()),
        (FieldKind::TextArray, Value::TextList(v)) => Bind::TextArray(v.clone()),
        (kind, value) => return Err(mismatch(kind, value)),
    };
    Ok(bind)
}

pub(crate) fn list_bind(kind: FieldKind, values: &[Value]) -> Result<Bind, Error> {
    fn each<T>(
        values: &[Value],
        kind: FieldKind,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Result<Vec<T>, Error> {
        values
            .iter()
            .map(|v| convert(v).ok_or_else(|| mismatch(kind, v)))
            .collect()
    }
    let bind = match kind {
        FieldKind::Text => Bind::TextArray(each(values, kind, |v| v.as_str().map(str::to_owned))?),
        FieldKind::Int => Bind::BigIntArray(each(values, kind, Value::as_i64)?),
        FieldKind::Double => Bind::DoubleArray(each(values, kind, Value::as_f64)?),
        FieldKind::Bool => Bind::BoolArray(each(values, kind, |v| match v {
            Value::Bool(b) => Some(*b),
            _ => None,
        })?),
        FieldKind::Timestamp => Bind::TimestampArray(each(values, kind, |v| match v {
            Value::Timestamp(ts) => Some((*ts).into()),
            _ => None,
        })?),
        FieldKind::Date => Bind::DateArray(each(values, kind, |v| match v {
            Value::Date(d) => Some((*d).into()),
            _ => None,
        })?),
        FieldKind::TextArray | FieldKind::Json => {
            return Err(Error::Validation(format!(
                "set membership cannot be applied to {kind:?}"
            )))
        }
    };
    Ok(bind)
}

fn render_pattern(sql: &mut Sql, expr: &str, pattern: String, mode: Mode) {
    let op = match mode {
        Mode::Default => " LIKE ",
        Mode::Insensitive => " ILIKE ",
    };
    sql.push(expr).push(op).push_bind(Bind::Text(pattern));
}

pub(crate) fn render_predicate(
    sql: &mut Sql,
    expr: &str,
    kind: FieldKind,
    predicate: &Predicate,
) -> Result<(), Error> {
    let compare = |sql: &mut Sql, op: &str, value: &Value| -> Result<(), Error> {
        let bind = scalar_bind(kind, value)?;
        sql.push(expr).push(" ").push(op).push(" ").push_bind(bind);
        Ok(())
    };
    match predicate {
        Predicate::Equals(v) => compare(sql, "=", v)?,
        Predicate::NotEquals(v) => compare(sql, "<>", v)?,
        Predicate::Lt(v) => compare(sql, "<", v)?,
        Predicate::Lte(v) => compare(sql, "<=", v)?,
        Predicate::Gt(v) => compare(sql, ">", v)?,
        Predicate::Gte(v) => compare(sql, ">=", v)?,
        Predicate::In(values) if values.is_empty() => {
            sql.push("FALSE");
        }
        Predicate::In(values) => {
            let bind = list_bind(kind, values)?;
            sql.push(expr).push(" = ANY(").push_bind(bind).push(")");
        }
        Predicate::NotIn(values) if values.is_empty() => {
            sql.push("TRUE");
        }
        Predicate::NotIn(values) => {
            let bind = list_bind(kind, values)?;
            sql.push("NOT (").push(expr).push(" = ANY(").push_bind(bind).push("))");
        }
        Predicate::Contains(needle, mode) => {
            render_pattern(sql, expr, format!("%{}%", escape_like(needle)), *mode)
        }
        Predicate::StartsWith(prefix, mode) => {
            render_pattern(sql, expr, format!("{}%", escape_like(prefix)), *mode)
        }
        Predicate::EndsWith(suffix, mode) => {
            render_pattern(sql, expr, format!("%{}", escape_like(suffix)), *mode)
        }
        Predicate::IsNull => {
            sql.push(expr).push(" IS NULL");
        }
        Predicate::IsNotNull => {
            sql.push(expr).push(" IS NOT NULL");
        }
        Predicate::Has(element) => {
            sql.push_bind(Bind::Text(element.clone())).push(" = ANY(").push(expr).push(")");
        }
        Predicate::HasEvery(elements) => {
            sql.push(expr).push(" @> ").push_bind(Bind::TextArray(elements.clone()));
        }
        Predicate::HasSome(elements) => {
            sql.push(expr).push(" && ").push_bind(Bind::TextArray(elements.clone()));
        }
        Predicate::IsEmpty => {
            sql.push("cardinality(").push(expr).push(") = 0");
        }
    }
    Ok(())
}

fn render_junction<T>(
    sql: &mut Sql,
    items: &[T],
    op: &str,
    empty: &str,
    render: fn(&mut Sql, &T) -> Result<(), Error>,
) -> Result<(), Error> {
    if items.is_empty() {
        sql.push(empty);
        return Ok(());
    }
    sql.push("(");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            sql.push(op);
        }
        sql.push("(");
        render(sql, item)?;
        sql.push(")");
    }
    sql.push(")");
    Ok(())
}

pub(crate) fn render_where<F: Field>(sql: &mut Sql, filter: &Where<F>) -> Result<(), Error> {
    match filter {
        Where::Field(field, predicate) => {
            render_predicate(sql, &quote(field.column()), field.kind(), predicate)
        }
        Where::And(items) => render_junction(sql, items, " AND ", "TRUE", render_where),
        Where::Or(items) => render_junction(sql, items, " OR ", "FALSE", render_where),
        Where::Not(inner) => {
            sql.push("NOT (");
            render_where(sql, inner)?;
            sql.push(")");
            Ok(())
        }
    }
}

fn render_filter<F: Field>(sql: &mut Sql, filter: Option<&Where<F>>) -> Result<(), Error> {
    match filter {
        Some(filter) => {
            sql.push("(");
            render_where(sql, filter)?;
            sql.push(")");
        }
        None => {
            sql.push("TRUE");
        }
    }
    Ok(())
}

fn render_order_item(sql: &mut Sql, expr: &str, direction: Direction, nulls: Nulls) {
    sql.push(expr);
    sql.push(match direction {
        Direction::Asc => " ASC",
        Direction::Desc => " DESC",
    });
    sql.push(match nulls {
        Nulls::First => " NULLS FIRST",
        Nulls::Last => " NULLS LAST",
    });
}

/// Rows strictly after the cursor row on `order`'s key, honoring null placement.
fn render_after<F: Field>(column: &str, pivot: &str, order: &OrderBy<F>) -> String {
    let op = match order.direction {
        Direction::Asc => ">",
        Direction::Desc => "<",
    };
    if !order.field.nullable() {
        return format!("{column} {op} {pivot}");
    }
    match order.effective_nulls() {
        Nulls::Last => {
            format!("({pivot} IS NOT NULL AND ({column} {op} {pivot} OR {column} IS NULL))")
        }
        Nulls::First => {
            format!("({column} IS NOT NULL AND ({pivot} IS NULL OR {column} {op} {pivot}))")
        }
    }
}

/// Keeps rows at or after the cursor row in `order`; an unknown cursor keeps nothing.
fn render_cursor<F: Field>(sql: &mut Sql, order: &[OrderBy<F>], cursor: &str) {
    let table = quote(F::TABLE);
    let id = quote(F::id().column());
    let placeholder = sql.bind(Bind::Text(cursor.to_owned()));
    let keys = match order.iter().position(|o| o.field == F::id()) {
        Some(last) => &order[..=last],
        None => order,
    };
    let mut condition = String::new();
    for (i, key) in keys.iter().enumerate().rev() {
        let column = quote(key.field.column());
        if i == keys.len() - 1 {
            let op = match key.direction {
                Direction::Asc => ">=",
                Direction::Desc => "<=",
            };
            let pivot = if key.field == F::id() {
                placeholder.clone()
            } else {
                format!("(SELECT {column} FROM {table} WHERE {id} = {placeholder})")
            };
            condition = format!("{column} {op} {pivot}");
            continue;
        }
        let pivot = format!("(SELECT {column} FROM {table} WHERE {id} = {placeholder})");
        condition = format!(
            "({} OR ({column} IS NOT DISTINCT FROM {pivot} AND {condition}))",
            render_after(&column, &pivot, key)
        );
    }
    sql.push(format!(
        "EXISTS (SELECT 1 FROM {table} WHERE {id} = {placeholder}) AND {condition}"
    ));
}

fn render_page(sql: &mut Sql, skip: Option<i64>, take: Option<i64>) {
    if let Some(take) = take {
        sql.push(" LIMIT ").push_bind(Bind::BigInt(take.saturating_abs()));
    }
    if let Some(skip) = skip.filter(|skip| *skip > 0) {
        sql.push(" OFFSET ").push_bind(Bind::BigInt(skip));
    }
}

/// `find_many`: rows of the page in storage order; reverse the result when
/// [`FindMany::is_backward`] is set.
pub(crate) fn select_rows<F: Field>(args: &FindMany<F>) -> Result<Sql, Error> {
    args.validate()?;
    let mut sql = Sql::new();
    sql.push("SELECT * FROM ").push(quote(F::TABLE)).push(" WHERE ");
    render_filter(&mut sql, args.filter.as_ref())?;
    let order = args.effective_order();
    if let Some(cursor) = &args.cursor {
        sql.push(" AND ");
        render_cursor(&mut sql, &order, cursor);
    }
    sql.push(" ORDER BY ");
    for (i, item) in order.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        render_order_item(
            &mut sql,
            &quote(item.field.column()),
            item.direction,
            item.effective_nulls(),
        );
    }
    render_page(&mut sql, args.skip, args.take);
    Ok(sql)
}

pub(crate) fn select_ids<F: Field>(filter: Option<&Where<F>>) -> Result<Sql, Error> {
    if let Some(filter) = filter {
        filter.validate()?;
    }
    let id = quote(F::id().column());
    let mut sql = Sql::new();
    sql.push(format!("SELECT {id} AS id FROM {} WHERE ", quote(F::TABLE)));
    render_filter(&mut sql, filter)?;
    sql.push(format!(" ORDER BY {id}"));
    Ok(sql)
}

pub(crate) fn count<F: Field>(filter: Option<&Where<F>>) -> Result<Sql, Error> {
    if let Some(filter) = filter {
        filter.validate()?;
    }
    let mut sql = Sql::new();
    sql.push("SELECT count(*) AS count FROM ").push(quote(F::TABLE)).push(" WHERE ");
    render_filter(&mut sql, filter)?;
    Ok(sql)
}

fn aggregate_expr<F: Field>(function: AggregateFn, field: Option<F>) -> String {
    let Some(field) = field else {
        return "count(*)".to_owned();
    };
    let column = quote(field.column());
    let name = match (function, field.kind()) {
        (AggregateFn::Count, _) => "count",
        (AggregateFn::Avg, _) => "avg",
        (AggregateFn::Sum, _) => "sum",
        (AggregateFn::Min, FieldKind::Bool) => "bool_and",
        (AggregateFn::Max, FieldKind::Bool) => "bool_or",
        (AggregateFn::Min, _) => "min",
        (AggregateFn::Max, _) => "max",
    };
    format!("{name}({column})")
}

fn aggregates_object<F: Field>(aggregations: &Aggregations<F>) -> String {
    let mut sections = Vec::new();
    if aggregations.count {
        sections.push(format!("'{}', count(*)", AggregateFn::Count.key()));
    }
    for (function, fields) in aggregations.by_function() {
        if fields.is_empty() {
            continue;
        }
        let section = match function {
            AggregateFn::Count => "_count_fields",
            other => other.key(),
        };
        let entries = fields
            .iter()
            .map(|f| format!("'{}', {}", f.column(), aggregate_expr(function, Some(*f))))
            .join(", ");
        sections.push(format!("'{section}', jsonb_build_object({entries})"));
    }
    format!("jsonb_build_object({})", sections.join(", "))
}

pub(crate) fn aggregate<F: Field>(
    filter: Option<&Where<F>>,
    aggregations: &Aggregations<F>,
) -> Result<Sql, Error> {
    if let Some(filter) = filter {
        filter.validate()?;
    }
    aggregations.validate()?;
    let mut sql = Sql::new();
    sql.push(format!(
        "SELECT {} AS aggregates FROM {} WHERE ",
        aggregates_object(aggregations),
        quote(F::TABLE)
    ));
    render_filter(&mut sql, filter)?;
    Ok(sql)
}

fn render_having<F: Field>(sql: &mut Sql, having: &Having<F>) -> Result<(), Error> {
    match having {
        Having::Field(field, predicate) => {
            render_predicate(sql, &quote(field.column()), field.kind(), predicate)
        }
        Having::Aggregate(function, field, predicate) => {
            let kind = field.map_or(FieldKind::Int, |f| function.result_kind(f.kind()));
            render_predicate(sql, &aggregate_expr(*function, *field), kind, predicate)
        }
        Having::And(items) => render_junction(sql, items, " AND ", "TRUE", render_having),
        Having::Or(items) => render_junction(sql, items, " OR ", "FALSE", render_having),
        Having::Not(inner) => {
            sql.push("NOT (");
            render_having(sql, inner)?;
            sql.push(")");
            Ok(())
        }
    }
}

pub(crate) fn group_by<F: Field>(args: &GroupBy<F>) -> Result<Sql, Error> {
    args.validate()?;
    let keys = args
        .by
        .iter()
        .map(|f| format!("'{}', {}", f.column(), quote(f.column())))
        .join(", ");
    let columns = args
        .by
        .iter()
        .map(|f| quote(f.column()))
        .join(", ");
    let mut sql = Sql::new();
    sql.push(format!(
        "SELECT jsonb_build_object({keys}) AS keys, {} AS aggregates FROM {} WHERE ",
        aggregates_object(&args.aggregations),
        quote(F::TABLE)
    ));
    render_filter(&mut sql, args.filter.as_ref())?;
    sql.push(" GROUP BY ").push(&columns);
    if let Some(having) = &args.having {
        sql.push(" HAVING (");
        render_having(&mut sql, having)?;
        sql.push(")");
    }
    sql.push(" ORDER BY ");
    let mut ordered = Vec::new();
    for order in &args.order_by {
        let (expr, direction, nulls) = match order {
            GroupOrder::Field(order) => {
                ordered.push(order.field);
                (quote(order.field.column()), order.direction, order.effective_nulls())
            }
            GroupOrder::Aggregate {
                function,
                field,
                direction,
            } => {
                let nulls = match direction {
                    Direction::Asc => Nulls::Last,
                    Direction::Desc => Nulls::First,
                };
                (aggregate_expr(*function, *field), *direction, nulls)
            }
        };
        render_order_item(&mut sql, &expr, direction, nulls);
        sql.push(", ");
    }
    let tie_breakers = args
        .by
        .iter()
        .filter(|f| !ordered.contains(f))
        .map(|f| format!("{} ASC NULLS LAST", quote(f.column())))
        .collect::<Vec<_>>();
    if tie_breakers.is_empty() {
        sql.text.truncate(sql.text.len() - 2);
    } else {
        sql.push(tie_breakers.join(", "));
    }
    render_page(&mut sql, args.skip, args.take);
    Ok(sql)
}

/// Whether any row other than `exclude_id` matches `filter`.
pub(crate) fn exists<F: Field>(filter: &Where<F>, exclude_id: Option<&str>) -> Result<Sql, Error> {
    let mut sql = Sql::new();
    sql.push(format!("SELECT EXISTS (SELECT 1 FROM {} WHERE ", quote(F::TABLE)));
    render_filter(&mut sql, Some(filter))?;
    if let Some(id) = exclude_id {
        sql.push(format!(" AND {} <> ", quote(F::id().column())))
            .push_bind(Bind::Text(id.to_owned()));
    }
    sql.push(") AS found");
    Ok(sql)
}

/// Whether `table.column` holds any of `values`.
pub(crate) fn references(table: &str, column: &str, values: Vec<String>) -> Sql {
    let mut sql = Sql::new();
    sql.push(format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ANY(",
        quote(table),
        quote(column)
    ))
    .push_bind(Bind::TextArray(values))
    .push(")) AS found");
    sql
}
