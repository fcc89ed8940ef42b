//! Query arguments shared by every entity: field metadata, filter trees,
//! ordering, pagination and aggregation requests.
//!
//! Every argument is checked at runtime before any SQL is rendered; a shape
//! that cannot be executed is reported as [`Error::Validation`].

use crate::Error;
use std::{collections::HashMap, fmt, hash::Hash};

/// Declares the field enum of an entity together with its column metadata.
macro_rules! entity_fields {
    (@nullable) => { false };
    (@nullable nullable) => { true };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident in $table:literal {
            $($variant:ident => $column:literal : $kind:ident $($null:ident)?),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::query::Field for $name {
            const TABLE: &'static str = $table;

            fn id() -> Self {
                Self::Id
            }

            fn column(self) -> &'static str {
                match self {
                    $(Self::$variant => $column),+
                }
            }

            fn kind(self) -> $crate::query::FieldKind {
                match self {
                    $(Self::$variant => $crate::query::FieldKind::$kind),+
                }
            }

            fn nullable(self) -> bool {
                match self {
                    $(Self::$variant => entity_fields!(@nullable $($null)?)),+
                }
            }

            fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }
    };
}

/// Storage type of a column as far as filtering and aggregation care.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    Double,
    Bool,
    Timestamp,
    Date,
    TextArray,
    Json,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Int | FieldKind::Double)
    }

    /// Kinds with a total order usable by ORDER BY, ranges and min/max.
    pub fn is_orderable(self) -> bool {
        !matches!(self, FieldKind::TextArray | FieldKind::Json)
    }

    pub(crate) fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Text, Value::Text(_)) => true,
            (FieldKind::Int, Value::Int(_) | Value::BigInt(_)) => true,
            (FieldKind::Double, Value::Int(_) | Value::BigInt(_) | Value::Double(_)) => true,
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Timestamp, Value::Timestamp(_)) => true,
            (FieldKind::Date, Value::Date(_)) => true,
            (FieldKind::TextArray, Value::TextList(_)) => true,
            _ => false,
        }
    }
}

/// A column of an entity table.
pub trait Field: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id() -> Self;
    fn column(self) -> &'static str;
    fn kind(self) -> FieldKind;
    fn nullable(self) -> bool;
    fn all() -> &'static [Self];

    fn from_column(column: &str) -> Option<Self> {
        Self::all().iter().copied().find(|f| f.column() == column)
    }

    fn equals(self, value: impl Into<Value>) -> Where<Self> {
        Where::Field(self, Predicate::Equals(value.into()))
    }

    fn not_equals(self, value: impl Into<Value>) -> Where<Self> {
        Where::Field(self, Predicate::NotEquals(value.into()))
    }

    fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Where<Self> {
        Where::Field(self, Predicate::In(values.into_iter().map(Into::into).collect()))
    }

    fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Where<Self> {
        Where::Field(self, Predicate::NotIn(values.into_iter().map(Into::into).collect()))
    }

    fn lt(self, value: impl Into<Value>) -> Where<Self> {
        Where::Field(self, Predicate::Lt(value.into()))
    }

    fn lte(self, value: impl Into<Value>) -> Where<Self> {
        Where::Field(self, Predicate::Lte(value.into()))
    }

    fn gt(self, value: impl Into<Value>) -> Where<Self> {
        Where::Field(self, Predicate::Gt(value.into()))
    }

    fn gte(self, value: impl Into<Value>) -> Where<Self> {
        Where::Field(self, Predicate::Gte(value.into()))
    }

    fn contains(self, needle: impl Into<String>) -> Where<Self> {
        Where::Field(self, Predicate::Contains(needle.into(), Mode::Default))
    }

    fn starts_with(self, prefix: impl Into<String>) -> Where<Self> {
        Where::Field(self, Predicate::StartsWith(prefix.into(), Mode::Default))
    }

    fn ends_with(self, suffix: impl Into<String>) -> Where<Self> {
        Where::Field(self, Predicate::EndsWith(suffix.into(), Mode::Default))
    }

    fn is_null(self) -> Where<Self> {
        Where::Field(self, Predicate::IsNull)
    }

    fn is_not_null(self) -> Where<Self> {
        Where::Field(self, Predicate::IsNotNull)
    }

    /// Array field contains the element.
    fn has(self, element: impl Into<String>) -> Where<Self> {
        Where::Field(self, Predicate::Has(element.into()))
    }

    fn asc(self) -> OrderBy<Self> {
        OrderBy::new(self, Direction::Asc)
    }

    fn desc(self) -> OrderBy<Self> {
        OrderBy::new(self, Direction::Desc)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Bool(bool),
    Timestamp(jiff::Timestamp),
    Date(jiff::civil::Date),
    TextList(Vec<String>),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::BigInt(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Reads a value rendered by `to_jsonb` back into the kind of its column.
    pub(crate) fn from_json(kind: FieldKind, json: &serde_json::Value) -> Result<Option<Self>, Error> {
        use serde_json::Value as Json;
        let invalid = || Error::Validation(format!("unexpected {kind:?} value in result: {json}"));
        if json.is_null() {
            return Ok(None);
        }
        let value = match kind {
            FieldKind::Text => Value::Text(json.as_str().ok_or_else(invalid)?.to_owned()),
            FieldKind::Int => {
                let v = json.as_i64().ok_or_else(invalid)?;
                i32::try_from(v).map(Value::Int).unwrap_or(Value::BigInt(v))
            }
            FieldKind::Double => Value::Double(json.as_f64().ok_or_else(invalid)?),
            FieldKind::Bool => Value::Bool(json.as_bool().ok_or_else(invalid)?),
            FieldKind::Timestamp => Value::Timestamp(
                json.as_str()
                    .ok_or_else(invalid)?
                    .parse()
                    .map_err(|_| invalid())?,
            ),
            FieldKind::Date => Value::Date(
                json.as_str()
                    .ok_or_else(invalid)?
                    .parse()
                    .map_err(|_| invalid())?,
            ),
            FieldKind::TextArray => match json {
                Json::Array(items) => Value::TextList(
                    items
                        .iter()
                        .map(|item| item.as_str().map(str::to_owned).ok_or_else(invalid))
                        .collect::<Result<_, _>>()?,
                ),
                _ => return Err(invalid()),
            },
            FieldKind::Json => Value::Json(json.clone()),
        };
        Ok(Some(value))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<jiff::Timestamp> for Value {
    fn from(v: jiff::Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<jiff::civil::Date> for Value {
    fn from(v: jiff::civil::Date) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextList(v)
    }
}

/// Case sensitivity of the string pattern predicates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Default,
    Insensitive,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String, Mode),
    StartsWith(String, Mode),
    EndsWith(String, Mode),
    IsNull,
    IsNotNull,
    Has(String),
    HasEvery(Vec<String>),
    HasSome(Vec<String>),
    IsEmpty,
}

impl Predicate {
    pub fn insensitive(self) -> Self {
        match self {
            Predicate::Contains(v, _) => Predicate::Contains(v, Mode::Insensitive),
            Predicate::StartsWith(v, _) => Predicate::StartsWith(v, Mode::Insensitive),
            Predicate::EndsWith(v, _) => Predicate::EndsWith(v, Mode::Insensitive),
            other => other,
        }
    }

    /// Checks that the predicate can be applied to a value of `kind`.
    pub(crate) fn validate(&self, kind: FieldKind, subject: &str) -> Result<(), Error> {
        let mismatch = |what: &str| {
            Err(Error::Validation(format!(
                "{what} cannot be applied to {subject} ({kind:?})"
            )))
        };
        let check_value = |value: &Value| {
            if kind.accepts(value) {
                Ok(())
            } else {
                Err(Error::Validation(format!(
                    "value {value:?} does not match {subject} ({kind:?})"
                )))
            }
        };
        match self {
            Predicate::IsNull | Predicate::IsNotNull => Ok(()),
            _ if kind == FieldKind::Json => mismatch("only null checks"),
            Predicate::Equals(v) | Predicate::NotEquals(v) => check_value(v),
            Predicate::In(values) | Predicate::NotIn(values) => {
                if kind == FieldKind::TextArray {
                    return mismatch("set membership");
                }
                values.iter().try_for_each(check_value)
            }
            Predicate::Lt(v) | Predicate::Lte(v) | Predicate::Gt(v) | Predicate::Gte(v) => {
                if !kind.is_orderable() || kind == FieldKind::Bool {
                    return mismatch("a range comparison");
                }
                check_value(v)
            }
            Predicate::Contains(..) | Predicate::StartsWith(..) | Predicate::EndsWith(..) => {
                if kind == FieldKind::Text {
                    Ok(())
                } else {
                    mismatch("a string pattern")
                }
            }
            Predicate::Has(_) | Predicate::HasEvery(_) | Predicate::HasSome(_) | Predicate::IsEmpty => {
                if kind == FieldKind::TextArray {
                    Ok(())
                } else {
                    mismatch("an array predicate")
                }
            }
        }
    }
}

/// Filter tree over the fields of one entity.
#[derive(Clone, Debug, PartialEq)]
pub enum Where<F> {
    Field(F, Predicate),
    And(Vec<Where<F>>),
    Or(Vec<Where<F>>),
    Not(Box<Where<F>>),
}

impl<F: Field> Where<F> {
    pub fn all(conditions: impl IntoIterator<Item = Where<F>>) -> Self {
        Where::And(conditions.into_iter().collect())
    }

    pub fn any(conditions: impl IntoIterator<Item = Where<F>>) -> Self {
        Where::Or(conditions.into_iter().collect())
    }

    pub fn and(self, other: Where<F>) -> Self {
        match self {
            Where::And(mut conditions) => {
                conditions.push(other);
                Where::And(conditions)
            }
            this => Where::And(vec![this, other]),
        }
    }

    pub fn or(self, other: Where<F>) -> Self {
        match self {
            Where::Or(mut conditions) => {
                conditions.push(other);
                Where::Or(conditions)
            }
            this => Where::Or(vec![this, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Where::Not(Box::new(self))
    }

    /// Makes every string pattern in the tree case-insensitive (`ILIKE`).
    pub fn insensitive(self) -> Self {
        match self {
            Where::Field(field, predicate) => Where::Field(field, predicate.insensitive()),
            Where::And(conditions) => {
                Where::And(conditions.into_iter().map(Where::insensitive).collect())
            }
            Where::Or(conditions) => {
                Where::Or(conditions.into_iter().map(Where::insensitive).collect())
            }
            Where::Not(inner) => Where::Not(Box::new(inner.insensitive())),
        }
    }

    /// Restricts an optional caller filter to `scope`.
    pub(crate) fn scoped(scope: Where<F>, filter: Option<Where<F>>) -> Self {
        match filter {
            Some(filter) => scope.and(filter),
            None => scope,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        match self {
            Where::Field(field, predicate) => predicate.validate(field.kind(), field.column()),
            Where::And(conditions) | Where::Or(conditions) => {
                conditions.iter().try_for_each(Where::validate)
            }
            Where::Not(inner) => inner.validate(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn reverse(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderBy<F> {
    pub field: F,
    pub direction: Direction,
    pub nulls: Option<Nulls>,
}

impl<F: Field> OrderBy<F> {
    pub fn new(field: F, direction: Direction) -> Self {
        Self {
            field,
            direction,
            nulls: None,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(Nulls::First);
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(Nulls::Last);
        self
    }

    /// Null placement made explicit; PostgreSQL sorts nulls as the largest value.
    pub(crate) fn effective_nulls(&self) -> Nulls {
        self.nulls.unwrap_or(match self.direction {
            Direction::Asc => Nulls::Last,
            Direction::Desc => Nulls::First,
        })
    }

    pub(crate) fn reversed(&self) -> Self {
        Self {
            field: self.field,
            direction: self.direction.reverse(),
            nulls: Some(match self.effective_nulls() {
                Nulls::First => Nulls::Last,
                Nulls::Last => Nulls::First,
            }),
        }
    }
}

/// Arguments of `find_many` / `find_first`.
#[derive(Clone, Debug, PartialEq)]
pub struct FindMany<F> {
    pub filter: Option<Where<F>>,
    pub order_by: Vec<OrderBy<F>>,
    /// Id of the row the page starts at (inclusive).
    pub cursor: Option<String>,
    pub skip: Option<i64>,
    /// Negative values page backward.
    pub take: Option<i64>,
}

impl<F> Default for FindMany<F> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            cursor: None,
            skip: None,
            take: None,
        }
    }
}

impl<F: Field> FindMany<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Where<F>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy<F>) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn cursor(mut self, id: impl Into<String>) -> Self {
        self.cursor = Some(id.into());
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub(crate) fn is_backward(&self) -> bool {
        self.take.is_some_and(|take| take < 0)
    }

    /// Caller ordering with the id appended as tie-breaker, reversed when paging backward.
    pub(crate) fn effective_order(&self) -> Vec<OrderBy<F>> {
        let mut order = self.order_by.clone();
        if !order.iter().any(|o| o.field == F::id()) {
            order.push(F::id().asc());
        }
        if self.is_backward() {
            order.iter().map(OrderBy::reversed).collect()
        } else {
            order
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        if let Some(order) = self.order_by.iter().find(|o| !o.field.kind().is_orderable()) {
            return Err(Error::Validation(format!(
                "{} cannot be used for ordering",
                order.field.column()
            )));
        }
        if self.skip.is_some_and(|skip| skip < 0) {
            return Err(Error::Validation("skip must not be negative".to_owned()));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFn {
    pub(crate) fn key(self) -> &'static str {
        match self {
            AggregateFn::Count => "_count",
            AggregateFn::Avg => "_avg",
            AggregateFn::Sum => "_sum",
            AggregateFn::Min => "_min",
            AggregateFn::Max => "_max",
        }
    }

    /// Kind of the aggregate's result over a field of `kind`.
    pub(crate) fn result_kind(self, kind: FieldKind) -> FieldKind {
        match self {
            AggregateFn::Count => FieldKind::Int,
            AggregateFn::Avg => FieldKind::Double,
            AggregateFn::Sum | AggregateFn::Min | AggregateFn::Max => kind,
        }
    }

    pub(crate) fn validate<F: Field>(self, field: Option<F>) -> Result<(), Error> {
        let Some(field) = field else {
            return match self {
                AggregateFn::Count => Ok(()),
                _ => Err(Error::Validation(format!("{} requires a field", self.key()))),
            };
        };
        let kind = field.kind();
        let valid = match self {
            AggregateFn::Count => true,
            AggregateFn::Avg | AggregateFn::Sum => kind.is_numeric(),
            AggregateFn::Min | AggregateFn::Max => kind.is_orderable(),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "{} cannot be applied to {} ({kind:?})",
                self.key(),
                field.column()
            )))
        }
    }
}

/// Which rollups to compute.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregations<F> {
    pub count: bool,
    pub count_fields: Vec<F>,
    pub avg: Vec<F>,
    pub sum: Vec<F>,
    pub min: Vec<F>,
    pub max: Vec<F>,
}

impl<F> Default for Aggregations<F> {
    fn default() -> Self {
        Self {
            count: false,
            count_fields: Vec::new(),
            avg: Vec::new(),
            sum: Vec::new(),
            min: Vec::new(),
            max: Vec::new(),
        }
    }
}

impl<F: Field> Aggregations<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn count_field(mut self, field: F) -> Self {
        self.count_fields.push(field);
        self
    }

    pub fn avg(mut self, field: F) -> Self {
        self.avg.push(field);
        self
    }

    pub fn sum(mut self, field: F) -> Self {
        self.sum.push(field);
        self
    }

    pub fn min(mut self, field: F) -> Self {
        self.min.push(field);
        self
    }

    pub fn max(mut self, field: F) -> Self {
        self.max.push(field);
        self
    }

    pub(crate) fn by_function(&self) -> [(AggregateFn, &[F]); 5] {
        [
            (AggregateFn::Count, &self.count_fields),
            (AggregateFn::Avg, &self.avg),
            (AggregateFn::Sum, &self.sum),
            (AggregateFn::Min, &self.min),
            (AggregateFn::Max, &self.max),
        ]
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.by_function()
            .into_iter()
            .try_for_each(|(function, fields)| {
                fields.iter().try_for_each(|f| function.validate(Some(*f)))
            })
    }
}

/// Rollups of one `aggregate` call or one `group_by` group.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateResult<F: Field> {
    pub count: Option<i64>,
    pub count_fields: HashMap<F, i64>,
    pub avg: HashMap<F, Option<f64>>,
    pub sum: HashMap<F, Option<Value>>,
    pub min: HashMap<F, Option<Value>>,
    pub max: HashMap<F, Option<Value>>,
}

impl<F: Field> Default for AggregateResult<F> {
    fn default() -> Self {
        Self {
            count: None,
            count_fields: HashMap::new(),
            avg: HashMap::new(),
            sum: HashMap::new(),
            min: HashMap::new(),
            max: HashMap::new(),
        }
    }
}

impl<F: Field> AggregateResult<F> {
    pub fn sum_of(&self, field: F) -> Option<&Value> {
        self.sum.get(&field).and_then(Option::as_ref)
    }

    pub fn avg_of(&self, field: F) -> Option<f64> {
        self.avg.get(&field).copied().flatten()
    }

    pub fn min_of(&self, field: F) -> Option<&Value> {
        self.min.get(&field).and_then(Option::as_ref)
    }

    pub fn max_of(&self, field: F) -> Option<&Value> {
        self.max.get(&field).and_then(Option::as_ref)
    }

    pub(crate) fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        let mut result = Self {
            count: json.get(AggregateFn::Count.key()).and_then(serde_json::Value::as_i64),
            ..Self::default()
        };
        let section = |name: &str| -> Vec<(F, &serde_json::Value)> {
            json.get(name)
                .and_then(serde_json::Value::as_object)
                .map(|object| {
                    object
                        .iter()
                        .filter_map(|(column, value)| F::from_column(column).map(|f| (f, value)))
                        .collect()
                })
                .unwrap_or_default()
        };
        for (field, value) in section("_count_fields") {
            result.count_fields.insert(field, value.as_i64().unwrap_or(0));
        }
        for (field, value) in section(AggregateFn::Avg.key()) {
            result.avg.insert(field, value.as_f64());
        }
        for (function, target) in [
            (AggregateFn::Sum, &mut result.sum),
            (AggregateFn::Min, &mut result.min),
            (AggregateFn::Max, &mut result.max),
        ] {
            for (field, value) in section(function.key()) {
                target.insert(field, Value::from_json(function.result_kind(field.kind()), value)?);
            }
        }
        Ok(result)
    }
}

/// Post-aggregation filter of `group_by`.
#[derive(Clone, Debug, PartialEq)]
pub enum Having<F> {
    Field(F, Predicate),
    /// `field` is `None` only for `count(*)`.
    Aggregate(AggregateFn, Option<F>, Predicate),
    And(Vec<Having<F>>),
    Or(Vec<Having<F>>),
    Not(Box<Having<F>>),
}

impl<F: Field> Having<F> {
    pub fn count(predicate: Predicate) -> Self {
        Having::Aggregate(AggregateFn::Count, None, predicate)
    }

    pub fn aggregate(function: AggregateFn, field: F, predicate: Predicate) -> Self {
        Having::Aggregate(function, Some(field), predicate)
    }

    fn collect_fields(&self, fields: &mut Vec<F>) {
        match self {
            Having::Field(field, _) => fields.push(*field),
            Having::Aggregate(..) => (),
            Having::And(items) | Having::Or(items) => {
                items.iter().for_each(|item| item.collect_fields(fields))
            }
            Having::Not(inner) => inner.collect_fields(fields),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        match self {
            Having::Field(field, predicate) => predicate.validate(field.kind(), field.column()),
            Having::Aggregate(function, field, predicate) => {
                function.validate(*field)?;
                let kind = field.map_or(FieldKind::Int, |f| function.result_kind(f.kind()));
                predicate.validate(kind, function.key())
            }
            Having::And(items) | Having::Or(items) => items.iter().try_for_each(Having::validate),
            Having::Not(inner) => inner.validate(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GroupOrder<F> {
    Field(OrderBy<F>),
    Aggregate {
        function: AggregateFn,
        field: Option<F>,
        direction: Direction,
    },
}

/// Arguments of `group_by`.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupBy<F> {
    pub by: Vec<F>,
    pub filter: Option<Where<F>>,
    pub having: Option<Having<F>>,
    pub order_by: Vec<GroupOrder<F>>,
    pub aggregations: Aggregations<F>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
}

impl<F: Field> GroupBy<F> {
    pub fn new(by: impl IntoIterator<Item = F>) -> Self {
        Self {
            by: by.into_iter().collect(),
            filter: None,
            having: None,
            order_by: Vec::new(),
            aggregations: Aggregations::default(),
            skip: None,
            take: None,
        }
    }

    pub fn filter(mut self, filter: Where<F>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn having(mut self, having: Having<F>) -> Self {
        self.having = Some(having);
        self
    }

    pub fn order_by(mut self, order: GroupOrder<F>) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn aggregations(mut self, aggregations: Aggregations<F>) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    /// Every plain field referenced by `having` or `order_by` must be grouped on.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.by.is_empty() {
            return Err(Error::Validation("group_by requires at least one field".to_owned()));
        }
        let mut referenced = Vec::new();
        if let Some(having) = &self.having {
            having.collect_fields(&mut referenced);
        }
        for order in &self.order_by {
            match order {
                GroupOrder::Field(order) => referenced.push(order.field),
                GroupOrder::Aggregate {
                    function, field, ..
                } => function.validate(*field)?,
            }
        }
        if let Some(missing) = referenced.iter().find(|f| !self.by.contains(f)) {
            return Err(Error::Validation(format!(
                "{} is referenced by having/order_by but is not part of by",
                missing.column()
            )));
        }
        if let Some(filter) = &self.filter {
            filter.validate()?;
        }
        if let Some(having) = &self.having {
            having.validate()?;
        }
        if self.skip.is_some_and(|skip| skip < 0) || self.take.is_some_and(|take| take < 0) {
            return Err(Error::Validation(
                "group_by skip and take must not be negative".to_owned(),
            ));
        }
        self.aggregations.validate()
    }
}

/// One group produced by `group_by`.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupRow<F: Field> {
    pub keys: HashMap<F, Option<Value>>,
    pub aggregates: AggregateResult<F>,
}

impl<F: Field> GroupRow<F> {
    pub fn key(&self, field: F) -> Option<&Value> {
        self.keys.get(&field).and_then(Option::as_ref)
    }

    pub(crate) fn from_json(keys: &serde_json::Value, aggregates: &serde_json::Value) -> Result<Self, Error> {
        let mut row = Self {
            keys: HashMap::new(),
            aggregates: AggregateResult::from_json(aggregates)?,
        };
        if let Some(object) = keys.as_object() {
            for (column, value) in object {
                if let Some(field) = F::from_column(column) {
                    row.keys.insert(field, Value::from_json(field.kind(), value)?);
                }
            }
        }
        Ok(row)
    }
}
