use diesel_async::{
    pooled_connection::{
        mobc::{Builder, Pool},
        AsyncDieselConnectionManager,
    },
    scoped_futures::ScopedBoxFuture,
    AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection,
};
use std::{fmt, str::FromStr, time::Duration};

pub use diesel_async::scoped_futures::ScopedFutureExt;

#[macro_use]
pub mod query;
pub mod entities;
pub mod integrity;
pub mod models;
pub mod repository;
mod schema;
mod sql;
#[cfg(test)]
mod tests;

pub use entities::{
    check_ins::{CheckInField, CheckInKey},
    event_analytics::{AnalyticsKey, EventAnalyticsField},
    events::{EventField, EventKey},
    orders::{OrderField, OrderKey},
    ticket_tiers::{TicketTierField, TierKey},
    tickets::{TicketField, TicketKey},
    users::{UserField, UserKey},
};
pub use query::{
    AggregateFn, AggregateResult, Aggregations, Direction, Field, FieldKind, FindMany, GroupBy,
    GroupOrder, GroupRow, Having, Mode, Nulls, OrderBy, Predicate, Value, Where,
};
pub use repository::{
    Analytics, CheckIns, Entity, Events, Orders, Repository, TicketTiers, Tickets, Users,
};

const SCHEMA: &str = include_str!("../migrations/2025-03-01-000000_create_ticketing/up.sql");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    /// A NOT NULL column received no value.
    Required,
    /// A CHECK constraint, or the opt-in [`integrity::check_email`], rejected a value.
    Check,
    ForeignKey,
    Unique,
    /// A delete would orphan dependent rows.
    Restrict,
}

/// The integrity rule a write broke, named after the schema constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub name: String,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.kind, self.name)
    }
}

/// Coarse classification of [`Error`] for callers that only branch on the category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ConstraintViolation,
    Validation,
    Transport,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("constraint violation: {0}")]
    ConstraintViolation(Constraint),
    #[error("invalid query: {0}")]
    Validation(String),
    /// Bad `DATABASE_URL` or `TICKETING_DB_*` settings; classed as [`ErrorKind::Transport`].
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("getting connection from pool: {0}")]
    GetConnectionPool(#[from] mobc::Error<diesel_async::pooled_connection::PoolError>),
    #[error("database failure: {0}")]
    Transport(diesel::result::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Configuration(_) | Error::GetConnectionPool(_) | Error::Transport(_) => {
                ErrorKind::Transport
            }
        }
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        match self {
            Error::ConstraintViolation(constraint) => Some(constraint),
            _ => None,
        }
    }

    /// The transaction lost a serialization conflict and may be retried.
    pub fn is_serialization_failure(&self) -> bool {
        matches!(
            self,
            Error::Transport(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::SerializationFailure,
                _
            ))
        )
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        if let DieselError::DatabaseError(kind, info) = &err {
            let constraint_kind = match kind {
                DatabaseErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
                DatabaseErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
                DatabaseErrorKind::NotNullViolation => Some(ConstraintKind::Required),
                DatabaseErrorKind::CheckViolation => Some(ConstraintKind::Check),
                _ => None,
            };
            if let Some(constraint_kind) = constraint_kind {
                let name = info
                    .constraint_name()
                    .or_else(|| info.column_name())
                    .or_else(|| info.table_name())
                    .unwrap_or("unknown");
                return Error::ConstraintViolation(Constraint::new(constraint_kind, name));
            }
        }
        match err {
            DieselError::NotFound => Error::NotFound { entity: "record" },
            other => Error::Transport(other),
        }
    }
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub db_url: String,
    pub max_open: u64,
    pub max_idle: u64,
    #[serde(with = "humantime_serde", default)]
    pub max_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde", default)]
    pub max_idle_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub timeout_for_get: Duration,
    /// Server side limit for every statement run through the pool.
    #[serde(with = "humantime_serde", default)]
    pub statement_timeout: Option<Duration>,
}

impl Config {
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            max_open: 10,
            max_idle: 2,
            max_lifetime: None,
            max_idle_lifetime: None,
            timeout_for_get: Duration::from_secs(5),
            statement_timeout: None,
        }
    }

    /// Reads `DATABASE_URL` and the optional `TICKETING_DB_*` overrides, after loading `.env`.
    pub fn from_env() -> Result<Self, Error> {
        dotenvy::dotenv().ok();
        let db_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Configuration("DATABASE_URL must be set".to_owned()))?;
        let mut config = Self::new(db_url);
        config.apply_env()?;
        Ok(config)
    }

    /// Overrides pool settings from `TICKETING_DB_*` variables that are set.
    pub fn apply_env(&mut self) -> Result<(), Error> {
        if let Some(v) = env_parse("TICKETING_DB_MAX_OPEN")? {
            self.max_open = v;
        }
        if let Some(v) = env_parse("TICKETING_DB_MAX_IDLE")? {
            self.max_idle = v;
        }
        if let Some(v) = env_duration("TICKETING_DB_TIMEOUT_FOR_GET")? {
            self.timeout_for_get = v;
        }
        if let Some(v) = env_duration("TICKETING_DB_STATEMENT_TIMEOUT")? {
            self.statement_timeout = Some(v);
        }
        Ok(())
    }

    /// The database url with the statement timeout passed as a startup option.
    pub fn connection_url(&self) -> String {
        match self.statement_timeout {
            Some(timeout) => {
                let separator = if self.db_url.contains('?') { '&' } else { '?' };
                format!(
                    "{}{separator}options=-c%20statement_timeout%3D{}",
                    self.db_url,
                    timeout.as_millis()
                )
            }
            None => self.db_url.clone(),
        }
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| Error::Configuration(format!("{name}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn env_duration(name: &str) -> Result<Option<Duration>, Error> {
    match std::env::var(name) {
        Ok(value) => humantime::parse_duration(value.trim())
            .map(Some)
            .map_err(|err| Error::Configuration(format!("{name}: {err}"))),
        Err(_) => Ok(None),
    }
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: Pool<AsyncPgConnection>,
}

pub async fn create(config: &Config) -> Result<Store, Error> {
    let store = Store {
        pool: create_pool(config),
    };
    store.connection().await?;
    tracing::info!(max_open = config.max_open, "connection pool ready");
    Ok(store)
}

fn create_pool(config: &Config) -> mobc::Pool<AsyncDieselConnectionManager<AsyncPgConnection>> {
    let builder = Builder::new()
        .max_open(config.max_open)
        .max_idle(config.max_idle)
        .max_lifetime(
            config
                .max_lifetime
                .map(|v| v.max(Duration::from_secs(3600))),
        )
        .max_idle_lifetime(
            config
                .max_idle_lifetime
                .map(|v| v.max(Duration::from_secs(900))),
        )
        .get_timeout(Some(config.timeout_for_get.max(Duration::from_secs(1))));
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.connection_url());
    builder.build(manager)
}

impl Store {
    pub(crate) async fn connection(
        &self,
    ) -> Result<mobc::Connection<AsyncDieselConnectionManager<AsyncPgConnection>>, Error> {
        self.pool.get().await.map_err(Into::into)
    }

    /// Creates any missing table, constraint and index of the ticketing schema.
    #[tracing::instrument(skip(self))]
    pub async fn apply_schema(&self) -> Result<(), Error> {
        let mut conn = self.connection().await?;
        conn.batch_execute(SCHEMA).await?;
        tracing::info!("schema applied");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection().await?;
        diesel::sql_query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }

    /// Runs `callback` in one serializable transaction; an `Err` rolls every write back.
    pub async fn transaction<'b, R, F>(&self, callback: F) -> Result<R, Error>
    where
        F: for<'r> FnOnce(Transaction<'r>) -> ScopedBoxFuture<'b, 'r, Result<R, Error>>
            + Send
            + 'b,
        R: Send + 'b,
    {
        let mut conn = self.connection().await?;
        conn.build_transaction()
            .serializable()
            .run(|conn| callback(Transaction { conn }))
            .await
    }

    pub fn users(&self) -> Users<'_> {
        Repository::new(repository::Executor::Pool(self))
    }

    pub fn events(&self) -> Events<'_> {
        Repository::new(repository::Executor::Pool(self))
    }

    pub fn orders(&self) -> Orders<'_> {
        Repository::new(repository::Executor::Pool(self))
    }

    pub fn tickets(&self) -> Tickets<'_> {
        Repository::new(repository::Executor::Pool(self))
    }

    pub fn check_ins(&self) -> CheckIns<'_> {
        Repository::new(repository::Executor::Pool(self))
    }

    pub fn event_analytics(&self) -> Analytics<'_> {
        Repository::new(repository::Executor::Pool(self))
    }

    pub fn ticket_tiers(&self) -> TicketTiers<'_> {
        Repository::new(repository::Executor::Pool(self))
    }
}

/// Repository handles bound to one open transaction.
pub struct Transaction<'r> {
    conn: &'r mut AsyncPgConnection,
}

impl Transaction<'_> {
    pub fn users(&mut self) -> Users<'_> {
        Repository::new(repository::Executor::Connection(&mut *self.conn))
    }

    pub fn events(&mut self) -> Events<'_> {
        Repository::new(repository::Executor::Connection(&mut *self.conn))
    }

    pub fn orders(&mut self) -> Orders<'_> {
        Repository::new(repository::Executor::Connection(&mut *self.conn))
    }

    pub fn tickets(&mut self) -> Tickets<'_> {
        Repository::new(repository::Executor::Connection(&mut *self.conn))
    }

    pub fn check_ins(&mut self) -> CheckIns<'_> {
        Repository::new(repository::Executor::Connection(&mut *self.conn))
    }

    pub fn event_analytics(&mut self) -> Analytics<'_> {
        Repository::new(repository::Executor::Connection(&mut *self.conn))
    }

    pub fn ticket_tiers(&mut self) -> TicketTiers<'_> {
        Repository::new(repository::Executor::Connection(&mut *self.conn))
    }
}

/// Current time at the precision PostgreSQL stores.
pub fn now() -> jiff::Timestamp {
    let now = jiff::Timestamp::now();
    jiff::Timestamp::from_microsecond(now.as_microsecond()).unwrap_or(now)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
