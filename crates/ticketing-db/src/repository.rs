//! The operations every entity supports, written once over [`Entity`].
//!
//! A [`Repository`] either borrows the pool, in which case every write runs
//! in its own transaction, or an open [`crate::Transaction`] whose boundary
//! the caller owns. Inserts run at read committed so a concurrent duplicate
//! is decided by the table's unique constraint; every other pooled write is
//! serializable.

use crate::{
    integrity::{self, Checks, Dependent},
    models,
    query::{AggregateResult, Aggregations, Field, FindMany, GroupBy, GroupRow, Where},
    sql::{self, AggregateRow, CountRow, IdRow},
    ConstraintKind, Error, Store,
};
use diesel::{pg::Pg, QueryableByName};
use diesel_async::{
    scoped_futures::{ScopedBoxFuture, ScopedFutureExt},
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use std::{collections::HashMap, fmt, future::Future, marker::PhantomData};

/// A table the generic operations can drive.
pub trait Entity: QueryableByName<Pg> + Clone + fmt::Debug + Send + Sync + 'static {
    type Field: Field;
    type Key: fmt::Debug + Clone + Send + Sync + 'static;
    type Create: fmt::Debug + Send + Sync + 'static;
    type Update: fmt::Debug + Send + Sync + 'static;

    const NAME: &'static str;
    /// Foreign keys elsewhere that block deleting a row of this entity.
    const DEPENDENTS: &'static [Dependent];

    fn id(&self) -> &str;
    fn key_filter(key: &Self::Key) -> Where<Self::Field>;
    fn create_checks(data: &Self::Create) -> Checks<Self::Field>;
    fn update_checks(current: &Self, data: &Self::Update) -> Checks<Self::Field>;

    fn insert(
        conn: &mut AsyncPgConnection,
        data: Self::Create,
    ) -> impl Future<Output = Result<Self, Error>> + Send;

    fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &Self::Update,
    ) -> impl Future<Output = Result<Self, Error>> + Send;

    fn delete_rows(
        conn: &mut AsyncPgConnection,
        ids: Vec<String>,
    ) -> impl Future<Output = Result<usize, Error>> + Send;
}

/// Isolation of the transaction a pooled write opens.
#[derive(Clone, Copy, Debug)]
enum Isolation {
    ReadCommitted,
    Serializable,
}

pub(crate) enum Executor<'a> {
    Pool(&'a Store),
    Connection(&'a mut AsyncPgConnection),
}

impl Executor<'_> {
    async fn read<'b, R, F>(&mut self, callback: F) -> Result<R, Error>
    where
        F: for<'r> FnOnce(&'r mut AsyncPgConnection) -> ScopedBoxFuture<'b, 'r, Result<R, Error>>
            + Send
            + 'b,
        R: Send + 'b,
    {
        match self {
            Executor::Pool(store) => {
                let mut conn = store.connection().await?;
                callback(&mut *conn).await
            }
            Executor::Connection(conn) => callback(&mut **conn).await,
        }
    }

    async fn write<'b, R, F>(&mut self, isolation: Isolation, callback: F) -> Result<R, Error>
    where
        F: for<'r> FnOnce(&'r mut AsyncPgConnection) -> ScopedBoxFuture<'b, 'r, Result<R, Error>>
            + Send
            + 'b,
        R: Send + 'b,
    {
        match self {
            Executor::Pool(store) => {
                let mut conn = store.connection().await?;
                let transaction = conn.build_transaction();
                match isolation {
                    Isolation::ReadCommitted => transaction.read_committed().run(callback).await,
                    Isolation::Serializable => transaction.serializable().run(callback).await,
                }
            }
            Executor::Connection(conn) => callback(&mut **conn).await,
        }
    }
}

pub struct Repository<'a, E> {
    exec: Executor<'a>,
    entity: PhantomData<fn() -> E>,
}

pub type Users<'a> = Repository<'a, models::User>;
pub type Events<'a> = Repository<'a, models::Event>;
pub type Orders<'a> = Repository<'a, models::Order>;
pub type Tickets<'a> = Repository<'a, models::Ticket>;
pub type CheckIns<'a> = Repository<'a, models::CheckIn>;
pub type Analytics<'a> = Repository<'a, models::EventAnalytics>;
pub type TicketTiers<'a> = Repository<'a, models::TicketTier>;

async fn load<E: Entity>(
    conn: &mut AsyncPgConnection,
    args: &FindMany<E::Field>,
) -> Result<Vec<E>, Error> {
    let query = sql::select_rows(args)?.into_query();
    let mut rows = query.load::<E>(conn).await?;
    if args.is_backward() {
        rows.reverse();
    }
    Ok(rows)
}

async fn find_one<E: Entity>(
    conn: &mut AsyncPgConnection,
    filter: Where<E::Field>,
) -> Result<Option<E>, Error> {
    let args = FindMany::new().filter(filter).take(1);
    Ok(load::<E>(conn, &args).await?.into_iter().next())
}

async fn create_row<E: Entity>(conn: &mut AsyncPgConnection, data: E::Create) -> Result<E, Error> {
    E::create_checks(&data).verify(conn, None).await?;
    E::insert(conn, data).await
}

async fn update_existing<E: Entity>(
    conn: &mut AsyncPgConnection,
    current: &E,
    data: &E::Update,
) -> Result<E, Error> {
    E::update_checks(current, data)
        .verify(conn, Some(current.id()))
        .await?;
    E::update_row(conn, current.id(), data).await
}

impl<'a, E: Entity> Repository<'a, E> {
    pub(crate) fn new(exec: Executor<'a>) -> Self {
        Self {
            exec,
            entity: PhantomData,
        }
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn find_unique(&mut self, key: E::Key) -> Result<Option<E>, Error> {
        let filter = E::key_filter(&key);
        self.exec
            .read(move |conn| async move { find_one::<E>(conn, filter).await }.scope_boxed())
            .await
    }

    pub async fn find_unique_or_throw(&mut self, key: E::Key) -> Result<E, Error> {
        self.find_unique(key)
            .await?
            .ok_or(Error::NotFound { entity: E::NAME })
    }

    /// The first row of `args`' page; a negative `take` picks the last one.
    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn find_first(&mut self, args: FindMany<E::Field>) -> Result<Option<E>, Error> {
        let take = if args.is_backward() { -1 } else { 1 };
        let args = FindMany {
            take: Some(take),
            ..args
        };
        self.exec
            .read(move |conn| {
                async move { Ok(load::<E>(conn, &args).await?.into_iter().next()) }.scope_boxed()
            })
            .await
    }

    pub async fn find_first_or_throw(&mut self, args: FindMany<E::Field>) -> Result<E, Error> {
        self.find_first(args)
            .await?
            .ok_or(Error::NotFound { entity: E::NAME })
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn find_many(&mut self, args: FindMany<E::Field>) -> Result<Vec<E>, Error> {
        self.exec
            .read(move |conn| async move { load::<E>(conn, &args).await }.scope_boxed())
            .await
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn count(&mut self, filter: Option<Where<E::Field>>) -> Result<i64, Error> {
        let query = sql::count(filter.as_ref())?.into_query();
        self.exec
            .read(move |conn| {
                async move { Ok(query.get_result::<CountRow>(conn).await?.count) }.scope_boxed()
            })
            .await
    }

    /// Non-null values per field among the matching rows.
    pub async fn count_fields(
        &mut self,
        filter: Option<Where<E::Field>>,
        fields: Vec<E::Field>,
    ) -> Result<HashMap<E::Field, i64>, Error> {
        let aggregations = Aggregations {
            count_fields: fields,
            ..Aggregations::default()
        };
        Ok(self.aggregate(filter, aggregations).await?.count_fields)
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn aggregate(
        &mut self,
        filter: Option<Where<E::Field>>,
        aggregations: Aggregations<E::Field>,
    ) -> Result<AggregateResult<E::Field>, Error> {
        let query = sql::aggregate(filter.as_ref(), &aggregations)?.into_query();
        self.exec
            .read(move |conn| {
                async move {
                    let row = query.get_result::<AggregateRow>(conn).await?;
                    AggregateResult::from_json(&row.aggregates)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn group_by(
        &mut self,
        args: GroupBy<E::Field>,
    ) -> Result<Vec<GroupRow<E::Field>>, Error> {
        let query = sql::group_by(&args)?.into_query();
        self.exec
            .read(move |conn| {
                async move {
                    query
                        .load::<sql::GroupRow>(conn)
                        .await?
                        .iter()
                        .map(|row| GroupRow::from_json(&row.keys, &row.aggregates))
                        .collect::<Result<Vec<_>, _>>()
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn create(&mut self, data: E::Create) -> Result<E, Error> {
        self.exec
            .write(Isolation::ReadCommitted, move |conn| {
                async move { create_row::<E>(conn, data).await }.scope_boxed()
            })
            .await
    }

    /// Inserts every row in one transaction and returns how many were written.
    /// With `skip_duplicates` a row that would break a unique constraint is skipped.
    #[tracing::instrument(skip(self, rows), fields(entity = E::NAME, rows = rows.len()))]
    pub async fn create_many(
        &mut self,
        rows: Vec<E::Create>,
        skip_duplicates: bool,
    ) -> Result<usize, Error> {
        self.exec
            .write(Isolation::ReadCommitted, move |conn| {
                async move {
                    let mut created = 0;
                    for data in rows {
                        // A savepoint per row keeps the batch usable after a skipped duplicate.
                        let inserted = conn
                            .transaction(move |conn| {
                                async move { create_row::<E>(conn, data).await }.scope_boxed()
                            })
                            .await;
                        match inserted {
                            Ok(_) => created += 1,
                            Err(Error::ConstraintViolation(constraint))
                                if skip_duplicates && constraint.kind == ConstraintKind::Unique =>
                            {
                                tracing::debug!(%constraint, "skipping duplicate");
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    Ok(created)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn update(&mut self, key: E::Key, data: E::Update) -> Result<E, Error> {
        self.exec
            .write(Isolation::Serializable, move |conn| {
                async move {
                    let current = find_one::<E>(conn, E::key_filter(&key))
                        .await?
                        .ok_or(Error::NotFound { entity: E::NAME })?;
                    update_existing(conn, &current, &data).await
                }
                .scope_boxed()
            })
            .await
    }

    /// Applies `data` to every matching row and returns how many were updated.
    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn update_many(
        &mut self,
        filter: Option<Where<E::Field>>,
        data: E::Update,
    ) -> Result<usize, Error> {
        let args = FindMany {
            filter,
            ..FindMany::default()
        };
        self.exec
            .write(Isolation::Serializable, move |conn| {
                async move {
                    let rows = load::<E>(conn, &args).await?;
                    for current in &rows {
                        update_existing(conn, current, &data).await?;
                    }
                    Ok(rows.len())
                }
                .scope_boxed()
            })
            .await
    }

    /// Updates the row identified by `key`, or creates it from `create` when absent.
    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn upsert(
        &mut self,
        key: E::Key,
        create: E::Create,
        update: E::Update,
    ) -> Result<E, Error> {
        self.exec
            .write(Isolation::Serializable, move |conn| {
                async move {
                    match find_one::<E>(conn, E::key_filter(&key)).await? {
                        Some(current) => update_existing(conn, &current, &update).await,
                        None => create_row::<E>(conn, create).await,
                    }
                }
                .scope_boxed()
            })
            .await
    }

    /// Removes the row and returns it as it was.
    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn delete(&mut self, key: E::Key) -> Result<E, Error> {
        self.exec
            .write(Isolation::Serializable, move |conn| {
                async move {
                    let current = find_one::<E>(conn, E::key_filter(&key))
                        .await?
                        .ok_or(Error::NotFound { entity: E::NAME })?;
                    let ids = vec![current.id().to_owned()];
                    integrity::ensure_unreferenced(conn, E::DEPENDENTS, &ids).await?;
                    E::delete_rows(conn, ids).await?;
                    Ok(current)
                }
                .scope_boxed()
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(entity = E::NAME))]
    pub async fn delete_many(&mut self, filter: Option<Where<E::Field>>) -> Result<usize, Error> {
        let query = sql::select_ids(filter.as_ref())?.into_query();
        self.exec
            .write(Isolation::Serializable, move |conn| {
                async move {
                    let ids = query
                        .load::<IdRow>(conn)
                        .await?
                        .into_iter()
                        .map(|row| row.id)
                        .collect::<Vec<_>>();
                    integrity::ensure_unreferenced(conn, E::DEPENDENTS, &ids).await?;
                    if ids.is_empty() {
                        return Ok(0);
                    }
                    E::delete_rows(conn, ids).await
                }
                .scope_boxed()
            })
            .await
    }

    /// Rows of `R` within `scope`, further narrowed by `args`.
    pub(crate) async fn related<R: Entity>(
        &mut self,
        scope: Where<R::Field>,
        mut args: FindMany<R::Field>,
    ) -> Result<Vec<R>, Error> {
        args.filter = Some(Where::scoped(scope, args.filter.take()));
        self.exec
            .read(move |conn| async move { load::<R>(conn, &args).await }.scope_boxed())
            .await
    }

    pub(crate) async fn related_one<R: Entity>(
        &mut self,
        filter: Where<R::Field>,
    ) -> Result<Option<R>, Error> {
        self.exec
            .read(move |conn| async move { find_one::<R>(conn, filter).await }.scope_boxed())
            .await
    }

    /// The parent `R` a required foreign key points at.
    pub(crate) async fn parent<R: Entity>(&mut self, id: &str) -> Result<R, Error> {
        self.related_one::<R>(<R::Field as Field>::id().equals(id))
            .await?
            .ok_or(Error::NotFound { entity: R::NAME })
    }
}
