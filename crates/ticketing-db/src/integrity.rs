//! Write-time integrity checks, evaluated inside the write's transaction
//! before the row is touched.
//!
//! Order of evaluation: foreign keys, then uniqueness. The first failing
//! rule is reported. Presence of required values is carried by the `New*`
//! types, and the schema's own constraints decide any race the pre-checks lose.

use crate::{
    query::{Field, Where},
    sql::{self, FoundRow},
    Constraint, ConstraintKind, Error,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use email_address::EmailAddress;

#[derive(Debug)]
struct ForeignKey {
    constraint: &'static str,
    table: &'static str,
    id: String,
}

/// Rules one write has to satisfy.
#[derive(Debug)]
pub struct Checks<F> {
    foreign_keys: Vec<ForeignKey>,
    uniques: Vec<(&'static str, Where<F>)>,
}

impl<F: Field> Checks<F> {
    pub(crate) fn new() -> Self {
        Self {
            foreign_keys: Vec::new(),
            uniques: Vec::new(),
        }
    }

    pub(crate) fn foreign_key(mut self, constraint: &'static str, table: &'static str, id: &str) -> Self {
        self.foreign_keys.push(ForeignKey {
            constraint,
            table,
            id: id.to_owned(),
        });
        self
    }

    pub(crate) fn foreign_key_if(self, constraint: &'static str, table: &'static str, id: Option<&str>) -> Self {
        match id {
            Some(id) => self.foreign_key(constraint, table, id),
            None => self,
        }
    }

    pub(crate) fn unique(mut self, constraint: &'static str, filter: Where<F>) -> Self {
        self.uniques.push((constraint, filter));
        self
    }

    pub(crate) fn unique_if(self, constraint: &'static str, filter: Option<Where<F>>) -> Self {
        match filter {
            Some(filter) => self.unique(constraint, filter),
            None => self,
        }
    }

    /// Constraint names of the unique lookups, in evaluation order.
    #[cfg(test)]
    pub(crate) fn unique_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.uniques.iter().map(|(constraint, _)| *constraint)
    }

    /// Evaluates every rule; `exclude_id` is the row being updated.
    #[tracing::instrument(level = "debug", skip_all, fields(table = F::TABLE))]
    pub(crate) async fn verify(
        self,
        conn: &mut AsyncPgConnection,
        exclude_id: Option<&str>,
    ) -> Result<(), Error> {
        for fk in self.foreign_keys {
            let query = sql::references(fk.table, "id", vec![fk.id]);
            let row: FoundRow = query.into_query().get_result(conn).await?;
            if !row.found {
                return Err(Error::ConstraintViolation(Constraint::new(
                    ConstraintKind::ForeignKey,
                    fk.constraint,
                )));
            }
        }
        for (constraint, filter) in self.uniques {
            let row: FoundRow = sql::exists(&filter, exclude_id)?
                .into_query()
                .get_result(conn)
                .await?;
            if row.found {
                return Err(Error::ConstraintViolation(Constraint::new(
                    ConstraintKind::Unique,
                    constraint,
                )));
            }
        }
        Ok(())
    }
}

/// Opt-in address check for callers that want more than the schema enforces.
/// Reported as a [`ConstraintKind::Check`] violation named `constraint`.
pub fn check_email(constraint: &'static str, email: &str) -> Result<(), Error> {
    if EmailAddress::is_valid(email) {
        Ok(())
    } else {
        Err(Error::ConstraintViolation(Constraint::new(
            ConstraintKind::Check,
            constraint,
        )))
    }
}

/// The new value of a nullable column an update sets to non-null.
pub(crate) fn assigned<T>(value: &Option<Option<T>>) -> Option<&T> {
    value.as_ref().and_then(Option::as_ref)
}

/// A foreign key pointing at an entity whose deletes are restricted.
#[derive(Clone, Copy, Debug)]
pub struct Dependent {
    pub(crate) constraint: &'static str,
    pub(crate) table: &'static str,
    pub(crate) column: &'static str,
}

/// Fails when any of `ids` is still referenced by a restricting dependent.
pub(crate) async fn ensure_unreferenced(
    conn: &mut AsyncPgConnection,
    dependents: &[Dependent],
    ids: &[String],
) -> Result<(), Error> {
    if ids.is_empty() {
        return Ok(());
    }
    for dependent in dependents {
        let query = sql::references(dependent.table, dependent.column, ids.to_vec());
        let row: FoundRow = query.into_query().get_result(conn).await?;
        if row.found {
            tracing::debug!(constraint = dependent.constraint, "delete restricted");
            return Err(Error::ConstraintViolation(Constraint::new(
                ConstraintKind::Restrict,
                dependent.constraint,
            )));
        }
    }
    Ok(())
}
