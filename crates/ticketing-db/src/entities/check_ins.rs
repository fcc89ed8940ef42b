use crate::{
    integrity::{Checks, Dependent},
    models::{CheckIn, Event, NewCheckIn, Ticket, UpdateCheckIn, User},
    query::{Field, Where},
    repository::{CheckIns, Entity},
    schema::check_ins,
    Error,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

entity_fields! {
    /// Columns of [`CheckIn`].
    pub enum CheckInField in "check_ins" {
        Id => "id": Text,
        CheckedInAt => "checked_in_at": Timestamp,
        CheckedInBy => "checked_in_by": Text nullable,
        Location => "location": Text nullable,
        PoaTokenId => "poa_token_id": Int nullable,
        PoaContractAddr => "poa_contract_addr": Text nullable,
        PoaTxHash => "poa_tx_hash": Text nullable,
        TicketId => "ticket_id": Text,
        EventId => "event_id": Text,
        UserId => "user_id": Text,
    }
}

/// A check-in by id or by the ticket it admitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckInKey {
    Id(String),
    TicketId(String),
}

impl Entity for CheckIn {
    type Field = CheckInField;
    type Key = CheckInKey;
    type Create = NewCheckIn;
    type Update = UpdateCheckIn;

    const NAME: &'static str = "CheckIn";
    const DEPENDENTS: &'static [Dependent] = &[];

    fn id(&self) -> &str {
        &self.id
    }

    fn key_filter(key: &CheckInKey) -> Where<CheckInField> {
        match key {
            CheckInKey::Id(v) => CheckInField::Id.equals(v),
            CheckInKey::TicketId(v) => CheckInField::TicketId.equals(v),
        }
    }

    fn create_checks(data: &NewCheckIn) -> Checks<CheckInField> {
        Checks::new()
            .foreign_key("check_ins_ticket_id_fkey", "tickets", &data.ticket_id)
            .foreign_key("check_ins_event_id_fkey", "events", &data.event_id)
            .foreign_key("check_ins_user_id_fkey", "users", &data.user_id)
            .unique_if("check_ins_pkey", data.id.as_ref().map(|v| CheckInField::Id.equals(v)))
            .unique(
                "check_ins_ticket_id_key",
                CheckInField::TicketId.equals(&data.ticket_id),
            )
    }

    fn update_checks(_current: &CheckIn, data: &UpdateCheckIn) -> Checks<CheckInField> {
        Checks::new()
            .foreign_key_if("check_ins_ticket_id_fkey", "tickets", data.ticket_id.as_deref())
            .foreign_key_if("check_ins_event_id_fkey", "events", data.event_id.as_deref())
            .foreign_key_if("check_ins_user_id_fkey", "users", data.user_id.as_deref())
            .unique_if(
                "check_ins_ticket_id_key",
                data.ticket_id
                    .as_ref()
                    .map(|v| CheckInField::TicketId.equals(v)),
            )
    }

    async fn insert(conn: &mut AsyncPgConnection, mut data: NewCheckIn) -> Result<CheckIn, Error> {
        if data.id.is_none() {
            data.id = Some(crate::new_id());
        }
        diesel::insert_into(check_ins::table)
            .values(data)
            .returning(CheckIn::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &UpdateCheckIn,
    ) -> Result<CheckIn, Error> {
        // no timestamp column to touch, so an empty change set is a plain read
        if data.is_empty() {
            return check_ins::table
                .find(id)
                .select(CheckIn::as_select())
                .get_result(conn)
                .await
                .map_err(Into::into);
        }
        diesel::update(check_ins::table.find(id))
            .set(data)
            .returning(CheckIn::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn delete_rows(conn: &mut AsyncPgConnection, ids: Vec<String>) -> Result<usize, Error> {
        diesel::delete(check_ins::table.filter(check_ins::id.eq_any(ids)))
            .execute(conn)
            .await
            .map_err(Into::into)
    }
}

impl CheckIns<'_> {
    pub async fn ticket(&mut self, check_in: &CheckIn) -> Result<Ticket, Error> {
        self.parent(&check_in.ticket_id).await
    }

    pub async fn event(&mut self, check_in: &CheckIn) -> Result<Event, Error> {
        self.parent(&check_in.event_id).await
    }

    pub async fn user(&mut self, check_in: &CheckIn) -> Result<User, Error> {
        self.parent(&check_in.user_id).await
    }
}
