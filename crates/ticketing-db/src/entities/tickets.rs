use crate::{
    entities::CheckInField,
    integrity::{Checks, Dependent},
    models::{CheckIn, Event, NewTicket, Order, Ticket, UpdateTicket},
    query::{Field, Where},
    repository::{Entity, Tickets},
    schema::tickets,
    Error,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

entity_fields! {
    /// Columns of [`Ticket`].
    pub enum TicketField in "tickets" {
        Id => "id": Text,
        TokenId => "token_id": Int,
        ContractAddress => "contract_address": Text,
        ChainId => "chain_id": Int,
        TxHash => "tx_hash": Text nullable,
        BlockNumber => "block_number": Int nullable,
        MetadataUri => "metadata_uri": Text nullable,
        SeatNumber => "seat_number": Text nullable,
        Section => "section": Text nullable,
        Tier => "tier": Text nullable,
        IsUsed => "is_used": Bool,
        UsedAt => "used_at": Timestamp nullable,
        CreatedAt => "created_at": Timestamp,
        UpdatedAt => "updated_at": Timestamp,
        EventId => "event_id": Text,
        OrderId => "order_id": Text,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketKey {
    Id(String),
    /// The on-chain token.
    ContractToken {
        contract_address: String,
        token_id: i32,
    },
}

fn token_filter(contract_address: &str, token_id: i32) -> Where<TicketField> {
    TicketField::ContractAddress
        .equals(contract_address)
        .and(TicketField::TokenId.equals(token_id))
}

impl Entity for Ticket {
    type Field = TicketField;
    type Key = TicketKey;
    type Create = NewTicket;
    type Update = UpdateTicket;

    const NAME: &'static str = "Ticket";
    const DEPENDENTS: &'static [Dependent] = &[Dependent {
        constraint: "check_ins_ticket_id_fkey",
        table: "check_ins",
        column: "ticket_id",
    }];

    fn id(&self) -> &str {
        &self.id
    }

    fn key_filter(key: &TicketKey) -> Where<TicketField> {
        match key {
            TicketKey::Id(v) => TicketField::Id.equals(v),
            TicketKey::ContractToken {
                contract_address,
                token_id,
            } => token_filter(contract_address, *token_id),
        }
    }

    fn create_checks(data: &NewTicket) -> Checks<TicketField> {
        Checks::new()
            .foreign_key("tickets_event_id_fkey", "events", &data.event_id)
            .foreign_key("tickets_order_id_fkey", "orders", &data.order_id)
            .unique_if("tickets_pkey", data.id.as_ref().map(|v| TicketField::Id.equals(v)))
            .unique(
                "tickets_contract_address_token_id_key",
                token_filter(&data.contract_address, data.token_id),
            )
    }

    fn update_checks(current: &Ticket, data: &UpdateTicket) -> Checks<TicketField> {
        let token_changed = data.contract_address.is_some() || data.token_id.is_some();
        let contract_address = data
            .contract_address
            .as_deref()
            .unwrap_or(&current.contract_address);
        let token_id = data.token_id.unwrap_or(current.token_id);
        Checks::new()
            .foreign_key_if("tickets_event_id_fkey", "events", data.event_id.as_deref())
            .foreign_key_if("tickets_order_id_fkey", "orders", data.order_id.as_deref())
            .unique_if(
                "tickets_contract_address_token_id_key",
                token_changed.then(|| token_filter(contract_address, token_id)),
            )
    }

    async fn insert(conn: &mut AsyncPgConnection, mut data: NewTicket) -> Result<Ticket, Error> {
        if data.id.is_none() {
            data.id = Some(crate::new_id());
        }
        diesel::insert_into(tickets::table)
            .values(data)
            .returning(Ticket::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &UpdateTicket,
    ) -> Result<Ticket, Error> {
        let now: jiff_diesel::Timestamp = crate::now().into();
        diesel::update(tickets::table.find(id))
            .set((data, tickets::updated_at.eq(now)))
            .returning(Ticket::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn delete_rows(conn: &mut AsyncPgConnection, ids: Vec<String>) -> Result<usize, Error> {
        diesel::delete(tickets::table.filter(tickets::id.eq_any(ids)))
            .execute(conn)
            .await
            .map_err(Into::into)
    }
}

impl Tickets<'_> {
    pub async fn event(&mut self, ticket: &Ticket) -> Result<Event, Error> {
        self.parent(&ticket.event_id).await
    }

    pub async fn order(&mut self, ticket: &Ticket) -> Result<Order, Error> {
        self.parent(&ticket.order_id).await
    }

    /// The admission recorded for the ticket, if it has been used.
    pub async fn check_in(&mut self, ticket_id: &str) -> Result<Option<CheckIn>, Error> {
        self.related_one(CheckInField::TicketId.equals(ticket_id))
            .await
    }
}
