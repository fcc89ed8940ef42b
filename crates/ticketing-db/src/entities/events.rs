use crate::{
    entities::{CheckInField, EventAnalyticsField, OrderField, TicketField, TicketTierField},
    integrity::{Checks, Dependent},
    models::{
        CheckIn, Event, EventAnalytics, NewEvent, Order, Ticket, TicketTier, UpdateEvent, User,
    },
    query::{Field, FindMany, Where},
    repository::{Entity, Events},
    schema::events,
    Error,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

entity_fields! {
    /// Columns of [`Event`].
    pub enum EventField in "events" {
        Id => "id": Text,
        Title => "title": Text,
        Description => "description": Text nullable,
        Venue => "venue": Text,
        Address => "address": Text nullable,
        City => "city": Text nullable,
        Country => "country": Text nullable,
        Latitude => "latitude": Double nullable,
        Longitude => "longitude": Double nullable,
        EventDate => "event_date": Timestamp,
        SaleStart => "sale_start": Timestamp,
        SaleEnd => "sale_end": Timestamp,
        TotalSupply => "total_supply": Int,
        TicketPrice => "ticket_price": Double,
        Currency => "currency": Text,
        MaxPerWallet => "max_per_wallet": Int,
        ContractAddress => "contract_address": Text nullable,
        ChainId => "chain_id": Int,
        ImageUrl => "image_url": Text nullable,
        MetadataUri => "metadata_uri": Text nullable,
        Category => "category": Text,
        Tags => "tags": TextArray,
        IsPublic => "is_public": Bool,
        AllowTransfers => "allow_transfers": Bool,
        RequireKyc => "require_kyc": Bool,
        Status => "status": Text,
        CreatedAt => "created_at": Timestamp,
        UpdatedAt => "updated_at": Timestamp,
        OrganizerId => "organizer_id": Text,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKey {
    Id(String),
}

impl Entity for Event {
    type Field = EventField;
    type Key = EventKey;
    type Create = NewEvent;
    type Update = UpdateEvent;

    const NAME: &'static str = "Event";
    // ticket_tiers and event_analytics cascade with the event
    const DEPENDENTS: &'static [Dependent] = &[
        Dependent {
            constraint: "orders_event_id_fkey",
            table: "orders",
            column: "event_id",
        },
        Dependent {
            constraint: "tickets_event_id_fkey",
            table: "tickets",
            column: "event_id",
        },
        Dependent {
            constraint: "check_ins_event_id_fkey",
            table: "check_ins",
            column: "event_id",
        },
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn key_filter(key: &EventKey) -> Where<EventField> {
        match key {
            EventKey::Id(v) => EventField::Id.equals(v),
        }
    }

    fn create_checks(data: &NewEvent) -> Checks<EventField> {
        Checks::new()
            .foreign_key("events_organizer_id_fkey", "users", &data.organizer_id)
            .unique_if("events_pkey", data.id.as_ref().map(|v| EventField::Id.equals(v)))
    }

    fn update_checks(_current: &Event, data: &UpdateEvent) -> Checks<EventField> {
        Checks::new()
            .foreign_key_if(
                "events_organizer_id_fkey",
                "users",
                data.organizer_id.as_deref(),
            )
    }

    async fn insert(conn: &mut AsyncPgConnection, mut data: NewEvent) -> Result<Event, Error> {
        if data.id.is_none() {
            data.id = Some(crate::new_id());
        }
        diesel::insert_into(events::table)
            .values(data)
            .returning(Event::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &UpdateEvent,
    ) -> Result<Event, Error> {
        let now: jiff_diesel::Timestamp = crate::now().into();
        diesel::update(events::table.find(id))
            .set((data, events::updated_at.eq(now)))
            .returning(Event::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn delete_rows(conn: &mut AsyncPgConnection, ids: Vec<String>) -> Result<usize, Error> {
        diesel::delete(events::table.filter(events::id.eq_any(ids)))
            .execute(conn)
            .await
            .map_err(Into::into)
    }
}

impl Events<'_> {
    pub async fn organizer(&mut self, event: &Event) -> Result<User, Error> {
        self.parent(&event.organizer_id).await
    }

    pub async fn orders(
        &mut self,
        event_id: &str,
        args: FindMany<OrderField>,
    ) -> Result<Vec<Order>, Error> {
        self.related(OrderField::EventId.equals(event_id), args).await
    }

    pub async fn tickets(
        &mut self,
        event_id: &str,
        args: FindMany<TicketField>,
    ) -> Result<Vec<Ticket>, Error> {
        self.related(TicketField::EventId.equals(event_id), args).await
    }

    pub async fn check_ins(
        &mut self,
        event_id: &str,
        args: FindMany<CheckInField>,
    ) -> Result<Vec<CheckIn>, Error> {
        self.related(CheckInField::EventId.equals(event_id), args).await
    }

    /// Daily rollups of the event.
    pub async fn analytics(
        &mut self,
        event_id: &str,
        args: FindMany<EventAnalyticsField>,
    ) -> Result<Vec<EventAnalytics>, Error> {
        self.related(EventAnalyticsField::EventId.equals(event_id), args)
            .await
    }

    pub async fn tiers(
        &mut self,
        event_id: &str,
        args: FindMany<TicketTierField>,
    ) -> Result<Vec<TicketTier>, Error> {
        self.related(TicketTierField::EventId.equals(event_id), args).await
    }
}
