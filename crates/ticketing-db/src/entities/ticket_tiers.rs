use crate::{
    integrity::{Checks, Dependent},
    models::{Event, NewTicketTier, TicketTier, UpdateTicketTier},
    query::{Field, Where},
    repository::{Entity, TicketTiers},
    schema::ticket_tiers,
    Error,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

entity_fields! {
    /// Columns of [`TicketTier`].
    pub enum TicketTierField in "ticket_tiers" {
        Id => "id": Text,
        Name => "name": Text,
        Description => "description": Text nullable,
        Price => "price": Double,
        AvailableQuantity => "available_quantity": Int,
        MaxPerPerson => "max_per_person": Int,
        SaleStart => "sale_start": Timestamp,
        SaleEnd => "sale_end": Timestamp,
        CreatedAt => "created_at": Timestamp,
        UpdatedAt => "updated_at": Timestamp,
        EventId => "event_id": Text,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TierKey {
    Id(String),
}

impl Entity for TicketTier {
    type Field = TicketTierField;
    type Key = TierKey;
    type Create = NewTicketTier;
    type Update = UpdateTicketTier;

    const NAME: &'static str = "TicketTier";
    const DEPENDENTS: &'static [Dependent] = &[];

    fn id(&self) -> &str {
        &self.id
    }

    fn key_filter(key: &TierKey) -> Where<TicketTierField> {
        match key {
            TierKey::Id(v) => TicketTierField::Id.equals(v),
        }
    }

    fn create_checks(data: &NewTicketTier) -> Checks<TicketTierField> {
        Checks::new()
            .foreign_key("ticket_tiers_event_id_fkey", "events", &data.event_id)
            .unique_if(
                "ticket_tiers_pkey",
                data.id.as_ref().map(|v| TicketTierField::Id.equals(v)),
            )
    }

    fn update_checks(_current: &TicketTier, data: &UpdateTicketTier) -> Checks<TicketTierField> {
        Checks::new()
            .foreign_key_if("ticket_tiers_event_id_fkey", "events", data.event_id.as_deref())
    }

    async fn insert(
        conn: &mut AsyncPgConnection,
        mut data: NewTicketTier,
    ) -> Result<TicketTier, Error> {
        if data.id.is_none() {
            data.id = Some(crate::new_id());
        }
        diesel::insert_into(ticket_tiers::table)
            .values(data)
            .returning(TicketTier::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &UpdateTicketTier,
    ) -> Result<TicketTier, Error> {
        let now: jiff_diesel::Timestamp = crate::now().into();
        diesel::update(ticket_tiers::table.find(id))
            .set((data, ticket_tiers::updated_at.eq(now)))
            .returning(TicketTier::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn delete_rows(conn: &mut AsyncPgConnection, ids: Vec<String>) -> Result<usize, Error> {
        diesel::delete(ticket_tiers::table.filter(ticket_tiers::id.eq_any(ids)))
            .execute(conn)
            .await
            .map_err(Into::into)
    }
}

impl TicketTiers<'_> {
    pub async fn event(&mut self, tier: &TicketTier) -> Result<Event, Error> {
        self.parent(&tier.event_id).await
    }
}
