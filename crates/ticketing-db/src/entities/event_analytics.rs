use crate::{
    integrity::{Checks, Dependent},
    models::{Event, EventAnalytics, NewEventAnalytics, UpdateEventAnalytics},
    query::{Field, Where},
    repository::{Analytics, Entity},
    schema::event_analytics,
    Error,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

entity_fields! {
    /// Columns of [`EventAnalytics`].
    pub enum EventAnalyticsField in "event_analytics" {
        Id => "id": Text,
        Date => "date": Date,
        TicketsSold => "tickets_sold": Int,
        Revenue => "revenue": Double,
        UniqueBuyers => "unique_buyers": Int,
        CheckIns => "check_ins": Int,
        CheckInRate => "check_in_rate": Double,
        NoShows => "no_shows": Int,
        TopCountries => "top_countries": Json nullable,
        TopCities => "top_cities": Json nullable,
        HourlyBreakdown => "hourly_breakdown": Json nullable,
        EventId => "event_id": Text,
    }
}

/// A daily rollup by id or by its (event, day) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalyticsKey {
    Id(String),
    EventDate {
        event_id: String,
        date: jiff::civil::Date,
    },
}

fn day_filter(event_id: &str, date: jiff::civil::Date) -> Where<EventAnalyticsField> {
    EventAnalyticsField::EventId
        .equals(event_id)
        .and(EventAnalyticsField::Date.equals(date))
}

impl Entity for EventAnalytics {
    type Field = EventAnalyticsField;
    type Key = AnalyticsKey;
    type Create = NewEventAnalytics;
    type Update = UpdateEventAnalytics;

    const NAME: &'static str = "EventAnalytics";
    const DEPENDENTS: &'static [Dependent] = &[];

    fn id(&self) -> &str {
        &self.id
    }

    fn key_filter(key: &AnalyticsKey) -> Where<EventAnalyticsField> {
        match key {
            AnalyticsKey::Id(v) => EventAnalyticsField::Id.equals(v),
            AnalyticsKey::EventDate { event_id, date } => day_filter(event_id, *date),
        }
    }

    fn create_checks(data: &NewEventAnalytics) -> Checks<EventAnalyticsField> {
        Checks::new()
            .foreign_key("event_analytics_event_id_fkey", "events", &data.event_id)
            .unique_if(
                "event_analytics_pkey",
                data.id.as_ref().map(|v| EventAnalyticsField::Id.equals(v)),
            )
            .unique(
                "event_analytics_event_id_date_key",
                day_filter(&data.event_id, data.date.to_jiff()),
            )
    }

    fn update_checks(
        current: &EventAnalytics,
        data: &UpdateEventAnalytics,
    ) -> Checks<EventAnalyticsField> {
        let day_changed = data.event_id.is_some() || data.date.is_some();
        let event_id = data.event_id.as_deref().unwrap_or(&current.event_id);
        let date = data.date.unwrap_or(current.date).to_jiff();
        Checks::new()
            .foreign_key_if(
                "event_analytics_event_id_fkey",
                "events",
                data.event_id.as_deref(),
            )
            .unique_if(
                "event_analytics_event_id_date_key",
                day_changed.then(|| day_filter(event_id, date)),
            )
    }

    async fn insert(
        conn: &mut AsyncPgConnection,
        mut data: NewEventAnalytics,
    ) -> Result<EventAnalytics, Error> {
        if data.id.is_none() {
            data.id = Some(crate::new_id());
        }
        diesel::insert_into(event_analytics::table)
            .values(data)
            .returning(EventAnalytics::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &UpdateEventAnalytics,
    ) -> Result<EventAnalytics, Error> {
        if data.is_empty() {
            return event_analytics::table
                .find(id)
                .select(EventAnalytics::as_select())
                .get_result(conn)
                .await
                .map_err(Into::into);
        }
        diesel::update(event_analytics::table.find(id))
            .set(data)
            .returning(EventAnalytics::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn delete_rows(conn: &mut AsyncPgConnection, ids: Vec<String>) -> Result<usize, Error> {
        diesel::delete(event_analytics::table.filter(event_analytics::id.eq_any(ids)))
            .execute(conn)
            .await
            .map_err(Into::into)
    }
}

impl Analytics<'_> {
    pub async fn event(&mut self, analytics: &EventAnalytics) -> Result<Event, Error> {
        self.parent(&analytics.event_id).await
    }
}
