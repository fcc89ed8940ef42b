use diesel::prelude::*;

#[derive(Identifiable, Queryable, QueryableByName, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: String,
    pub email: String,
    pub password: Option<String>,
    pub name: Option<String>,
    pub wallet_address: Option<String>,
    pub google_id: Option<String>,
    pub twitter_id: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<jiff_diesel::Timestamp>,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
}

/// `None` fields take the column default.
#[derive(Insertable, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewUser {
    pub id: Option<String>,
    pub email: String,
    pub password: Option<String>,
    pub name: Option<String>,
    pub wallet_address: Option<String>,
    pub google_id: Option<String>,
    pub twitter_id: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<jiff_diesel::Timestamp>,
}

/// `None` leaves the column untouched, `Some(None)` clears a nullable column.
#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateUser {
    pub email: Option<String>,
    pub password: Option<Option<String>>,
    pub name: Option<Option<String>>,
    pub wallet_address: Option<Option<String>>,
    pub google_id: Option<Option<String>>,
    pub twitter_id: Option<Option<String>>,
    pub avatar: Option<Option<String>>,
    pub role: Option<String>,
    pub reset_token: Option<Option<String>>,
    pub reset_token_expiry: Option<Option<jiff_diesel::Timestamp>>,
}

#[derive(Identifiable, Queryable, QueryableByName, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub event_date: jiff_diesel::Timestamp,
    pub sale_start: jiff_diesel::Timestamp,
    pub sale_end: jiff_diesel::Timestamp,
    pub total_supply: i32,
    pub ticket_price: f64,
    pub currency: String,
    pub max_per_wallet: i32,
    pub contract_address: Option<String>,
    pub chain_id: i32,
    pub image_url: Option<String>,
    pub metadata_uri: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub allow_transfers: bool,
    pub require_kyc: bool,
    pub status: String,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
    pub organizer_id: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewEvent {
    pub id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub event_date: jiff_diesel::Timestamp,
    pub sale_start: jiff_diesel::Timestamp,
    pub sale_end: jiff_diesel::Timestamp,
    pub total_supply: i32,
    pub ticket_price: f64,
    pub currency: Option<String>,
    pub max_per_wallet: Option<i32>,
    pub contract_address: Option<String>,
    pub chain_id: Option<i32>,
    pub image_url: Option<String>,
    pub metadata_uri: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
    pub allow_transfers: Option<bool>,
    pub require_kyc: Option<bool>,
    pub status: Option<String>,
    pub organizer_id: String,
}

impl NewEvent {
    /// An event with every optional column left to its default.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        organizer_id: impl Into<String>,
        title: impl Into<String>,
        venue: impl Into<String>,
        event_date: jiff::Timestamp,
        sale_start: jiff::Timestamp,
        sale_end: jiff::Timestamp,
        total_supply: i32,
        ticket_price: f64,
    ) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: None,
            venue: venue.into(),
            address: None,
            city: None,
            country: None,
            latitude: None,
            longitude: None,
            event_date: event_date.into(),
            sale_start: sale_start.into(),
            sale_end: sale_end.into(),
            total_supply,
            ticket_price,
            currency: None,
            max_per_wallet: None,
            contract_address: None,
            chain_id: None,
            image_url: None,
            metadata_uri: None,
            category: None,
            tags: None,
            is_public: None,
            allow_transfers: None,
            require_kyc: None,
            status: None,
            organizer_id: organizer_id.into(),
        }
    }
}

#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateEvent {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub venue: Option<String>,
    pub address: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub country: Option<Option<String>>,
    pub latitude: Option<Option<f64>>,
    pub longitude: Option<Option<f64>>,
    pub event_date: Option<jiff_diesel::Timestamp>,
    pub sale_start: Option<jiff_diesel::Timestamp>,
    pub sale_end: Option<jiff_diesel::Timestamp>,
    pub total_supply: Option<i32>,
    pub ticket_price: Option<f64>,
    pub currency: Option<String>,
    pub max_per_wallet: Option<i32>,
    pub contract_address: Option<Option<String>>,
    pub chain_id: Option<i32>,
    pub image_url: Option<Option<String>>,
    pub metadata_uri: Option<Option<String>>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
    pub allow_transfers: Option<bool>,
    pub require_kyc: Option<bool>,
    pub status: Option<String>,
    pub organizer_id: Option<String>,
}

#[derive(Identifiable, Queryable, QueryableByName, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Order {
    pub id: String,
    pub total_amount: f64,
    pub quantity: i32,
    pub currency: String,
    pub payment_method: String,
    pub payment_status: String,
    pub stripe_payment_id: Option<String>,
    pub coinbase_charge_id: Option<String>,
    pub blockchain_tx_hash: Option<String>,
    pub paystack_reference: Option<String>,
    pub flutterwave_reference: Option<String>,
    pub mpesa_checkout_request_id: Option<String>,
    pub payment_tx_id: Option<String>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub billing_address: Option<serde_json::Value>,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
    pub user_id: String,
    pub event_id: String,
}

#[derive(Insertable, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewOrder {
    pub id: Option<String>,
    pub total_amount: f64,
    pub quantity: i32,
    pub currency: String,
    pub payment_method: String,
    pub payment_status: Option<String>,
    pub stripe_payment_id: Option<String>,
    pub coinbase_charge_id: Option<String>,
    pub blockchain_tx_hash: Option<String>,
    pub paystack_reference: Option<String>,
    pub flutterwave_reference: Option<String>,
    pub mpesa_checkout_request_id: Option<String>,
    pub payment_tx_id: Option<String>,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub billing_address: Option<serde_json::Value>,
    pub user_id: String,
    pub event_id: String,
}

#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateOrder {
    pub total_amount: Option<f64>,
    pub quantity: Option<i32>,
    pub currency: Option<String>,
    pub payment_method: Option<String>,
    pub payment_status: Option<String>,
    pub stripe_payment_id: Option<Option<String>>,
    pub coinbase_charge_id: Option<Option<String>>,
    pub blockchain_tx_hash: Option<Option<String>>,
    pub paystack_reference: Option<Option<String>>,
    pub flutterwave_reference: Option<Option<String>>,
    pub mpesa_checkout_request_id: Option<Option<String>>,
    pub payment_tx_id: Option<Option<String>>,
    pub customer_email: Option<String>,
    pub customer_name: Option<Option<String>>,
    pub billing_address: Option<Option<serde_json::Value>>,
    pub user_id: Option<String>,
    pub event_id: Option<String>,
}

#[derive(Identifiable, Queryable, QueryableByName, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Ticket {
    pub id: String,
    pub token_id: i32,
    pub contract_address: String,
    pub chain_id: i32,
    pub tx_hash: Option<String>,
    pub block_number: Option<i32>,
    pub metadata_uri: Option<String>,
    pub seat_number: Option<String>,
    pub section: Option<String>,
    pub tier: Option<String>,
    pub is_used: bool,
    pub used_at: Option<jiff_diesel::Timestamp>,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
    pub event_id: String,
    pub order_id: String,
}

#[derive(Insertable, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewTicket {
    pub id: Option<String>,
    pub token_id: i32,
    pub contract_address: String,
    pub chain_id: i32,
    pub tx_hash: Option<String>,
    pub block_number: Option<i32>,
    pub metadata_uri: Option<String>,
    pub seat_number: Option<String>,
    pub section: Option<String>,
    pub tier: Option<String>,
    pub is_used: Option<bool>,
    pub used_at: Option<jiff_diesel::Timestamp>,
    pub event_id: String,
    pub order_id: String,
}

#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::tickets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateTicket {
    pub token_id: Option<i32>,
    pub contract_address: Option<String>,
    pub chain_id: Option<i32>,
    pub tx_hash: Option<Option<String>>,
    pub block_number: Option<Option<i32>>,
    pub metadata_uri: Option<Option<String>>,
    pub seat_number: Option<Option<String>>,
    pub section: Option<Option<String>>,
    pub tier: Option<Option<String>>,
    pub is_used: Option<bool>,
    pub used_at: Option<Option<jiff_diesel::Timestamp>>,
    pub event_id: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Identifiable, Queryable, QueryableByName, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::check_ins)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CheckIn {
    pub id: String,
    pub checked_in_at: jiff_diesel::Timestamp,
    pub checked_in_by: Option<String>,
    pub location: Option<String>,
    pub poa_token_id: Option<i32>,
    pub poa_contract_addr: Option<String>,
    pub poa_tx_hash: Option<String>,
    pub ticket_id: String,
    pub event_id: String,
    pub user_id: String,
}

#[derive(Insertable, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::check_ins)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewCheckIn {
    pub id: Option<String>,
    pub checked_in_at: Option<jiff_diesel::Timestamp>,
    pub checked_in_by: Option<String>,
    pub location: Option<String>,
    pub poa_token_id: Option<i32>,
    pub poa_contract_addr: Option<String>,
    pub poa_tx_hash: Option<String>,
    pub ticket_id: String,
    pub event_id: String,
    pub user_id: String,
}

#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::check_ins)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateCheckIn {
    pub checked_in_at: Option<jiff_diesel::Timestamp>,
    pub checked_in_by: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub poa_token_id: Option<Option<i32>>,
    pub poa_contract_addr: Option<Option<String>>,
    pub poa_tx_hash: Option<Option<String>>,
    pub ticket_id: Option<String>,
    pub event_id: Option<String>,
    pub user_id: Option<String>,
}

impl UpdateCheckIn {
    pub fn is_empty(&self) -> bool {
        self.checked_in_at.is_none()
            && self.checked_in_by.is_none()
            && self.location.is_none()
            && self.poa_token_id.is_none()
            && self.poa_contract_addr.is_none()
            && self.poa_tx_hash.is_none()
            && self.ticket_id.is_none()
            && self.event_id.is_none()
            && self.user_id.is_none()
    }
}

#[derive(Identifiable, Queryable, QueryableByName, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::event_analytics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventAnalytics {
    pub id: String,
    pub date: jiff_diesel::Date,
    pub tickets_sold: i32,
    pub revenue: f64,
    pub unique_buyers: i32,
    pub check_ins: i32,
    pub check_in_rate: f64,
    pub no_shows: i32,
    pub top_countries: Option<serde_json::Value>,
    pub top_cities: Option<serde_json::Value>,
    pub hourly_breakdown: Option<serde_json::Value>,
    pub event_id: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::event_analytics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewEventAnalytics {
    pub id: Option<String>,
    pub date: jiff_diesel::Date,
    pub tickets_sold: Option<i32>,
    pub revenue: Option<f64>,
    pub unique_buyers: Option<i32>,
    pub check_ins: Option<i32>,
    pub check_in_rate: Option<f64>,
    pub no_shows: Option<i32>,
    pub top_countries: Option<serde_json::Value>,
    pub top_cities: Option<serde_json::Value>,
    pub hourly_breakdown: Option<serde_json::Value>,
    pub event_id: String,
}

impl NewEventAnalytics {
    /// An all-zero rollup for `event_id` on `date`.
    pub fn new(event_id: impl Into<String>, date: jiff::civil::Date) -> Self {
        Self {
            id: None,
            date: date.into(),
            tickets_sold: None,
            revenue: None,
            unique_buyers: None,
            check_ins: None,
            check_in_rate: None,
            no_shows: None,
            top_countries: None,
            top_cities: None,
            hourly_breakdown: None,
            event_id: event_id.into(),
        }
    }
}

#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::event_analytics)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateEventAnalytics {
    pub date: Option<jiff_diesel::Date>,
    pub tickets_sold: Option<i32>,
    pub revenue: Option<f64>,
    pub unique_buyers: Option<i32>,
    pub check_ins: Option<i32>,
    pub check_in_rate: Option<f64>,
    pub no_shows: Option<i32>,
    pub top_countries: Option<Option<serde_json::Value>>,
    pub top_cities: Option<Option<serde_json::Value>>,
    pub hourly_breakdown: Option<Option<serde_json::Value>>,
    pub event_id: Option<String>,
}

impl UpdateEventAnalytics {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.tickets_sold.is_none()
            && self.revenue.is_none()
            && self.unique_buyers.is_none()
            && self.check_ins.is_none()
            && self.check_in_rate.is_none()
            && self.no_shows.is_none()
            && self.top_countries.is_none()
            && self.top_cities.is_none()
            && self.hourly_breakdown.is_none()
            && self.event_id.is_none()
    }
}

#[derive(Identifiable, Queryable, QueryableByName, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::ticket_tiers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TicketTier {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub available_quantity: i32,
    pub max_per_person: i32,
    pub sale_start: jiff_diesel::Timestamp,
    pub sale_end: jiff_diesel::Timestamp,
    pub created_at: jiff_diesel::Timestamp,
    pub updated_at: jiff_diesel::Timestamp,
    pub event_id: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::ticket_tiers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewTicketTier {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub available_quantity: i32,
    pub max_per_person: Option<i32>,
    pub sale_start: jiff_diesel::Timestamp,
    pub sale_end: jiff_diesel::Timestamp,
    pub event_id: String,
}

#[derive(AsChangeset, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::ticket_tiers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UpdateTicketTier {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<f64>,
    pub available_quantity: Option<i32>,
    pub max_per_person: Option<i32>,
    pub sale_start: Option<jiff_diesel::Timestamp>,
    pub sale_end: Option<jiff_diesel::Timestamp>,
    pub event_id: Option<String>,
}
