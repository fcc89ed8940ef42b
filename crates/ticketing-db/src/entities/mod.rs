//! One module per table: its field enum, unique keys, integrity rules and
//! relation traversals.

pub mod check_ins;
pub mod event_analytics;
pub mod events;
pub mod orders;
pub mod ticket_tiers;
pub mod tickets;
pub mod users;

pub use check_ins::CheckInField;
pub use event_analytics::EventAnalyticsField;
pub use events::EventField;
pub use orders::OrderField;
pub use ticket_tiers::TicketTierField;
pub use tickets::TicketField;
pub use users::UserField;
