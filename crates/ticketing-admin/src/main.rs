use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use ticketing_db::{
    Aggregations, CheckInField, EventKey, Field, GroupBy, OrderField, ScopedFutureExt, Store,
    TicketField,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

#[derive(Parser)]
#[command(version, about = "Maintenance tasks for the ticketing database")]
struct Cli {
    /// Configuration file; the environment alone is used when it does not exist.
    #[arg(long, env = "TICKETING_CONFIG", default_value = "./ticketing-config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create missing tables, constraints and indexes.
    Migrate,
    /// Check that a pooled connection can run a query.
    Ping,
    /// Print ticket, order and check-in totals of one event.
    EventSummary { event_id: String },
    /// Delete an event with its check-ins, tickets and orders in one transaction.
    PurgeEvent {
        event_id: String,
        /// Required; nothing is deleted without it.
        #[arg(long)]
        yes: bool,
    },
}

fn init_tracing(format: config::LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ticketing_db=info,ticketing_admin=info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        config::LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
        config::LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
        config::LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load(&cli.config).context("loading configuration")?;
    init_tracing(config.tracing.format);
    let store = ticketing_db::create(&config.database)
        .await
        .context("creating database store")?;
    match cli.command {
        Command::Migrate => {
            store.apply_schema().await.context("applying schema")?;
            println!("schema is up to date");
        }
        Command::Ping => {
            store.ping().await.context("pinging database")?;
            println!("ok");
        }
        Command::EventSummary { event_id } => event_summary(&store, event_id).await?,
        Command::PurgeEvent { event_id, yes } => {
            anyhow::ensure!(yes, "refusing to purge event {event_id} without --yes");
            purge_event(&store, event_id).await?
        }
    }
    Ok(())
}

async fn event_summary(store: &Store, event_id: String) -> anyhow::Result<()> {
    let event = store
        .events()
        .find_unique_or_throw(EventKey::Id(event_id.clone()))
        .await
        .context("loading event")?;
    let minted = store
        .tickets()
        .count(Some(TicketField::EventId.equals(&event_id)))
        .await
        .context("counting tickets")?;
    let used = store
        .tickets()
        .count(Some(
            TicketField::EventId
                .equals(&event_id)
                .and(TicketField::IsUsed.equals(true)),
        ))
        .await
        .context("counting used tickets")?;
    let admitted = store
        .check_ins()
        .count(Some(CheckInField::EventId.equals(&event_id)))
        .await
        .context("counting check-ins")?;
    let by_status = store
        .orders()
        .group_by(
            GroupBy::new([OrderField::PaymentStatus])
                .filter(OrderField::EventId.equals(&event_id))
                .aggregations(
                    Aggregations::new()
                        .count()
                        .sum(OrderField::Quantity)
                        .sum(OrderField::TotalAmount),
                ),
        )
        .await
        .context("grouping orders")?;

    println!("{} ({})", event.title, event.id);
    println!("  status      {}", event.status);
    println!("  supply      {}", event.total_supply);
    println!("  tickets     {minted} minted, {used} used");
    println!("  check-ins   {admitted}");
    for group in by_status {
        let status = group
            .key(OrderField::PaymentStatus)
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let orders = group.aggregates.count.unwrap_or(0);
        let quantity = group
            .aggregates
            .sum_of(OrderField::Quantity)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let amount = group
            .aggregates
            .sum_of(OrderField::TotalAmount)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        println!(
            "  orders      {status}: {orders} orders, {quantity} tickets, {amount:.2} {}",
            event.currency
        );
    }
    Ok(())
}

async fn purge_event(store: &Store, event_id: String) -> anyhow::Result<()> {
    let (check_ins, tickets, orders, title) = store
        .transaction(|mut tx| {
            async move {
                let check_ins = tx
                    .check_ins()
                    .delete_many(Some(CheckInField::EventId.equals(&event_id)))
                    .await?;
                let tickets = tx
                    .tickets()
                    .delete_many(Some(TicketField::EventId.equals(&event_id)))
                    .await?;
                let orders = tx
                    .orders()
                    .delete_many(Some(OrderField::EventId.equals(&event_id)))
                    .await?;
                let event = tx.events().delete(EventKey::Id(event_id)).await?;
                Ok((check_ins, tickets, orders, event.title))
            }
            .scope_boxed()
        })
        .await
        .context("purging event")?;
    tracing::info!(check_ins, tickets, orders, "event purged");
    println!("purged {title}: {check_ins} check-ins, {tickets} tickets, {orders} orders");
    Ok(())
}
