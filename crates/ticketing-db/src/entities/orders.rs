use crate::{
    entities::TicketField,
    integrity::{assigned, Checks, Dependent},
    models::{Event, NewOrder, Order, Ticket, UpdateOrder, User},
    query::{Field, FindMany, Where},
    repository::{Entity, Orders},
    schema::orders,
    Error,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

entity_fields! {
    /// Columns of [`Order`].
    pub enum OrderField in "orders" {
        Id => "id": Text,
        TotalAmount => "total_amount": Double,
        Quantity => "quantity": Int,
        Currency => "currency": Text,
        PaymentMethod => "payment_method": Text,
        PaymentStatus => "payment_status": Text,
        StripePaymentId => "stripe_payment_id": Text nullable,
        CoinbaseChargeId => "coinbase_charge_id": Text nullable,
        BlockchainTxHash => "blockchain_tx_hash": Text nullable,
        PaystackReference => "paystack_reference": Text nullable,
        FlutterwaveReference => "flutterwave_reference": Text nullable,
        MpesaCheckoutRequestId => "mpesa_checkout_request_id": Text nullable,
        PaymentTxId => "payment_tx_id": Text nullable,
        CustomerEmail => "customer_email": Text,
        CustomerName => "customer_name": Text nullable,
        BillingAddress => "billing_address": Json nullable,
        CreatedAt => "created_at": Timestamp,
        UpdatedAt => "updated_at": Timestamp,
        UserId => "user_id": Text,
        EventId => "event_id": Text,
    }
}

/// An order by id or by the reference one of the payment providers assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderKey {
    Id(String),
    StripePaymentId(String),
    CoinbaseChargeId(String),
    BlockchainTxHash(String),
    PaystackReference(String),
    FlutterwaveReference(String),
    MpesaCheckoutRequestId(String),
    PaymentTxId(String),
}

/// Provider reference columns with their unique constraint.
const PAYMENT_REFERENCES: [(OrderField, &str); 7] = [
    (OrderField::StripePaymentId, "orders_stripe_payment_id_key"),
    (OrderField::CoinbaseChargeId, "orders_coinbase_charge_id_key"),
    (OrderField::BlockchainTxHash, "orders_blockchain_tx_hash_key"),
    (OrderField::PaystackReference, "orders_paystack_reference_key"),
    (OrderField::FlutterwaveReference, "orders_flutterwave_reference_key"),
    (OrderField::MpesaCheckoutRequestId, "orders_mpesa_checkout_request_id_key"),
    (OrderField::PaymentTxId, "orders_payment_tx_id_key"),
];

fn payment_references<'a>(
    values: [Option<&'a String>; 7],
) -> impl Iterator<Item = (&'static str, Where<OrderField>)> + 'a {
    PAYMENT_REFERENCES
        .into_iter()
        .zip(values)
        .filter_map(|((field, constraint), value)| value.map(|v| (constraint, field.equals(v))))
}

impl Entity for Order {
    type Field = OrderField;
    type Key = OrderKey;
    type Create = NewOrder;
    type Update = UpdateOrder;

    const NAME: &'static str = "Order";
    const DEPENDENTS: &'static [Dependent] = &[Dependent {
        constraint: "tickets_order_id_fkey",
        table: "tickets",
        column: "order_id",
    }];

    fn id(&self) -> &str {
        &self.id
    }

    fn key_filter(key: &OrderKey) -> Where<OrderField> {
        match key {
            OrderKey::Id(v) => OrderField::Id.equals(v),
            OrderKey::StripePaymentId(v) => OrderField::StripePaymentId.equals(v),
            OrderKey::CoinbaseChargeId(v) => OrderField::CoinbaseChargeId.equals(v),
            OrderKey::BlockchainTxHash(v) => OrderField::BlockchainTxHash.equals(v),
            OrderKey::PaystackReference(v) => OrderField::PaystackReference.equals(v),
            OrderKey::FlutterwaveReference(v) => OrderField::FlutterwaveReference.equals(v),
            OrderKey::MpesaCheckoutRequestId(v) => OrderField::MpesaCheckoutRequestId.equals(v),
            OrderKey::PaymentTxId(v) => OrderField::PaymentTxId.equals(v),
        }
    }

    fn create_checks(data: &NewOrder) -> Checks<OrderField> {
        let mut checks = Checks::new()
            .foreign_key("orders_user_id_fkey", "users", &data.user_id)
            .foreign_key("orders_event_id_fkey", "events", &data.event_id)
            .unique_if("orders_pkey", data.id.as_ref().map(|v| OrderField::Id.equals(v)));
        for (constraint, filter) in payment_references([
            data.stripe_payment_id.as_ref(),
            data.coinbase_charge_id.as_ref(),
            data.blockchain_tx_hash.as_ref(),
            data.paystack_reference.as_ref(),
            data.flutterwave_reference.as_ref(),
            data.mpesa_checkout_request_id.as_ref(),
            data.payment_tx_id.as_ref(),
        ]) {
            checks = checks.unique(constraint, filter);
        }
        checks
    }

    fn update_checks(_current: &Order, data: &UpdateOrder) -> Checks<OrderField> {
        let mut checks = Checks::new()
            .foreign_key_if("orders_user_id_fkey", "users", data.user_id.as_deref())
            .foreign_key_if("orders_event_id_fkey", "events", data.event_id.as_deref());
        for (constraint, filter) in payment_references([
            assigned(&data.stripe_payment_id),
            assigned(&data.coinbase_charge_id),
            assigned(&data.blockchain_tx_hash),
            assigned(&data.paystack_reference),
            assigned(&data.flutterwave_reference),
            assigned(&data.mpesa_checkout_request_id),
            assigned(&data.payment_tx_id),
        ]) {
            checks = checks.unique(constraint, filter);
        }
        checks
    }

    async fn insert(conn: &mut AsyncPgConnection, mut data: NewOrder) -> Result<Order, Error> {
        if data.id.is_none() {
            data.id = Some(crate::new_id());
        }
        diesel::insert_into(orders::table)
            .values(data)
            .returning(Order::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &UpdateOrder,
    ) -> Result<Order, Error> {
        let now: jiff_diesel::Timestamp = crate::now().into();
        diesel::update(orders::table.find(id))
            .set((data, orders::updated_at.eq(now)))
            .returning(Order::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn delete_rows(conn: &mut AsyncPgConnection, ids: Vec<String>) -> Result<usize, Error> {
        diesel::delete(orders::table.filter(orders::id.eq_any(ids)))
            .execute(conn)
            .await
            .map_err(Into::into)
    }
}

impl Orders<'_> {
    pub async fn user(&mut self, order: &Order) -> Result<User, Error> {
        self.parent(&order.user_id).await
    }

    pub async fn event(&mut self, order: &Order) -> Result<Event, Error> {
        self.parent(&order.event_id).await
    }

    pub async fn tickets(
        &mut self,
        order_id: &str,
        args: FindMany<TicketField>,
    ) -> Result<Vec<Ticket>, Error> {
        self.related(TicketField::OrderId.equals(order_id), args).await
    }
}
