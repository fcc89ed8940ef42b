use crate::{
    entities::{CheckInField, EventField, OrderField},
    integrity::{assigned, Checks, Dependent},
    models::{CheckIn, Event, NewUser, Order, UpdateUser, User},
    query::{Field, FindMany, Where},
    repository::{Entity, Users},
    schema::users,
    Error,
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

entity_fields! {
    /// Columns of [`User`].
    pub enum UserField in "users" {
        Id => "id": Text,
        Email => "email": Text,
        Password => "password": Text nullable,
        Name => "name": Text nullable,
        WalletAddress => "wallet_address": Text nullable,
        GoogleId => "google_id": Text nullable,
        TwitterId => "twitter_id": Text nullable,
        Avatar => "avatar": Text nullable,
        Role => "role": Text,
        ResetToken => "reset_token": Text nullable,
        ResetTokenExpiry => "reset_token_expiry": Timestamp nullable,
        CreatedAt => "created_at": Timestamp,
        UpdatedAt => "updated_at": Timestamp,
    }
}

/// Every way a single user can be addressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserKey {
    Id(String),
    Email(String),
    WalletAddress(String),
    GoogleId(String),
    TwitterId(String),
}

impl Entity for User {
    type Field = UserField;
    type Key = UserKey;
    type Create = NewUser;
    type Update = UpdateUser;

    const NAME: &'static str = "User";
    const DEPENDENTS: &'static [Dependent] = &[
        Dependent {
            constraint: "events_organizer_id_fkey",
            table: "events",
            column: "organizer_id",
        },
        Dependent {
            constraint: "orders_user_id_fkey",
            table: "orders",
            column: "user_id",
        },
        Dependent {
            constraint: "check_ins_user_id_fkey",
            table: "check_ins",
            column: "user_id",
        },
    ];

    fn id(&self) -> &str {
        &self.id
    }

    fn key_filter(key: &UserKey) -> Where<UserField> {
        match key {
            UserKey::Id(v) => UserField::Id.equals(v),
            UserKey::Email(v) => UserField::Email.equals(v),
            UserKey::WalletAddress(v) => UserField::WalletAddress.equals(v),
            UserKey::GoogleId(v) => UserField::GoogleId.equals(v),
            UserKey::TwitterId(v) => UserField::TwitterId.equals(v),
        }
    }

    fn create_checks(data: &NewUser) -> Checks<UserField> {
        Checks::new()
            .unique_if("users_pkey", data.id.as_ref().map(|v| UserField::Id.equals(v)))
            .unique("users_email_key", UserField::Email.equals(&data.email))
            .unique_if(
                "users_wallet_address_key",
                data.wallet_address
                    .as_ref()
                    .map(|v| UserField::WalletAddress.equals(v)),
            )
            .unique_if(
                "users_google_id_key",
                data.google_id.as_ref().map(|v| UserField::GoogleId.equals(v)),
            )
            .unique_if(
                "users_twitter_id_key",
                data.twitter_id.as_ref().map(|v| UserField::TwitterId.equals(v)),
            )
    }

    fn update_checks(_current: &User, data: &UpdateUser) -> Checks<UserField> {
        Checks::new()
            .unique_if(
                "users_email_key",
                data.email.as_ref().map(|v| UserField::Email.equals(v)),
            )
            .unique_if(
                "users_wallet_address_key",
                assigned(&data.wallet_address).map(|v| UserField::WalletAddress.equals(v)),
            )
            .unique_if(
                "users_google_id_key",
                assigned(&data.google_id).map(|v| UserField::GoogleId.equals(v)),
            )
            .unique_if(
                "users_twitter_id_key",
                assigned(&data.twitter_id).map(|v| UserField::TwitterId.equals(v)),
            )
    }

    async fn insert(conn: &mut AsyncPgConnection, mut data: NewUser) -> Result<User, Error> {
        if data.id.is_none() {
            data.id = Some(crate::new_id());
        }
        diesel::insert_into(users::table)
            .values(data)
            .returning(User::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn update_row(
        conn: &mut AsyncPgConnection,
        id: &str,
        data: &UpdateUser,
    ) -> Result<User, Error> {
        let now: jiff_diesel::Timestamp = crate::now().into();
        diesel::update(users::table.find(id))
            .set((data, users::updated_at.eq(now)))
            .returning(User::as_returning())
            .get_result(conn)
            .await
            .map_err(Into::into)
    }

    async fn delete_rows(conn: &mut AsyncPgConnection, ids: Vec<String>) -> Result<usize, Error> {
        diesel::delete(users::table.filter(users::id.eq_any(ids)))
            .execute(conn)
            .await
            .map_err(Into::into)
    }
}

impl Users<'_> {
    /// Events the user organizes.
    pub async fn organized_events(
        &mut self,
        user_id: &str,
        args: FindMany<EventField>,
    ) -> Result<Vec<Event>, Error> {
        self.related(EventField::OrganizerId.equals(user_id), args).await
    }

    pub async fn orders(
        &mut self,
        user_id: &str,
        args: FindMany<OrderField>,
    ) -> Result<Vec<Order>, Error> {
        self.related(OrderField::UserId.equals(user_id), args).await
    }

    pub async fn check_ins(
        &mut self,
        user_id: &str,
        args: FindMany<CheckInField>,
    ) -> Result<Vec<CheckIn>, Error> {
        self.related(CheckInField::UserId.equals(user_id), args).await
    }
}
