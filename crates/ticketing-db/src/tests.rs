use crate::{
    models::*,
    query::*,
    repository::Entity,
    sql::{self, Bind},
    AnalyticsKey, CheckInField, Config, ConstraintKind, Error, ErrorKind, EventAnalyticsField,
    EventField, EventKey, OrderField, OrderKey, ScopedFutureExt, Store, TicketField, TicketKey,
    TicketTierField, UserField, UserKey,
};
use jiff::SignedDuration;
use std::time::Duration;

mod rendering {
    use super::*;

    #[test]
    fn it_binds_filter_values_instead_of_inlining_them() {
        let filter = UserField::Email.equals("ada@example.com");
        let sql = sql::count(Some(&filter)).expect("should render");
        assert_eq!(
            sql.text,
            r#"SELECT count(*) AS count FROM "users" WHERE ("email" = $1)"#
        );
        assert_eq!(sql.binds, vec![Bind::Text("ada@example.com".to_owned())]);
    }

    #[test]
    fn it_escapes_like_wildcards_in_string_patterns() {
        assert_eq!(sql::escape_like(r"50%_off\"), r"50\%\_off\\");
        let filter = EventField::Title.contains("50%_off").insensitive();
        let sql = sql::count(Some(&filter)).expect("should render");
        assert_eq!(
            sql.text,
            r#"SELECT count(*) AS count FROM "events" WHERE ("title" ILIKE $1)"#
        );
        assert_eq!(sql.binds, vec![Bind::Text(r"%50\%\_off%".to_owned())]);
    }

    #[test]
    fn it_makes_nested_patterns_case_insensitive() {
        let filter = EventField::City
            .starts_with("la")
            .or(EventField::Venue.ends_with("hall").not())
            .and(EventField::Status.equals("published"))
            .insensitive();
        let sql = sql::count(Some(&filter)).expect("should render");
        assert!(sql.text.contains(r#"("city" ILIKE $1)"#), "{}", sql.text);
        assert!(sql.text.contains(r#"(NOT ("venue" ILIKE $2))"#), "{}", sql.text);
        assert!(sql.text.contains(r#"("status" = $3)"#), "{}", sql.text);
        assert!(!sql.text.contains(" LIKE "), "{}", sql.text);
        assert_eq!(
            sql.binds,
            vec![
                Bind::Text(r"la%".to_owned()),
                Bind::Text(r"%hall".to_owned()),
                Bind::Text("published".to_owned()),
            ]
        );
    }

    #[test]
    fn it_renders_empty_membership_as_constant_truth_values() {
        let none = UserField::Id.in_list(Vec::<String>::new());
        let sql = sql::count(Some(&none)).expect("should render");
        assert!(sql.text.ends_with("WHERE (FALSE)"), "{}", sql.text);
        assert!(sql.binds.is_empty());

        let all = UserField::Id.not_in(Vec::<String>::new());
        let sql = sql::count(Some(&all)).expect("should render");
        assert!(sql.text.ends_with("WHERE (TRUE)"), "{}", sql.text);
    }

    #[test]
    fn it_combines_and_or_not_with_parentheses() {
        let filter = EventField::IsPublic
            .equals(true)
            .and(EventField::City.equals("Lagos").or(EventField::City.is_null()))
            .and(EventField::Status.equals("cancelled").not());
        let sql = sql::count(Some(&filter)).expect("should render");
        assert_eq!(
            sql.text,
            concat!(
                r#"SELECT count(*) AS count FROM "events" WHERE "#,
                r#"((("is_public" = $1) AND ((("city" = $2) OR ("city" IS NULL))) "#,
                r#"AND (NOT ("status" = $3))))"#
            )
        );
        assert_eq!(
            sql.binds,
            vec![
                Bind::Bool(true),
                Bind::Text("Lagos".to_owned()),
                Bind::Text("cancelled".to_owned()),
            ]
        );
    }

    #[test]
    fn it_appends_the_id_as_tie_breaker() {
        let args = FindMany::<UserField>::new().take(10);
        let sql = sql::select_rows(&args).expect("should render");
        assert_eq!(
            sql.text,
            r#"SELECT * FROM "users" WHERE TRUE ORDER BY "id" ASC NULLS LAST LIMIT $1"#
        );
        assert_eq!(sql.binds, vec![Bind::BigInt(10)]);
    }

    #[test]
    fn it_reverses_the_ordering_for_a_negative_take() {
        let args = FindMany::<UserField>::new()
            .order_by(UserField::CreatedAt.desc())
            .take(-2);
        assert!(args.is_backward());
        let sql = sql::select_rows(&args).expect("should render");
        assert_eq!(
            sql.text,
            concat!(
                r#"SELECT * FROM "users" WHERE TRUE "#,
                r#"ORDER BY "created_at" ASC NULLS LAST, "id" DESC NULLS FIRST LIMIT $1"#
            )
        );
        assert_eq!(sql.binds, vec![Bind::BigInt(2)]);
    }

    #[test]
    fn it_starts_a_cursor_page_at_the_cursor_row() {
        let args = FindMany::<UserField>::new().cursor("u-1").skip(1).take(2);
        let sql = sql::select_rows(&args).expect("should render");
        assert_eq!(
            sql.text,
            concat!(
                r#"SELECT * FROM "users" WHERE TRUE AND "#,
                r#"EXISTS (SELECT 1 FROM "users" WHERE "id" = $1) AND "id" >= $1 "#,
                r#"ORDER BY "id" ASC NULLS LAST LIMIT $2 OFFSET $3"#
            )
        );
        assert_eq!(
            sql.binds,
            vec![Bind::Text("u-1".to_owned()), Bind::BigInt(2), Bind::BigInt(1)]
        );
    }

    #[test]
    fn it_compares_earlier_sort_keys_against_the_cursor_row() {
        let args = FindMany::<TicketTierField>::new()
            .order_by(TicketTierField::Price.desc())
            .cursor("t-1");
        let sql = sql::select_rows(&args).expect("should render");
        let pivot = r#"(SELECT "price" FROM "ticket_tiers" WHERE "id" = $1)"#;
        assert!(
            sql.text.contains(&format!(
                r#"("price" < {pivot} OR ("price" IS NOT DISTINCT FROM {pivot} AND "id" >= $1))"#
            )),
            "{}",
            sql.text
        );
    }

    #[test]
    fn it_excludes_the_row_being_updated_from_unique_lookups() {
        let sql = sql::exists(&UserField::Email.equals("a@b.io"), Some("u-1"))
            .expect("should render");
        assert_eq!(
            sql.text,
            r#"SELECT EXISTS (SELECT 1 FROM "users" WHERE ("email" = $1) AND "id" <> $2) AS found"#
        );
    }

    #[test]
    fn it_builds_one_json_object_for_all_aggregates() {
        let aggregations = Aggregations::new().count().sum(OrderField::TotalAmount);
        let sql = sql::aggregate::<OrderField>(None, &aggregations).expect("should render");
        assert_eq!(
            sql.text,
            concat!(
                r#"SELECT jsonb_build_object('_count', count(*), "#,
                r#"'_sum', jsonb_build_object('total_amount', sum("total_amount"))) "#,
                r#"AS aggregates FROM "orders" WHERE TRUE"#
            )
        );
    }

    #[test]
    fn it_uses_boolean_aggregates_for_min_and_max_of_flags() {
        let aggregations = Aggregations::new().min(TicketField::IsUsed).max(TicketField::IsUsed);
        let sql = sql::aggregate::<TicketField>(None, &aggregations).expect("should render");
        assert!(sql.text.contains(r#"bool_and("is_used")"#), "{}", sql.text);
        assert!(sql.text.contains(r#"bool_or("is_used")"#), "{}", sql.text);
    }

    #[test]
    fn it_orders_groups_by_requested_keys_then_remaining_keys() {
        let args = GroupBy::new([OrderField::EventId, OrderField::PaymentMethod])
            .aggregations(Aggregations::new().count())
            .having(Having::count(Predicate::Gt(1.into())))
            .order_by(GroupOrder::Field(OrderField::PaymentMethod.desc()));
        let sql = sql::group_by(&args).expect("should render");
        assert!(
            sql.text.ends_with(concat!(
                r#"GROUP BY "event_id", "payment_method" HAVING (count(*) > $1) "#,
                r#"ORDER BY "payment_method" DESC NULLS FIRST, "event_id" ASC NULLS LAST"#
            )),
            "{}",
            sql.text
        );
        assert_eq!(sql.binds, vec![Bind::Int(1)]);
    }
}

mod validation {
    use super::*;

    fn is_validation<T: std::fmt::Debug>(result: Result<T, Error>) -> bool {
        matches!(result, Err(Error::Validation(_)))
    }

    #[test]
    fn it_rejects_predicates_that_do_not_match_the_field_type() {
        assert!(is_validation(sql::count(Some(&UserField::Email.gt(5)))));
        assert!(is_validation(sql::count(Some(&EventField::TotalSupply.equals("many")))));
        assert!(is_validation(sql::count(Some(&EventField::Tags.contains("rock")))));
        assert!(is_validation(sql::count(Some(&EventField::IsPublic.lt(true)))));
        assert!(is_validation(sql::count(Some(&OrderField::BillingAddress.equals("x")))));
        assert!(sql::count(Some(&EventField::Tags.has("rock"))).is_ok());
        assert!(sql::count(Some(&OrderField::BillingAddress.is_null())).is_ok());
        assert!(sql::count(Some(&EventField::TicketPrice.gte(10))).is_ok());
    }

    #[test]
    fn it_rejects_numeric_aggregates_over_non_numeric_fields() {
        let avg = Aggregations::new().avg(OrderField::Currency);
        assert!(is_validation(sql::aggregate::<OrderField>(None, &avg)));
        let sum = Aggregations::new().sum(EventField::Tags);
        assert!(is_validation(sql::aggregate::<EventField>(None, &sum)));
        let min = Aggregations::new().min(OrderField::Currency).max(OrderField::CreatedAt);
        assert!(sql::aggregate::<OrderField>(None, &min).is_ok());
    }

    #[test]
    fn it_rejects_ordering_by_unorderable_fields() {
        let args = FindMany::<EventField>::new().order_by(EventField::Tags.asc());
        assert!(is_validation(sql::select_rows(&args)));
        let args = FindMany::<EventField>::new().skip(-1);
        assert!(is_validation(sql::select_rows(&args)));
    }

    #[test]
    fn it_requires_group_by_keys() {
        let args = GroupBy::<OrderField>::new([]);
        assert!(is_validation(sql::group_by(&args)));
    }

    #[test]
    fn it_rejects_having_on_a_field_outside_by() {
        let args = GroupBy::new([OrderField::EventId])
            .having(Having::Field(OrderField::UserId, Predicate::Equals("u".into())));
        assert!(is_validation(sql::group_by(&args)));
    }

    #[test]
    fn it_rejects_ordering_groups_by_a_field_outside_by() {
        let args = GroupBy::new([OrderField::EventId])
            .order_by(GroupOrder::Field(OrderField::CreatedAt.asc()));
        assert!(is_validation(sql::group_by(&args)));
    }

    #[test]
    fn it_allows_aggregate_references_outside_by() {
        let args = GroupBy::new([OrderField::EventId])
            .having(Having::aggregate(
                AggregateFn::Sum,
                OrderField::TotalAmount,
                Predicate::Gt(10.0.into()),
            ))
            .order_by(GroupOrder::Aggregate {
                function: AggregateFn::Avg,
                field: Some(OrderField::Quantity),
                direction: Direction::Desc,
            });
        assert!(sql::group_by(&args).is_ok());
    }

    #[test]
    fn it_leaves_blank_text_and_free_form_emails_to_the_schema() {
        let checks = crate::models::User::create_checks(&NewUser {
            email: "   ".to_owned(),
            ..NewUser::default()
        });
        assert_eq!(checks.unique_names().collect::<Vec<_>>(), vec!["users_email_key"]);
    }

    #[test]
    fn it_checks_only_the_nullable_keys_that_are_set() {
        let checks = crate::models::User::create_checks(&NewUser {
            email: "ada@example.com".to_owned(),
            wallet_address: Some("0xabc".to_owned()),
            twitter_id: Some("ada".to_owned()),
            ..NewUser::default()
        });
        assert_eq!(
            checks.unique_names().collect::<Vec<_>>(),
            vec!["users_email_key", "users_wallet_address_key", "users_twitter_id_key"]
        );

        let cleared = crate::models::User::update_checks(
            &User {
                id: "u-1".to_owned(),
                email: "ada@example.com".to_owned(),
                password: None,
                name: None,
                wallet_address: Some("0xabc".to_owned()),
                google_id: None,
                twitter_id: None,
                avatar: None,
                role: "user".to_owned(),
                reset_token: None,
                reset_token_expiry: None,
                created_at: crate::now().into(),
                updated_at: crate::now().into(),
            },
            &UpdateUser {
                wallet_address: Some(None),
                google_id: Some(Some("g-1".to_owned())),
                ..UpdateUser::default()
            },
        );
        assert_eq!(
            cleared.unique_names().collect::<Vec<_>>(),
            vec!["users_google_id_key"]
        );
    }

    #[test]
    fn it_checks_email_addresses_only_on_request() {
        assert!(crate::integrity::check_email("users_email_check", "ada@example.com").is_ok());
        match crate::integrity::check_email("users_email_check", "no-at-sign") {
            Err(Error::ConstraintViolation(constraint)) => {
                assert_eq!(constraint.kind, ConstraintKind::Check);
                assert_eq!(constraint.name, "users_email_check");
            }
            other => panic!("expected a check violation, got {other:?}"),
        }
    }
}

mod results {
    use super::*;

    #[test]
    fn it_reads_aggregates_back_into_field_kinds() {
        let json = serde_json::json!({
            "_count": 3,
            "_count_fields": { "customer_name": 2 },
            "_avg": { "total_amount": 12.5 },
            "_sum": { "total_amount": 37.5, "quantity": 4 },
            "_min": { "created_at": "2025-03-01T09:30:00+00:00" },
            "_max": { "currency": null },
        });
        let result = AggregateResult::<OrderField>::from_json(&json).expect("should parse");
        assert_eq!(result.count, Some(3));
        assert_eq!(result.count_fields.get(&OrderField::CustomerName), Some(&2));
        assert_eq!(result.avg_of(OrderField::TotalAmount), Some(12.5));
        assert_eq!(result.sum_of(OrderField::TotalAmount), Some(&Value::Double(37.5)));
        assert_eq!(result.sum_of(OrderField::Quantity), Some(&Value::Int(4)));
        assert_eq!(
            result.min_of(OrderField::CreatedAt),
            Some(&Value::Timestamp(
                "2025-03-01T09:30:00Z".parse().expect("valid timestamp")
            ))
        );
        assert_eq!(result.max_of(OrderField::Currency), None);
    }

    #[test]
    fn it_reads_group_keys_by_column() {
        let keys = serde_json::json!({ "event_id": "e-1", "date": "2025-03-01" });
        let aggregates = serde_json::json!({ "_count": 1 });
        let row = GroupRow::<EventAnalyticsField>::from_json(&keys, &aggregates)
            .expect("should parse");
        assert_eq!(row.key(EventAnalyticsField::EventId), Some(&Value::from("e-1")));
        assert_eq!(
            row.key(EventAnalyticsField::Date),
            Some(&Value::Date(jiff::civil::date(2025, 3, 1)))
        );
        assert_eq!(row.aggregates.count, Some(1));
    }
}

mod errors {
    use super::*;

    #[test]
    fn it_classifies_errors() {
        assert_eq!(
            Error::NotFound { entity: "User" }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(Error::Validation("bad".to_owned()).kind(), ErrorKind::Validation);
        assert_eq!(
            Error::Configuration("DATABASE_URL must be set".to_owned()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            Error::from(diesel::result::Error::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::from(diesel::result::Error::RollbackTransaction).kind(),
            ErrorKind::Transport
        );
        let violation = Error::ConstraintViolation(crate::Constraint::new(
            ConstraintKind::Unique,
            "users_email_key",
        ));
        assert_eq!(violation.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(
            violation.constraint().map(|c| c.name.as_str()),
            Some("users_email_key")
        );
        assert!(!violation.is_serialization_failure());
    }
}

mod config {
    use super::*;

    #[test]
    fn it_passes_the_statement_timeout_as_a_startup_option() {
        let mut config = Config::new("postgres://localhost/ticketing");
        assert_eq!(config.connection_url(), "postgres://localhost/ticketing");
        config.statement_timeout = Some(Duration::from_secs(5));
        assert_eq!(
            config.connection_url(),
            "postgres://localhost/ticketing?options=-c%20statement_timeout%3D5000"
        );
        config.db_url = "postgres://localhost/ticketing?sslmode=disable".to_owned();
        assert!(config
            .connection_url()
            .ends_with("?sslmode=disable&options=-c%20statement_timeout%3D5000"));
    }

    #[test]
    fn it_deserializes_kebab_case_with_humantime_durations() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "db-url": "postgres://localhost/ticketing",
            "max-open": 4,
            "max-idle": 1,
            "timeout-for-get": "3s",
            "statement-timeout": "2m",
        }))
        .expect("should deserialize");
        assert_eq!(config.max_open, 4);
        assert_eq!(config.max_idle, 1);
        assert_eq!(config.timeout_for_get, Duration::from_secs(3));
        assert_eq!(config.statement_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.max_lifetime, None);
    }
}

/// Tests below run against `DATABASE_URL` and are skipped when it is not set.
mod store {
    use super::*;

    static SCHEMA_APPLIED: tokio::sync::Mutex<bool> = tokio::sync::Mutex::const_new(false);

    async fn store() -> Option<Store> {
        let Ok(config) = Config::from_env() else {
            eprintln!("DATABASE_URL is not set, skipping");
            return None;
        };
        let store = crate::create(&config)
            .await
            .expect("should connect to DATABASE_URL");
        let mut applied = SCHEMA_APPLIED.lock().await;
        if !*applied {
            store.apply_schema().await.expect("should apply schema");
            *applied = true;
        }
        Some(store)
    }

    fn unique(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
    }

    async fn user(store: &Store) -> User {
        store
            .users()
            .create(NewUser {
                email: format!("{}@example.com", unique("user")),
                ..NewUser::default()
            })
            .await
            .expect("should create user")
    }

    async fn event(store: &Store, organizer_id: &str) -> Event {
        let now = crate::now();
        store
            .events()
            .create(NewEvent::new(
                organizer_id,
                unique("Launch Night"),
                "Main Hall",
                now + SignedDuration::from_hours(24 * 30),
                now,
                now + SignedDuration::from_hours(24 * 29),
                500,
                25.0,
            ))
            .await
            .expect("should create event")
    }

    async fn order(store: &Store, user: &User, event_id: &str, method: &str, amount: f64) -> Order {
        store
            .orders()
            .create(NewOrder {
                total_amount: amount,
                quantity: 1,
                currency: "USD".to_owned(),
                payment_method: method.to_owned(),
                customer_email: user.email.clone(),
                user_id: user.id.clone(),
                event_id: event_id.to_owned(),
                ..NewOrder::default()
            })
            .await
            .expect("should create order")
    }

    fn new_ticket(contract_address: &str, token_id: i32, order: &Order) -> NewTicket {
        NewTicket {
            token_id,
            contract_address: contract_address.to_owned(),
            chain_id: 1,
            event_id: order.event_id.clone(),
            order_id: order.id.clone(),
            ..NewTicket::default()
        }
    }

    fn new_tier(event_id: &str, name: &str, price: f64) -> NewTicketTier {
        let now = crate::now();
        NewTicketTier {
            id: None,
            name: name.to_owned(),
            description: None,
            price,
            available_quantity: 100,
            max_per_person: None,
            sale_start: now.into(),
            sale_end: (now + SignedDuration::from_hours(24)).into(),
            event_id: event_id.to_owned(),
        }
    }

    fn violation(result: Result<impl std::fmt::Debug, Error>) -> (ConstraintKind, String) {
        match result {
            Err(Error::ConstraintViolation(constraint)) => (constraint.kind, constraint.name),
            other => panic!("expected a constraint violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn it_creates_then_finds_a_user_by_every_unique_key() {
        let Some(store) = store().await else { return };
        let wallet = unique("0xwallet");
        let created = store
            .users()
            .create(NewUser {
                email: format!("{}@example.com", unique("ada")),
                wallet_address: Some(wallet.clone()),
                name: Some("Ada".to_owned()),
                ..NewUser::default()
            })
            .await
            .expect("should create user");
        assert_eq!(created.role, "user", "role should take the column default");
        for key in [
            UserKey::Id(created.id.clone()),
            UserKey::Email(created.email.clone()),
            UserKey::WalletAddress(wallet.clone()),
        ] {
            let found = store
                .users()
                .find_unique(key)
                .await
                .expect("should query");
            assert_eq!(found.as_ref(), Some(&created));
        }
        let missing = store
            .users()
            .find_unique_or_throw(UserKey::Email(unique("nobody")))
            .await;
        assert!(matches!(missing, Err(Error::NotFound { entity: "User" })));
    }

    #[tokio::test]
    async fn it_rejects_a_duplicate_email() {
        let Some(store) = store().await else { return };
        let email = format!("{}@example.com", unique("dup"));
        let new_user = NewUser {
            email: email.clone(),
            ..NewUser::default()
        };
        store
            .users()
            .create(new_user.clone())
            .await
            .expect("first create should succeed");
        let second = store.users().create(new_user).await;
        assert_eq!(
            violation(second),
            (ConstraintKind::Unique, "users_email_key".to_owned())
        );
        let count = store
            .users()
            .count(Some(UserField::Email.equals(&email)))
            .await
            .expect("should count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn it_lets_the_unique_constraint_decide_concurrent_creates() {
        let Some(store) = store().await else { return };
        for _ in 0..10 {
            let new_user = NewUser {
                email: format!("{}@example.com", unique("race")),
                ..NewUser::default()
            };
            let mut first = store.users();
            let mut second = store.users();
            let (a, b) = tokio::join!(first.create(new_user.clone()), second.create(new_user));
            let (created, rejected) = match (a, b) {
                (Ok(user), Err(err)) | (Err(err), Ok(user)) => (user, err),
                other => panic!("expected one success and one failure, got {other:?}"),
            };
            assert_eq!(
                violation(Err::<(), _>(rejected)),
                (ConstraintKind::Unique, "users_email_key".to_owned())
            );
            let found = store
                .users()
                .find_unique(UserKey::Email(created.email.clone()))
                .await
                .expect("should query");
            assert_eq!(found, Some(created));
        }
    }

    #[tokio::test]
    async fn it_rejects_duplicate_wallet_and_social_ids() {
        let Some(store) = store().await else { return };
        let cases: [(fn(&mut NewUser, String), &str); 3] = [
            (|u, v| u.wallet_address = Some(v), "users_wallet_address_key"),
            (|u, v| u.google_id = Some(v), "users_google_id_key"),
            (|u, v| u.twitter_id = Some(v), "users_twitter_id_key"),
        ];
        for (assign, constraint) in cases {
            let shared = unique("identity");
            let mut first = NewUser {
                email: format!("{}@example.com", unique("first")),
                ..NewUser::default()
            };
            assign(&mut first, shared.clone());
            store
                .users()
                .create(first)
                .await
                .expect("first holder should be created");
            let mut second = NewUser {
                email: format!("{}@example.com", unique("second")),
                ..NewUser::default()
            };
            assign(&mut second, shared);
            let result = store.users().create(second).await;
            assert_eq!(
                violation(result),
                (ConstraintKind::Unique, constraint.to_owned())
            );
        }
    }

    #[tokio::test]
    async fn it_allows_any_number_of_users_without_optional_ids() {
        let Some(store) = store().await else { return };
        let first = user(&store).await;
        let second = user(&store).await;
        for created in [&first, &second] {
            assert_eq!(created.wallet_address, None);
            assert_eq!(created.google_id, None);
            assert_eq!(created.twitter_id, None);
        }
        let both = store
            .users()
            .count(Some(
                UserField::Id
                    .in_list([first.id.clone(), second.id.clone()])
                    .and(UserField::WalletAddress.is_null()),
            ))
            .await
            .expect("should count");
        assert_eq!(both, 2);
    }

    #[tokio::test]
    async fn it_rejects_a_duplicate_payment_reference() {
        let Some(store) = store().await else { return };
        let buyer = user(&store).await;
        let event = event(&store, &buyer.id).await;
        let charge = NewOrder {
            total_amount: 25.0,
            quantity: 1,
            currency: "USD".to_owned(),
            payment_method: "stripe".to_owned(),
            stripe_payment_id: Some(unique("pi")),
            customer_email: buyer.email.clone(),
            user_id: buyer.id.clone(),
            event_id: event.id.clone(),
            ..NewOrder::default()
        };
        let placed = store
            .orders()
            .create(charge.clone())
            .await
            .expect("first charge should be recorded");
        let result = store.orders().create(charge).await;
        assert_eq!(
            violation(result),
            (ConstraintKind::Unique, "orders_stripe_payment_id_key".to_owned())
        );
        let found = store
            .orders()
            .find_unique(OrderKey::StripePaymentId(
                placed.stripe_payment_id.clone().unwrap_or_default(),
            ))
            .await
            .expect("should query");
        assert_eq!(found, Some(placed));
    }

    #[tokio::test]
    async fn it_rejects_an_update_onto_another_users_wallet() {
        let Some(store) = store().await else { return };
        let wallet = unique("0xwallet");
        store
            .users()
            .create(NewUser {
                email: format!("{}@example.com", unique("holder")),
                wallet_address: Some(wallet.clone()),
                ..NewUser::default()
            })
            .await
            .expect("should create wallet holder");
        let other = user(&store).await;
        let result = store
            .users()
            .update(
                UserKey::Id(other.id.clone()),
                UpdateUser {
                    wallet_address: Some(Some(wallet)),
                    ..UpdateUser::default()
                },
            )
            .await;
        assert_eq!(
            violation(result),
            (ConstraintKind::Unique, "users_wallet_address_key".to_owned())
        );
        let unchanged = store
            .users()
            .find_unique_or_throw(UserKey::Id(other.id.clone()))
            .await
            .expect("should still exist");
        assert_eq!(unchanged, other);
    }

    #[tokio::test]
    async fn it_stores_any_text_the_schema_accepts() {
        let Some(store) = store().await else { return };
        let created = store
            .users()
            .create(NewUser {
                email: unique("no-at-sign"),
                ..NewUser::default()
            })
            .await
            .expect("free-form email should be stored");
        let found = store
            .users()
            .find_unique(UserKey::Email(created.email.clone()))
            .await
            .expect("should query");
        assert_eq!(found.as_ref(), Some(&created));

        let now = crate::now();
        let blank = store
            .events()
            .create(NewEvent::new(&created.id, "", "", now, now, now, 1, 1.0))
            .await
            .expect("blank title and venue should be stored");
        assert_eq!(blank.title, "");
        let found = store
            .events()
            .find_unique(EventKey::Id(blank.id.clone()))
            .await
            .expect("should query");
        assert_eq!(found, Some(blank));
    }

    #[tokio::test]
    async fn it_matches_patterns_case_insensitively_on_request() {
        let Some(store) = store().await else { return };
        let organizer = user(&store).await;
        let marker = uuid::Uuid::new_v4().simple().to_string();
        let now = crate::now();
        store
            .events()
            .create(NewEvent::new(
                &organizer.id,
                format!("jazz-{marker} under the stars"),
                "Rooftop",
                now,
                now,
                now,
                50,
                10.0,
            ))
            .await
            .expect("should create event");
        let shouted = format!("JAZZ-{}", marker.to_uppercase());
        let sensitive = store
            .events()
            .count(Some(EventField::Title.contains(&shouted)))
            .await
            .expect("should count");
        assert_eq!(sensitive, 0);
        let insensitive = store
            .events()
            .count(Some(EventField::Title.contains(&shouted).insensitive()))
            .await
            .expect("should count");
        assert_eq!(insensitive, 1);
    }

    #[tokio::test]
    async fn it_rejects_references_to_missing_rows() {
        let Some(store) = store().await else { return };
        let now = crate::now();
        let result = store
            .events()
            .create(NewEvent::new(
                unique("ghost"),
                "Orphan",
                "Nowhere",
                now,
                now,
                now,
                1,
                1.0,
            ))
            .await;
        assert_eq!(
            violation(result),
            (ConstraintKind::ForeignKey, "events_organizer_id_fkey".to_owned())
        );
    }

    #[tokio::test]
    async fn it_enforces_the_contract_token_pair() {
        let Some(store) = store().await else { return };
        let buyer = user(&store).await;
        let event = event(&store, &buyer.id).await;
        let order = order(&store, &buyer, &event.id, "stripe", 25.0).await;
        let contract = unique("0xcontract");
        let ticket = store
            .tickets()
            .create(new_ticket(&contract, 1, &order))
            .await
            .expect("should mint first token");
        store
            .tickets()
            .create(new_ticket(&contract, 2, &order))
            .await
            .expect("another token on the same contract is fine");
        let duplicate = store.tickets().create(new_ticket(&contract, 1, &order)).await;
        assert_eq!(
            violation(duplicate),
            (
                ConstraintKind::Unique,
                "tickets_contract_address_token_id_key".to_owned()
            )
        );
        let found = store
            .tickets()
            .find_unique(TicketKey::ContractToken {
                contract_address: contract.clone(),
                token_id: 1,
            })
            .await
            .expect("should query");
        assert_eq!(found.map(|t| t.id), Some(ticket.id));
    }

    #[tokio::test]
    async fn it_admits_a_ticket_only_once() {
        let Some(store) = store().await else { return };
        let buyer = user(&store).await;
        let event = event(&store, &buyer.id).await;
        let order = order(&store, &buyer, &event.id, "stripe", 25.0).await;
        let ticket = store
            .tickets()
            .create(new_ticket(&unique("0xcontract"), 7, &order))
            .await
            .expect("should create ticket");
        let new_check_in = NewCheckIn {
            ticket_id: ticket.id.clone(),
            event_id: event.id.clone(),
            user_id: buyer.id.clone(),
            location: Some("Gate A".to_owned()),
            ..NewCheckIn::default()
        };
        let check_in = store
            .check_ins()
            .create(new_check_in.clone())
            .await
            .expect("first check-in should succeed");
        let again = store.check_ins().create(new_check_in).await;
        assert_eq!(
            violation(again),
            (ConstraintKind::Unique, "check_ins_ticket_id_key".to_owned())
        );
        let recorded = store
            .tickets()
            .check_in(&ticket.id)
            .await
            .expect("should query");
        assert_eq!(recorded, Some(check_in.clone()));
        let owner = store
            .check_ins()
            .user(&check_in)
            .await
            .expect("should load user");
        assert_eq!(owner.id, buyer.id);
    }

    #[tokio::test]
    async fn it_upserts_one_rollup_per_event_and_day() {
        let Some(store) = store().await else { return };
        let organizer = user(&store).await;
        let event = event(&store, &organizer.id).await;
        let day = jiff::civil::date(2025, 3, 1);
        let key = AnalyticsKey::EventDate {
            event_id: event.id.clone(),
            date: day,
        };
        let create = NewEventAnalytics {
            tickets_sold: Some(5),
            ..NewEventAnalytics::new(&event.id, day)
        };
        let update = UpdateEventAnalytics {
            tickets_sold: Some(9),
            ..UpdateEventAnalytics::default()
        };
        let first = store
            .event_analytics()
            .upsert(key.clone(), create.clone(), update.clone())
            .await
            .expect("should create");
        assert_eq!(first.tickets_sold, 5);
        let second = store
            .event_analytics()
            .upsert(key, create, update)
            .await
            .expect("should update");
        assert_eq!(second.id, first.id);
        assert_eq!(second.tickets_sold, 9);
        let count = store
            .event_analytics()
            .count(Some(EventAnalyticsField::EventId.equals(&event.id)))
            .await
            .expect("should count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn it_pages_with_cursors_in_both_directions() {
        let Some(store) = store().await else { return };
        let organizer = user(&store).await;
        let event = event(&store, &organizer.id).await;
        let mut tiers = Vec::new();
        for name in ["A", "B", "C", "D"] {
            tiers.push(
                store
                    .ticket_tiers()
                    .create(new_tier(&event.id, name, 10.0))
                    .await
                    .expect("should create tier"),
            );
        }
        let names = |rows: Vec<TicketTier>| rows.into_iter().map(|t| t.name).collect::<Vec<_>>();
        let page = |args: FindMany<TicketTierField>| {
            args.filter(TicketTierField::EventId.equals(&event.id))
                .order_by(TicketTierField::Name.asc())
        };

        let first = store
            .ticket_tiers()
            .find_many(page(FindMany::new()).take(2))
            .await
            .expect("should query");
        assert_eq!(names(first), ["A", "B"]);

        let from_b = store
            .ticket_tiers()
            .find_many(page(FindMany::new()).cursor(&tiers[1].id).take(2))
            .await
            .expect("should query");
        assert_eq!(names(from_b), ["B", "C"]);

        let after_b = store
            .ticket_tiers()
            .find_many(page(FindMany::new()).cursor(&tiers[1].id).skip(1).take(2))
            .await
            .expect("should query");
        assert_eq!(names(after_b), ["C", "D"]);

        let last = store
            .ticket_tiers()
            .find_many(page(FindMany::new()).take(-2))
            .await
            .expect("should query");
        assert_eq!(names(last), ["C", "D"]);

        let up_to_c = store
            .ticket_tiers()
            .find_many(page(FindMany::new()).cursor(&tiers[2].id).take(-2))
            .await
            .expect("should query");
        assert_eq!(names(up_to_c), ["B", "C"]);

        let unknown = store
            .ticket_tiers()
            .find_many(page(FindMany::new()).cursor(unique("missing")))
            .await
            .expect("should query");
        assert!(unknown.is_empty());

        let last_one = store
            .ticket_tiers()
            .find_first_or_throw(page(FindMany::new()).take(-1))
            .await
            .expect("should find");
        assert_eq!(last_one.name, "D");
    }

    #[tokio::test]
    async fn it_updates_many_idempotently_then_deletes_them() {
        let Some(store) = store().await else { return };
        let organizer = user(&store).await;
        let event = event(&store, &organizer.id).await;
        let rows = ["Early", "General", "VIP"]
            .into_iter()
            .map(|name| new_tier(&event.id, name, 10.0))
            .collect::<Vec<_>>();
        let created = store
            .ticket_tiers()
            .create_many(rows, false)
            .await
            .expect("should create tiers");
        assert_eq!(created, 3);

        let filter = TicketTierField::EventId.equals(&event.id);
        let update = UpdateTicketTier {
            price: Some(20.0),
            ..UpdateTicketTier::default()
        };
        let first = store
            .ticket_tiers()
            .update_many(Some(filter.clone()), update.clone())
            .await
            .expect("should update");
        let second = store
            .ticket_tiers()
            .update_many(Some(filter.clone()), update)
            .await
            .expect("should update again");
        assert_eq!(first, 3);
        assert_eq!(second, first);
        let prices = store
            .ticket_tiers()
            .aggregate(
                Some(filter.clone()),
                Aggregations::new().min(TicketTierField::Price).max(TicketTierField::Price),
            )
            .await
            .expect("should aggregate");
        assert_eq!(prices.min_of(TicketTierField::Price), Some(&Value::Double(20.0)));
        assert_eq!(prices.max_of(TicketTierField::Price), Some(&Value::Double(20.0)));

        let deleted = store
            .ticket_tiers()
            .delete_many(Some(filter.clone()))
            .await
            .expect("should delete");
        assert_eq!(deleted, 3);
        let remaining = store
            .ticket_tiers()
            .find_many(FindMany::new().filter(filter))
            .await
            .expect("should query");
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn it_skips_duplicates_only_when_asked() {
        let Some(store) = store().await else { return };
        let email = format!("{}@example.com", unique("batch"));
        let rows = || {
            vec![
                NewUser {
                    email: email.clone(),
                    ..NewUser::default()
                },
                NewUser {
                    email: email.clone(),
                    ..NewUser::default()
                },
            ]
        };
        let strict = store.users().create_many(rows(), false).await;
        assert_eq!(
            violation(strict),
            (ConstraintKind::Unique, "users_email_key".to_owned())
        );
        assert_eq!(
            store
                .users()
                .count(Some(UserField::Email.equals(&email)))
                .await
                .expect("should count"),
            0,
            "a failed batch should write nothing"
        );
        let lenient = store
            .users()
            .create_many(rows(), true)
            .await
            .expect("should skip the duplicate");
        assert_eq!(lenient, 1);
    }

    #[tokio::test]
    async fn it_rolls_up_orders_per_payment_method() {
        let Some(store) = store().await else { return };
        let buyer = user(&store).await;
        let event = event(&store, &buyer.id).await;
        order(&store, &buyer, &event.id, "stripe", 50.0).await;
        order(&store, &buyer, &event.id, "stripe", 30.0).await;
        order(&store, &buyer, &event.id, "paystack", 20.0).await;

        let filter = OrderField::EventId.equals(&event.id);
        let totals = store
            .orders()
            .aggregate(
                Some(filter.clone()),
                Aggregations::new()
                    .count()
                    .sum(OrderField::TotalAmount)
                    .avg(OrderField::TotalAmount),
            )
            .await
            .expect("should aggregate");
        assert_eq!(totals.count, Some(3));
        assert_eq!(totals.sum_of(OrderField::TotalAmount), Some(&Value::Double(100.0)));

        let groups = store
            .orders()
            .group_by(
                GroupBy::new([OrderField::PaymentMethod])
                    .filter(filter.clone())
                    .aggregations(Aggregations::new().count().sum(OrderField::TotalAmount))
                    .order_by(GroupOrder::Aggregate {
                        function: AggregateFn::Count,
                        field: None,
                        direction: Direction::Desc,
                    }),
            )
            .await
            .expect("should group");
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].key(OrderField::PaymentMethod),
            Some(&Value::from("stripe"))
        );
        assert_eq!(groups[0].aggregates.count, Some(2));
        assert_eq!(
            groups[0].aggregates.sum_of(OrderField::TotalAmount),
            Some(&Value::Double(80.0))
        );

        let invalid = store
            .orders()
            .group_by(
                GroupBy::new([OrderField::PaymentMethod])
                    .filter(filter.clone())
                    .having(Having::Field(OrderField::UserId, Predicate::Equals(buyer.id.clone().into()))),
            )
            .await;
        assert!(matches!(invalid, Err(Error::Validation(_))));
        assert_eq!(
            store.orders().count(Some(filter)).await.expect("should count"),
            3,
            "a rejected query should not touch any row"
        );
    }

    #[tokio::test]
    async fn it_restricts_deletes_of_referenced_rows_but_cascades_event_details() {
        let Some(store) = store().await else { return };
        let organizer = user(&store).await;
        let event = event(&store, &organizer.id).await;
        store
            .ticket_tiers()
            .create(new_tier(&event.id, "General", 15.0))
            .await
            .expect("should create tier");
        store
            .event_analytics()
            .create(NewEventAnalytics::new(&event.id, jiff::civil::date(2025, 3, 2)))
            .await
            .expect("should create rollup");

        let restricted = store.users().delete(UserKey::Id(organizer.id.clone())).await;
        assert_eq!(
            violation(restricted),
            (ConstraintKind::Restrict, "events_organizer_id_fkey".to_owned())
        );

        let deleted = store
            .events()
            .delete(crate::EventKey::Id(event.id.clone()))
            .await
            .expect("should delete event");
        assert_eq!(deleted.id, event.id);
        let tiers = store
            .ticket_tiers()
            .count(Some(TicketTierField::EventId.equals(&event.id)))
            .await
            .expect("should count");
        assert_eq!(tiers, 0);
        let rollups = store
            .event_analytics()
            .count(Some(EventAnalyticsField::EventId.equals(&event.id)))
            .await
            .expect("should count");
        assert_eq!(rollups, 0);

        store
            .users()
            .delete(UserKey::Id(organizer.id.clone()))
            .await
            .expect("organizer without events can be deleted");
        let gone = store.users().delete(UserKey::Id(organizer.id)).await;
        assert!(matches!(gone, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn it_rolls_back_every_write_of_a_failed_transaction() {
        let Some(store) = store().await else { return };
        let email = format!("{}@example.com", unique("rollback"));
        let inside = email.clone();
        let result = store
            .transaction(|mut tx| {
                async move {
                    let user = tx
                        .users()
                        .create(NewUser {
                            email: inside,
                            ..NewUser::default()
                        })
                        .await?;
                    let seen = tx
                        .users()
                        .find_unique(UserKey::Id(user.id.clone()))
                        .await?;
                    assert!(seen.is_some(), "writes should be visible inside the transaction");
                    Err::<(), _>(Error::Validation("abort".to_owned()))
                }
                .scope_boxed()
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        let found = store
            .users()
            .find_unique(UserKey::Email(email))
            .await
            .expect("should query");
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn it_traverses_relations_with_filters() {
        let Some(store) = store().await else { return };
        let buyer = user(&store).await;
        let event = event(&store, &buyer.id).await;
        let paid = order(&store, &buyer, &event.id, "stripe", 25.0).await;
        order(&store, &buyer, &event.id, "paystack", 25.0).await;
        store
            .tickets()
            .create(new_ticket(&unique("0xcontract"), 1, &paid))
            .await
            .expect("should create ticket");

        let organized = store
            .users()
            .organized_events(&buyer.id, FindMany::new())
            .await
            .expect("should traverse");
        assert_eq!(organized.len(), 1);
        let stripe = store
            .events()
            .orders(
                &event.id,
                FindMany::new().filter(OrderField::PaymentMethod.equals("stripe")),
            )
            .await
            .expect("should traverse");
        assert_eq!(stripe.len(), 1);
        assert_eq!(stripe[0].id, paid.id);
        let tickets = store
            .orders()
            .tickets(&paid.id, FindMany::new())
            .await
            .expect("should traverse");
        assert_eq!(tickets.len(), 1);
        let organizer = store
            .events()
            .organizer(&event)
            .await
            .expect("should traverse");
        assert_eq!(organizer.id, buyer.id);
        let admissions = store
            .events()
            .check_ins(&event.id, FindMany::new().filter(CheckInField::UserId.equals(&buyer.id)))
            .await
            .expect("should traverse");
        assert!(admissions.is_empty());
    }
}
