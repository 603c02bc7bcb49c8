use crate::{
    db::DbPool,
    entities::{
        order::{self, OrderStatus},
        order_detail, product, reservation,
    },
    errors::{FieldErrors, ServiceError},
    notifications::{NotificationDispatcher, ReservationEmail},
    services::{
        settings::SettingsService,
        transaction_key::{generate_transaction_key, normalize_transaction_key},
    },
};
use chrono::NaiveDate;
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Fresh keys tried before giving up on a unique transaction key.
pub const MAX_TRANSACTION_KEY_ATTEMPTS: u32 = 5;

pub const EMPTY_SELECTION_MESSAGE: &str =
    "At least one product must have a quantity greater than zero.";

/// ASCII digits only.
static CONTACT_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{11}$").unwrap());

fn required(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some(Cow::from("This field is required."));
        return Err(err);
    }
    Ok(())
}

/// Reservation form as submitted, before date and product parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ReservationForm {
    #[validate(
        custom = "required",
        length(max = 100, message = "The name may not be greater than 100 characters.")
    )]
    pub name: String,
    #[validate(
        custom = "required",
        regex(
            path = "CONTACT_NUMBER_RE",
            message = "The contact number must be exactly 11 digits."
        )
    )]
    pub contact_number: String,
    #[validate(
        custom = "required",
        email(message = "The email must be a valid email address."),
        length(max = 255, message = "The email may not be greater than 255 characters.")
    )]
    pub email: String,
    #[validate(length(max = 50, message = "The coupon may not be greater than 50 characters."))]
    pub coupon: Option<String>,
    pub pick_up_date: String,
    /// `(product id, quantity)` exactly as submitted via `products[<id>]=<qty>`.
    pub products: Vec<(String, String)>,
}

impl ReservationForm {
    /// Builds the form from url-encoded pairs. Scalars are trimmed; a blank coupon is absent.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();

        for (key, value) in pairs {
            if let Some(product_id) = key
                .strip_prefix("products[")
                .and_then(|rest| rest.strip_suffix(']'))
            {
                form.products.push((product_id.to_string(), value));
                continue;
            }

            let value = value.trim().to_string();
            match key.as_str() {
                "name" => form.name = value,
                "contact_number" => form.contact_number = value,
                "email" => form.email = value,
                "coupon" => form.coupon = Some(value).filter(|v| !v.is_empty()),
                "pick_up_date" => form.pick_up_date = value,
                _ => {}
            }
        }

        form
    }

    /// Scalar inputs echoed back to the form after a rejected submission.
    pub fn old_input(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("contact_number", self.contact_number.clone()),
            ("email", self.email.clone()),
            ("coupon", self.coupon.clone().unwrap_or_default()),
            ("pick_up_date", self.pick_up_date.clone()),
        ]
    }

    /// Applies every field rule, collecting all failures.
    pub fn validate_at(&self, today: NaiveDate) -> Result<ValidatedReservation, FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        let pick_up_date = parse_pick_up_date(&self.pick_up_date, today, &mut errors);
        let lines = parse_product_lines(&self.products, &mut errors);

        match pick_up_date {
            Some(pick_up_date) if errors.is_empty() => Ok(ValidatedReservation {
                name: self.name.clone(),
                contact_number: self.contact_number.clone(),
                email: self.email.clone(),
                coupon: self.coupon.clone(),
                pick_up_date,
                lines,
            }),
            _ => Err(errors),
        }
    }
}

fn parse_pick_up_date(raw: &str, today: NaiveDate, errors: &mut FieldErrors) -> Option<NaiveDate> {
    if raw.is_empty() {
        errors.add("pick_up_date", "The pick up date field is required.");
        return None;
    }

    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) if date >= today => Some(date),
        Ok(_) => {
            errors.add(
                "pick_up_date",
                "The pick up date must be a date after or equal to today.",
            );
            None
        }
        Err(_) => {
            errors.add("pick_up_date", "The pick up date is not a valid date.");
            None
        }
    }
}

/// Product id to quantity, zero quantities included. A repeated id keeps the last value.
fn parse_product_lines(raw: &[(String, String)], errors: &mut FieldErrors) -> BTreeMap<i32, i32> {
    let mut lines = BTreeMap::new();

    if raw.is_empty() {
        errors.add("products", "The products field is required.");
        return lines;
    }

    for (id, quantity) in raw {
        let Ok(product_id) = id.trim().parse::<i32>() else {
            errors.add("products", format!("Invalid product identifier \"{}\".", id));
            continue;
        };

        let quantity = quantity.trim();
        let quantity = if quantity.is_empty() {
            0
        } else {
            match quantity.parse::<i32>() {
                Ok(q) if q >= 0 => q,
                Ok(_) => {
                    errors.add(
                        "products",
                        format!("The quantity for product {} must be at least 0.", product_id),
                    );
                    continue;
                }
                Err(_) => {
                    errors.add(
                        "products",
                        format!("The quantity for product {} must be an integer.", product_id),
                    );
                    continue;
                }
            }
        };

        lines.insert(product_id, quantity);
    }

    lines
}

/// A reservation request that passed every field rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedReservation {
    pub name: String,
    pub contact_number: String,
    pub email: String,
    pub coupon: Option<String>,
    pub pick_up_date: NaiveDate,
    pub lines: BTreeMap<i32, i32>,
}

impl ValidatedReservation {
    /// Lines with a positive quantity, ascending by product id.
    pub fn ordered_lines(&self) -> Vec<(i32, i32)> {
        self.lines
            .iter()
            .filter(|(_, quantity)| **quantity > 0)
            .map(|(id, quantity)| (*id, *quantity))
            .collect()
    }
}

/// Result of a stored reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReservationReceipt {
    pub order_id: i32,
    pub reservation_id: i32,
    pub transaction_key: String,
    pub total_amount: Decimal,
    pub pick_up_date: NaiveDate,
    /// Email jobs that made it onto the queue.
    pub notifications_queued: usize,
}

/// What a customer sees when looking up their transaction key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReservationStatus {
    pub transaction_key: String,
    pub status: OrderStatus,
    pub name: String,
    pub pick_up_date: NaiveDate,
    pub total_amount: Decimal,
}

type KeyGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Creates reservations and answers transaction-key lookups.
#[derive(Clone)]
pub struct ReservationService {
    db_pool: Arc<DbPool>,
    settings: SettingsService,
    notifications: NotificationDispatcher,
    key_generator: KeyGenerator,
}

impl ReservationService {
    pub fn new(
        db_pool: Arc<DbPool>,
        settings: SettingsService,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            db_pool,
            settings,
            notifications,
            key_generator: Arc::new(|| generate_transaction_key(&mut rand::thread_rng())),
        }
    }

    /// Replaces the random key source.
    pub fn with_key_generator(mut self, generator: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.key_generator = Arc::new(generator);
        self
    }

    /// Validates `form`, stores order, lines and reservation in one transaction,
    /// then queues the customer and staff emails.
    #[instrument(skip(self, form))]
    pub async fn create_reservation(
        &self,
        form: &ReservationForm,
        today: NaiveDate,
    ) -> Result<ReservationReceipt, ServiceError> {
        let valid = form.validate_at(today).map_err(|errors| {
            counter!("reservations.validation_rejections", 1);
            info!(fields = %errors, "Reservation form rejected");
            ServiceError::FieldErrors(errors)
        })?;

        let lines = valid.ordered_lines();
        if lines.is_empty() {
            counter!("reservations.validation_rejections", 1);
            return Err(FieldErrors::single("products", EMPTY_SELECTION_MESSAGE).into());
        }

        let started = Instant::now();
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to open reservation transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = self.insert_order_with_unique_key(&txn).await?;
        let order_id = order.id;
        let transaction_key = order.transaction_key.clone();

        let mut total = Decimal::ZERO;
        for (product_id, quantity) in lines {
            let product = product::Entity::find_by_id(product_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    warn!(product_id, order_id, "Reserved product does not exist, rolling back");
                    ServiceError::NotFound(format!("Product {} not found", product_id))
                })?;

            let amount = product.price * Decimal::from(quantity);
            order_detail::ActiveModel {
                order_id: Set(order_id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                amount: Set(amount),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

            total += amount;
        }

        let mut order: order::ActiveModel = order.into();
        order.total_amount = Set(total);
        order.update(&txn).await.map_err(ServiceError::DatabaseError)?;

        let reservation = reservation::ActiveModel {
            transaction_key: Set(transaction_key.clone()),
            name: Set(valid.name.clone()),
            contact_number: Set(valid.contact_number.clone()),
            email: Set(valid.email.clone()),
            coupon: Set(valid.coupon.clone()),
            pick_up_date: Set(valid.pick_up_date),
            order_id: Set(order_id),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id, "Failed to commit reservation");
            ServiceError::DatabaseError(e)
        })?;

        histogram!("reservations.create_duration_seconds", started.elapsed());
        counter!("reservations.created", 1);
        info!(order_id, transaction_key = %transaction_key, total = %total, "Reservation created");

        let notifications_queued = self.queue_notifications(&valid, &transaction_key).await;

        Ok(ReservationReceipt {
            order_id,
            reservation_id: reservation.id,
            transaction_key,
            total_amount: total,
            pick_up_date: valid.pick_up_date,
            notifications_queued,
        })
    }

    /// Inserts a pending order under a fresh key, retrying in a savepoint on key collisions.
    async fn insert_order_with_unique_key(
        &self,
        txn: &DatabaseTransaction,
    ) -> Result<order::Model, ServiceError> {
        for attempt in 1..=MAX_TRANSACTION_KEY_ATTEMPTS {
            let transaction_key = (self.key_generator)();
            let savepoint = txn.begin().await.map_err(ServiceError::DatabaseError)?;

            let inserted = order::ActiveModel {
                transaction_key: Set(transaction_key.clone()),
                status: Set(OrderStatus::Pending),
                total_amount: Set(Decimal::ZERO),
                ..Default::default()
            }
            .insert(&savepoint)
            .await;

            match inserted {
                Ok(order) => {
                    savepoint.commit().await.map_err(ServiceError::DatabaseError)?;
                    return Ok(order);
                }
                Err(e) if is_unique_violation(&e) => {
                    savepoint.rollback().await.map_err(ServiceError::DatabaseError)?;
                    counter!("reservations.transaction_key_collisions", 1);
                    warn!(attempt, transaction_key = %transaction_key, "Transaction key taken, regenerating");
                }
                Err(e) => {
                    error!(error = %e, "Failed to insert order");
                    return Err(ServiceError::DatabaseError(e));
                }
            }
        }

        Err(ServiceError::Conflict(format!(
            "Could not allocate a unique transaction key after {} attempts",
            MAX_TRANSACTION_KEY_ATTEMPTS
        )))
    }

    /// Queues both emails. Failures are logged; the reservation is already durable.
    async fn queue_notifications(&self, valid: &ValidatedReservation, transaction_key: &str) -> usize {
        let staff_address = match self.settings.staff_notification_email().await {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Staff email setting unavailable, using configured address");
                self.settings.fallback_staff_email().to_string()
            }
        };

        let emails = [
            ReservationEmail::Confirmation {
                to: valid.email.clone(),
                transaction_key: transaction_key.to_string(),
                pick_up_date: valid.pick_up_date,
            },
            ReservationEmail::StaffAlert {
                to: staff_address,
                transaction_key: transaction_key.to_string(),
                name: valid.name.clone(),
                pick_up_date: valid.pick_up_date,
                contact_number: valid.contact_number.clone(),
                email: valid.email.clone(),
            },
        ];

        let mut queued = 0;
        for email in &emails {
            match self.notifications.enqueue(email).await {
                Ok(()) => queued += 1,
                Err(e) => warn!(
                    kind = email.kind(),
                    transaction_key,
                    error = %e,
                    "Failed to queue reservation email"
                ),
            }
        }
        queued
    }

    /// Status of the reservation behind `transaction_key` (trimmed, case-insensitive).
    #[instrument(skip(self))]
    pub async fn find_by_transaction_key(
        &self,
        transaction_key: &str,
    ) -> Result<ReservationStatus, ServiceError> {
        let key = normalize_transaction_key(transaction_key);
        if key.is_empty() {
            return Err(ServiceError::ValidationError(
                "transaction_key is required".to_string(),
            ));
        }

        let found = reservation::Entity::find()
            .filter(reservation::Column::TransactionKey.eq(key.as_str()))
            .find_also_related(order::Entity)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to look up transaction key");
                ServiceError::DatabaseError(e)
            })?;

        match found {
            Some((reservation, Some(order))) => Ok(ReservationStatus {
                transaction_key: reservation.transaction_key,
                status: order.status,
                name: reservation.name,
                pick_up_date: reservation.pick_up_date,
                total_amount: order.total_amount,
            }),
            _ => Err(ServiceError::NotFound(format!(
                "No reservation found for transaction key {}",
                key
            ))),
        }
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
