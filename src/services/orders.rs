use crate::{
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
        order_detail::{self, Model as OrderDetailModel},
        product,
        reservation::{self, Model as ReservationModel},
    },
    errors::ServiceError,
    services::format::{asset_url, format_money},
    page_index, PaginatedResponse,
};
use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, EntityTrait, FromQueryResult, LoaderTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

/// Orders per listing page.
pub const LISTING_PAGE_SIZE: u64 = 10;

/// Look-back for the dashboard's "recently updated" figures. Inclusive at the boundary.
pub const RECENT_WINDOW_HOURS: i64 = 4;

/// Listing row for the unfiltered view: the order plus its reservation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderWithReservation {
    #[serde(flatten)]
    pub order: OrderModel,
    pub reservation: Option<ReservationModel>,
}

/// An order together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderWithDetails {
    #[serde(flatten)]
    pub order: OrderModel,
    pub order_details: Vec<OrderDetailModel>,
}

/// Current number of orders per status, plus the overall total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub ready_to_pickup: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub total: u64,
}

/// Orders per status whose last update falls inside the recent window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecentCounts {
    pub pending: u64,
    pub processing: u64,
    pub ready_to_pickup: u64,
    pub completed: u64,
    pub cancelled: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardSummary {
    pub counts: StatusCounts,
    pub recent_updates: RecentCounts,
    /// Orders updated inside the window, most recent first.
    pub recent_orders: Vec<OrderWithDetails>,
    pub window_start: DateTime<Utc>,
}

/// Product columns exposed on the detail payload.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
    pub img_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailWithProduct {
    #[serde(flatten)]
    pub detail: OrderDetailModel,
    pub product: ProductSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderWithProducts {
    #[serde(flatten)]
    pub order: OrderModel,
    pub order_details: Vec<OrderDetailWithProduct>,
}

/// The reservation with its order tree and the order's status copied alongside.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationWithOrder {
    #[serde(flatten)]
    pub reservation: ReservationModel,
    pub order: OrderWithProducts,
    pub status: OrderStatus,
}

/// Display line for one ordered product, priced at the product's current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineItemSummary {
    pub product_name: String,
    /// e.g. "1,250.00"
    pub product_price: String,
    pub quantity: i32,
    pub subtotal: String,
    pub product_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReservationDetail {
    pub reservation: ReservationWithOrder,
    pub order_details: Vec<LineItemSummary>,
}

/// Staff-facing read queries over orders.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    app_url: String,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, app_url: impl Into<String>) -> Self {
        Self {
            db_pool,
            app_url: app_url.into(),
        }
    }

    fn newest_first(select: Select<OrderEntity>) -> Select<OrderEntity> {
        select
            .order_by_desc(order::Column::UpdatedAt)
            .order_by_desc(order::Column::Id)
    }

    /// One page of orders in `status`, most recently updated first.
    #[instrument(skip(self), fields(status = %status))]
    pub async fn list_by_status(
        &self,
        status: OrderStatus,
        page: u64,
    ) -> Result<PaginatedResponse<OrderModel>, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let paginator = Self::newest_first(
            OrderEntity::find().filter(order::Column::Status.eq(status)),
        )
        .paginate(db, LISTING_PAGE_SIZE);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;

        let Some(index) = page_index(page, LISTING_PAGE_SIZE, total) else {
            return Ok(PaginatedResponse::new(Vec::new(), page, LISTING_PAGE_SIZE, total));
        };

        let orders = paginator.fetch_page(index).await.map_err(|e| {
            error!(error = %e, page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(PaginatedResponse::new(orders, page, LISTING_PAGE_SIZE, total))
    }

    /// One page of every order with its reservation, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        page: u64,
    ) -> Result<PaginatedResponse<OrderWithReservation>, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let paginator = Self::newest_first(OrderEntity::find())
            .find_also_related(reservation::Entity)
            .paginate(db, LISTING_PAGE_SIZE);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;

        let Some(index) = page_index(page, LISTING_PAGE_SIZE, total) else {
            return Ok(PaginatedResponse::new(Vec::new(), page, LISTING_PAGE_SIZE, total));
        };

        let rows = paginator.fetch_page(index).await.map_err(|e| {
            error!(error = %e, page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        let items = rows
            .into_iter()
            .map(|(order, reservation)| OrderWithReservation { order, reservation })
            .collect();

        Ok(PaginatedResponse::new(items, page, LISTING_PAGE_SIZE, total))
    }

    async fn count_where(&self, select: Select<OrderEntity>) -> Result<u64, ServiceError> {
        select
            .count(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Status counts, recent-update counts and the recent feed as of `now`.
    #[instrument(skip(self))]
    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<DashboardSummary, ServiceError> {
        let db = &*self.db_pool;
        let window_start = now - Duration::hours(RECENT_WINDOW_HOURS);

        let current = try_join_all(OrderStatus::ALL.into_iter().map(|status| {
            self.count_where(OrderEntity::find().filter(order::Column::Status.eq(status)))
        }));
        let recent = try_join_all(OrderStatus::ALL.into_iter().map(|status| {
            self.count_where(
                OrderEntity::find()
                    .filter(order::Column::Status.eq(status))
                    .filter(order::Column::UpdatedAt.gte(window_start)),
            )
        }));
        let total = self.count_where(OrderEntity::find());

        let (current, recent, total) = futures::try_join!(current, recent, total).map_err(|e| {
            error!(error = %e, "Failed to compute dashboard counts");
            e
        })?;

        let mut counts = StatusCounts {
            total,
            ..Default::default()
        };
        let mut recent_updates = RecentCounts::default();
        for ((status, now_count), recent_count) in OrderStatus::ALL.into_iter().zip(current).zip(recent) {
            match status {
                OrderStatus::Pending => {
                    counts.pending = now_count;
                    recent_updates.pending = recent_count;
                }
                OrderStatus::Processing => {
                    counts.processing = now_count;
                    recent_updates.processing = recent_count;
                }
                OrderStatus::ReadyToPickup => {
                    counts.ready_to_pickup = now_count;
                    recent_updates.ready_to_pickup = recent_count;
                }
                OrderStatus::Completed => {
                    counts.completed = now_count;
                    recent_updates.completed = recent_count;
                }
                OrderStatus::Cancelled => {
                    counts.cancelled = now_count;
                    recent_updates.cancelled = recent_count;
                }
            }
        }

        let recent_orders = Self::newest_first(
            OrderEntity::find().filter(order::Column::UpdatedAt.gte(window_start)),
        )
        .all(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load recently updated orders");
            ServiceError::DatabaseError(e)
        })?;

        let details = recent_orders
            .load_many(order_detail::Entity, db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load order details for dashboard");
                ServiceError::DatabaseError(e)
            })?;

        let recent_orders = recent_orders
            .into_iter()
            .zip(details)
            .map(|(order, order_details)| OrderWithDetails {
                order,
                order_details,
            })
            .collect();

        Ok(DashboardSummary {
            counts,
            recent_updates,
            recent_orders,
            window_start,
        })
    }

    /// Reservation detail for `order_id` with priced line summaries.
    #[instrument(skip(self))]
    pub async fn reservation_detail(&self, order_id: i32) -> Result<ReservationDetail, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id, "Failed to load order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let reservation = order
            .find_related(reservation::Entity)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Reservation for order {} not found", order_id))
            })?;

        let details = order
            .find_related(order_detail::Entity)
            .order_by_asc(order_detail::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let product_ids: Vec<i32> = details.iter().map(|d| d.product_id).collect();
        let products: HashMap<i32, ProductSummary> = product::Entity::find()
            .select_only()
            .columns([
                product::Column::Id,
                product::Column::Name,
                product::Column::Price,
                product::Column::ImgPath,
            ])
            .filter(product::Column::Id.is_in(product_ids))
            .into_model::<ProductSummary>()
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut summaries = Vec::with_capacity(details.len());
        let mut lines = Vec::with_capacity(details.len());
        for detail in details {
            let product = products.get(&detail.product_id).cloned().ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", detail.product_id))
            })?;
            summaries.push(self.summarize_line(&product, detail.quantity));
            lines.push(OrderDetailWithProduct { detail, product });
        }

        info!(order_id, lines = lines.len(), "Loaded reservation detail");

        let status = order.status;
        Ok(ReservationDetail {
            reservation: ReservationWithOrder {
                reservation,
                order: OrderWithProducts {
                    order,
                    order_details: lines,
                },
                status,
            },
            order_details: summaries,
        })
    }

    fn summarize_line(&self, product: &ProductSummary, quantity: i32) -> LineItemSummary {
        LineItemSummary {
            product_name: product.name.clone(),
            product_price: format_money(product.price),
            quantity,
            subtotal: format_money(product.price * Decimal::from(quantity)),
            product_image: asset_url(&self.app_url, product.img_path.as_deref()),
        }
    }
}
