use crate::{
    db::DbPool,
    entities::{inventory, product},
    errors::ServiceError,
    services::format::asset_url,
    page_index, PaginatedResponse,
};
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, PaginatorTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

/// Products shown per reservation-form page.
pub const CATALOG_PAGE_SIZE: u64 = 9;

/// A product as offered on the reservation form.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CatalogItem {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
    pub img_path: Option<String>,
    pub image_url: Option<String>,
    /// Stock on hand; `None` when no inventory row exists.
    pub inventory_quantity: Option<i32>,
}

/// Read-only catalog queries backing the reservation form.
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    app_url: String,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, app_url: impl Into<String>) -> Self {
        Self {
            db_pool,
            app_url: app_url.into(),
        }
    }

    /// One page of the catalog with inventory, ordered by product id.
    #[instrument(skip(self))]
    pub async fn catalog_page(&self, page: u64) -> Result<PaginatedResponse<CatalogItem>, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let paginator = product::Entity::find()
            .find_also_related(inventory::Entity)
            .order_by_asc(product::Column::Id)
            .paginate(db, CATALOG_PAGE_SIZE);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count catalog products");
            ServiceError::DatabaseError(e)
        })?;

        let Some(index) = page_index(page, CATALOG_PAGE_SIZE, total) else {
            return Ok(PaginatedResponse::new(Vec::new(), page, CATALOG_PAGE_SIZE, total));
        };

        let rows = paginator.fetch_page(index).await.map_err(|e| {
            error!(error = %e, page, "Failed to fetch catalog page");
            ServiceError::DatabaseError(e)
        })?;

        let items = rows
            .into_iter()
            .map(|(product, stock)| CatalogItem {
                image_url: asset_url(&self.app_url, product.img_path.as_deref()),
                id: product.id,
                name: product.name,
                price: product.price,
                img_path: product.img_path,
                inventory_quantity: stock.map(|s| s.quantity),
            })
            .collect();

        Ok(PaginatedResponse::new(items, page, CATALOG_PAGE_SIZE, total))
    }
}
