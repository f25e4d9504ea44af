use crate::{
    entities::commerce::product::{self, Entity as Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Stock view of one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub product_id: String,
    pub stock: i32,
    pub orders: i32,
    pub out_of_stock: bool,
}

/// Maintains the per-product running `orders` counter.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds `quantity` to one product's counter with an in-database increment.
    pub async fn increment_orders(
        &self,
        product_id: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        increment_on(&*self.db, product_id, quantity).await
    }

    /// Increments every purchased product's counter in one transaction.
    ///
    /// Quantities for the same product are summed first. An unknown product
    /// aborts the whole batch.
    #[instrument(skip(self, lines))]
    pub async fn increment_for_order(
        &self,
        checkout_id: &str,
        lines: &[(String, i32)],
    ) -> Result<usize, ServiceError> {
        let mut per_product: BTreeMap<&str, i32> = BTreeMap::new();
        for (product_id, quantity) in lines {
            *per_product.entry(product_id.as_str()).or_default() += *quantity;
        }

        let txn = self.db.begin().await?;
        for (product_id, quantity) in &per_product {
            increment_on(&txn, product_id, *quantity).await?;
        }
        txn.commit().await?;

        let products = per_product.len();
        self.event_sender
            .send_or_log(Event::InventoryIncremented {
                checkout_id: checkout_id.to_string(),
                products,
            })
            .await;
        info!(%checkout_id, products, "Incremented order counters");
        Ok(products)
    }

    pub async fn stock_level(&self, product_id: &str) -> Result<StockLevel, ServiceError> {
        let product = Product::find_by_id(product_id.to_string())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(StockLevel {
            out_of_stock: product.is_out_of_stock(),
            product_id: product.id,
            stock: product.stock,
            orders: product.orders,
        })
    }
}

async fn increment_on<C: ConnectionTrait>(
    conn: &C,
    product_id: &str,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Quantity for product {} must be positive",
            product_id
        )));
    }

    let result = Product::update_many()
        .col_expr(
            product::Column::Orders,
            Expr::col(product::Column::Orders).add(quantity),
        )
        .col_expr(
            product::Column::UpdatedAt,
            Expr::value(chrono::Utc::now()),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::NotFound(format!(
            "Product {} not found",
            product_id
        )));
    }
    Ok(())
}
