use crate::{
    entities::commerce::{
        cart_item::{self, Entity as CartItem},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::commerce::pricing_service::PricedLine,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, ModelTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service for the per-user stored cart.
///
/// A cart is the set of `cart_items` rows owned by one user, at most one row
/// per product. Besides the usual view/update operations this service is the
/// cart reconciler: after an order is paid it removes every purchased product
/// from the buyer's cart.
///
/// # Examples
///
/// ```ignore
/// let carts = CartService::new(db, event_sender);
/// carts.set_item("uid-1", SetCartItemInput { product_id: "p1".into(), quantity: 2 }).await?;
/// let removed = carts.remove_purchased("uid-1", &["p1".to_string()]).await?;
/// ```
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for setting the quantity of one cart line
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetCartItemInput {
    #[validate(length(min = 1, max = 64))]
    pub product_id: String,
    /// Zero removes the line
    #[validate(range(min = 0, max = 1000))]
    pub quantity: i32,
}

/// One cart line joined with its product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLineView {
    pub product_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
    pub out_of_stock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub user_id: String,
    pub lines: Vec<CartLineView>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart with current catalog prices.
    ///
    /// Lines pointing at products that no longer exist are skipped.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: &str) -> Result<CartView, ServiceError> {
        let rows = self.load_lines(user_id).await?;

        let lines: Vec<CartLineView> = rows
            .into_iter()
            .filter_map(|(item, product)| match product {
                Some(product) => Some(line_view(&item, &product)),
                None => {
                    warn!(%user_id, product_id = %item.product_id, "Cart line references missing product");
                    None
                }
            })
            .collect();

        let subtotal = lines.iter().map(|l| l.line_total).sum();
        Ok(CartView {
            user_id: user_id.to_string(),
            lines,
            subtotal,
        })
    }

    /// Sets one line's quantity, inserting or removing the row as needed.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn set_item(
        &self,
        user_id: &str,
        input: SetCartItemInput,
    ) -> Result<CartView, ServiceError> {
        input.validate()?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(input.product_id.as_str()))
            .one(&*self.db)
            .await?;

        match (existing, input.quantity) {
            (Some(item), 0) => {
                item.delete(&*self.db).await?;
            }
            (None, 0) => {}
            (Some(item), quantity) => {
                let mut active = item.into_active_model();
                active.quantity = Set(quantity);
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
            }
            (None, quantity) => {
                Product::find_by_id(input.product_id.clone())
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", input.product_id))
                    })?;

                let now = Utc::now();
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id.to_string()),
                    product_id: Set(input.product_id.clone()),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        self.get_cart(user_id).await
    }

    /// The user's cart priced for checkout. Missing products fail validation.
    pub async fn priced_lines(&self, user_id: &str) -> Result<Vec<PricedLine>, ServiceError> {
        let rows = self.load_lines(user_id).await?;
        rows.into_iter()
            .map(|(item, product)| {
                let product = product.ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product {} is no longer available",
                        item.product_id
                    ))
                })?;
                Ok(PricedLine {
                    product_id: product.id.clone(),
                    name: product.title.clone(),
                    image_url: product.image_url.clone(),
                    quantity: item.quantity,
                    unit_price: product.unit_price(),
                })
            })
            .collect()
    }

    /// Removes every line whose product was purchased; returns how many rows went.
    #[instrument(skip(self, product_ids))]
    pub async fn remove_purchased(
        &self,
        user_id: &str,
        product_ids: &[String],
    ) -> Result<u64, ServiceError> {
        if product_ids.is_empty() {
            return Ok(0);
        }

        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.is_in(product_ids.iter().cloned()))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartReconciled {
                user_id: user_id.to_string(),
                lines_removed: result.rows_affected,
            })
            .await;
        info!(%user_id, removed = result.rows_affected, "Removed purchased lines from cart");
        Ok(result.rows_affected)
    }

    async fn load_lines(
        &self,
        user_id: &str,
    ) -> Result<Vec<(cart_item::Model, Option<product::Model>)>, ServiceError> {
        Ok(CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?)
    }
}

fn line_view(item: &cart_item::Model, product: &product::Model) -> CartLineView {
    let priced = PricedLine {
        product_id: product.id.clone(),
        name: product.title.clone(),
        image_url: product.image_url.clone(),
        quantity: item.quantity,
        unit_price: product.unit_price(),
    };
    CartLineView {
        line_total: priced.line_total(),
        product_id: priced.product_id,
        name: priced.name,
        image_url: priced.image_url,
        quantity: priced.quantity,
        unit_price: priced.unit_price,
        out_of_stock: product.is_out_of_stock(),
    }
}
