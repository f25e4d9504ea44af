use crate::{
    entities::{
        order::{self, Entity as Order, Model as OrderModel, OrderStatus, PaymentMode},
        order_item::{self, Entity as OrderItem, Model as OrderItemModel},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::{
            cart_service::CartService,
            pricing_service::{to_minor_units, CouponTerms, OrderTotals, PricedLine},
        },
        inventory::InventoryService,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Shipping address captured at checkout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    #[validate(custom = "not_blank")]
    pub full_name: String,
    #[validate(custom = "not_blank", length(max = 32))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(custom = "not_blank")]
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[validate(length(max = 2000))]
    pub order_note: Option<String>,
}

fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("required"));
    }
    Ok(())
}

/// Coupon recorded on an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub terms: CouponTerms,
}

/// Everything needed to write an order row and its lines
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub checkout_id: String,
    pub user_id: String,
    pub payment_mode: PaymentMode,
    pub address: ShippingAddress,
    pub coupon: Option<AppliedCoupon>,
    pub lines: Vec<PricedLine>,
    pub totals: OrderTotals,
    pub gateway_order_id: Option<String>,
}

/// What happened to the writes that follow a newly paid order.
///
/// These run after the order commits; a failure here is reported, not rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpReport {
    pub cart_lines_removed: u64,
    pub inventory_incremented: usize,
    pub errors: Vec<String>,
}

impl FollowUpReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeOutcome {
    /// False when the order was already paid (duplicate callback or reload)
    pub created: bool,
    pub order: OrderView,
    pub follow_up: FollowUpReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineView {
    pub product_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub payment_mode: PaymentMode,
    pub address: ShippingAddress,
    pub coupon_code: Option<String>,
    pub coupon_kind: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub coupon_value: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub currency: String,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub items: Vec<OrderLineView>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl OrderView {
    pub fn from_parts(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        let items = items
            .into_iter()
            .map(|item| OrderLineView {
                line_total: item.line_total(),
                product_id: item.product_id,
                name: item.name,
                image_url: item.image_url,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Self {
            address: ShippingAddress {
                full_name: order.full_name,
                phone: order.phone,
                email: order.email,
                address_line1: order.address_line1,
                address_line2: order.address_line2,
                postal_code: order.postal_code,
                city: order.city,
                state: order.state,
                order_note: order.order_note,
            },
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            payment_mode: order.payment_mode,
            coupon_code: order.coupon_code,
            coupon_kind: order.coupon_kind,
            coupon_value: order.coupon_value,
            subtotal: order.subtotal,
            discount: order.discount,
            total: order.total,
            currency: order.currency,
            gateway_order_id: order.gateway_order_id,
            gateway_payment_id: order.gateway_payment_id,
            items,
            created_at: order.created_at,
            paid_at: order.paid_at,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }

    pub fn product_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product_id.clone()).collect()
    }
}

/// The order writer: persists checkout records and finalizes them exactly once.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    carts: CartService,
    inventory: InventoryService,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        carts: CartService,
        inventory: InventoryService,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
            inventory,
        }
    }

    /// Writes a `pending` order with its lines in one transaction.
    #[instrument(skip(self, new_order), fields(checkout_id = %new_order.checkout_id))]
    pub async fn write_pending(&self, new_order: &NewOrder) -> Result<OrderView, ServiceError> {
        let txn = self.db.begin().await?;
        let (order, items) = insert_order(&txn, new_order, OrderStatus::Pending)
            .await
            .map_err(|e| conflict_on_duplicate(e, &new_order.checkout_id))?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                checkout_id: order.id.clone(),
                user_id: order.user_id.clone(),
                payment_mode: payment_mode_str(order.payment_mode).to_string(),
                total: order.total,
            })
            .await;
        info!(checkout_id = %order.id, "Pending order written");
        Ok(OrderView::from_parts(order, items))
    }

    /// Stores the gateway payment id and signature on a pending order.
    ///
    /// Paid orders are left untouched.
    #[instrument(skip(self, signature))]
    pub async fn record_payment(
        &self,
        checkout_id: &str,
        payment_id: &str,
        signature: Option<&str>,
    ) -> Result<OrderView, ServiceError> {
        let result = Order::update_many()
            .set(order::ActiveModel {
                gateway_payment_id: Set(Some(payment_id.to_string())),
                gateway_signature: Set(signature.map(str::to_string)),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(checkout_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            info!(%checkout_id, "Payment not recorded; order is missing or already paid");
        }
        self.require(checkout_id).await
    }

    /// Marks a checkout paid exactly once.
    ///
    /// An existing `paid` row yields `created = false` and nothing else is
    /// written. A missing row is inserted from `payload`. A `pending` row is
    /// flipped to `paid` and stays authoritative: it holds the lines and
    /// totals the gateway charged, so a `payload` may accompany it only when
    /// it names the same buyer, payment mode and amount. Only the call that
    /// performed the transition runs the cart and inventory follow-ups.
    #[instrument(skip(self, payload))]
    pub async fn finalize(
        &self,
        checkout_id: &str,
        payload: Option<&NewOrder>,
    ) -> Result<FinalizeOutcome, ServiceError> {
        if let Some(p) = payload {
            if p.checkout_id != checkout_id {
                return Err(ServiceError::ValidationError(
                    "Order payload does not match checkout id".into(),
                ));
            }
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        // Write before reading so concurrent finalizers queue on the row or
        // database write lock instead of acting on the same stale read.
        let flipped = Order::update_many()
            .set(order::ActiveModel {
                status: Set(OrderStatus::Paid),
                paid_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(checkout_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::PaymentMode.eq(PaymentMode::Prepaid))
            .exec(&txn)
            .await?
            .rows_affected
            == 1;
        let existing = Order::find_by_id(checkout_id.to_string()).one(&txn).await?;

        let created = match existing {
            Some(order) if flipped => {
                if let Some(reason) = payload.and_then(|p| payload_mismatch(&order, p)) {
                    return Err(ServiceError::ValidationError(format!(
                        "Order payload disagrees with pending order {}: {}",
                        checkout_id, reason
                    )));
                }
                true
            }
            Some(order) if order.is_paid() => false,
            Some(_) => {
                return Err(ServiceError::InvalidOperation(
                    "Cash-on-delivery orders are not finalized by payment".into(),
                ));
            }
            None => {
                let payload = payload.ok_or_else(|| {
                    ServiceError::NotFound(format!("Order {} not found", checkout_id))
                })?;
                if payload.payment_mode == PaymentMode::Cod {
                    return Err(ServiceError::InvalidOperation(
                        "Cash-on-delivery orders are not finalized by payment".into(),
                    ));
                }
                let inserted = insert_order(&txn, payload, OrderStatus::Paid).await;
                match inserted {
                    Ok(_) => true,
                    Err(ServiceError::PersistenceError(e))
                        if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                    {
                        warn!(%checkout_id, "Concurrent finalize inserted the order first");
                        drop(txn);
                        let view = self.require(checkout_id).await?;
                        return Ok(FinalizeOutcome {
                            created: false,
                            order: view,
                            follow_up: FollowUpReport::default(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        };
        txn.commit().await?;

        let view = self.require(checkout_id).await?;
        if !created {
            info!(%checkout_id, "Order already paid; finalize is a no-op");
            return Ok(FinalizeOutcome {
                created,
                order: view,
                follow_up: FollowUpReport::default(),
            });
        }

        self.event_sender
            .send_or_log(Event::OrderFinalized {
                checkout_id: view.id.clone(),
                user_id: view.user_id.clone(),
                paid_at: view.paid_at.unwrap_or(now),
            })
            .await;
        info!(%checkout_id, "Order finalized");

        let follow_up = self.run_follow_ups(&view).await;
        Ok(FinalizeOutcome {
            created,
            order: view,
            follow_up,
        })
    }

    /// Removes the purchased products from the buyer's cart and bumps their
    /// order counters. Each step is independent; failures are collected.
    pub async fn run_follow_ups(&self, order: &OrderView) -> FollowUpReport {
        let mut report = FollowUpReport::default();

        match self
            .carts
            .remove_purchased(&order.user_id, &order.product_ids())
            .await
        {
            Ok(removed) => report.cart_lines_removed = removed,
            Err(e) => self.follow_up_failed(&mut report, &order.id, "cart", e).await,
        }

        let lines: Vec<(String, i32)> = order
            .items
            .iter()
            .map(|i| (i.product_id.clone(), i.quantity))
            .collect();
        match self.inventory.increment_for_order(&order.id, &lines).await {
            Ok(products) => report.inventory_incremented = products,
            Err(e) => {
                self.follow_up_failed(&mut report, &order.id, "inventory", e)
                    .await
            }
        }

        report
    }

    async fn follow_up_failed(
        &self,
        report: &mut FollowUpReport,
        checkout_id: &str,
        step: &str,
        err: ServiceError,
    ) {
        error!(%checkout_id, %step, error = %err, "Order follow-up failed");
        report.errors.push(format!("{}: {}", step, err));
        self.event_sender
            .send_or_log(Event::FollowUpFailed {
                checkout_id: checkout_id.to_string(),
                step: step.to_string(),
                error: err.to_string(),
            })
            .await;
    }

    pub async fn find(&self, checkout_id: &str) -> Result<Option<OrderView>, ServiceError> {
        let found = Order::find_by_id(checkout_id.to_string())
            .find_with_related(OrderItem)
            .all(&*self.db)
            .await?;
        Ok(found
            .into_iter()
            .next()
            .map(|(order, items)| OrderView::from_parts(order, items)))
    }

    async fn require(&self, checkout_id: &str) -> Result<OrderView, ServiceError> {
        self.find(checkout_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", checkout_id)))
    }

    /// One of the caller's orders; other users' orders are reported as missing.
    pub async fn get_order(&self, user_id: &str, checkout_id: &str) -> Result<OrderView, ServiceError> {
        let order = self.require(checkout_id).await?;
        if order.user_id != user_id {
            return Err(ServiceError::NotFound(format!(
                "Order {} not found",
                checkout_id
            )));
        }
        Ok(order)
    }

    /// Order history, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, user_id: &str) -> Result<Vec<OrderView>, ServiceError> {
        let rows = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .find_with_related(OrderItem)
            .all(&*self.db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(order, items)| OrderView::from_parts(order, items))
            .collect())
    }
}

/// First field where a finalize payload contradicts the stored pending order.
fn payload_mismatch(order: &OrderModel, payload: &NewOrder) -> Option<&'static str> {
    if order.user_id != payload.user_id {
        return Some("user");
    }
    if order.payment_mode != payload.payment_mode {
        return Some("payment mode");
    }
    if order.currency != payload.totals.currency
        || to_minor_units(order.total).ok() != Some(payload.totals.amount_minor)
    {
        return Some("amount");
    }
    None
}

pub fn payment_mode_str(mode: PaymentMode) -> &'static str {
    match mode {
        PaymentMode::Prepaid => "prepaid",
        PaymentMode::Cod => "cod",
    }
}

fn conflict_on_duplicate(err: ServiceError, checkout_id: &str) -> ServiceError {
    match err {
        ServiceError::PersistenceError(e)
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
        {
            ServiceError::Conflict(format!("Order {} already exists", checkout_id))
        }
        other => other,
    }
}

async fn insert_order(
    txn: &DatabaseTransaction,
    new_order: &NewOrder,
    status: OrderStatus,
) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
    if new_order.lines.is_empty() {
        return Err(ServiceError::ValidationError("Order has no lines".into()));
    }

    let now = Utc::now();
    let address = &new_order.address;
    let coupon = new_order.coupon.as_ref();
    let order = order::ActiveModel {
        id: Set(new_order.checkout_id.clone()),
        user_id: Set(new_order.user_id.clone()),
        status: Set(status),
        payment_mode: Set(new_order.payment_mode),
        full_name: Set(address.full_name.trim().to_string()),
        phone: Set(address.phone.trim().to_string()),
        email: Set(address.email.clone()),
        address_line1: Set(address.address_line1.trim().to_string()),
        address_line2: Set(address.address_line2.clone()),
        postal_code: Set(address.postal_code.clone()),
        city: Set(address.city.clone()),
        state: Set(address.state.clone()),
        order_note: Set(address.order_note.clone()),
        coupon_code: Set(coupon.map(|c| c.code.clone())),
        coupon_kind: Set(coupon.map(|c| c.terms.kind.as_str().to_string())),
        coupon_value: Set(coupon.map(|c| c.terms.value)),
        subtotal: Set(new_order.totals.subtotal),
        discount: Set(new_order.totals.discount),
        total: Set(new_order.totals.total),
        currency: Set(new_order.totals.currency.clone()),
        gateway_order_id: Set(new_order.gateway_order_id.clone()),
        gateway_payment_id: Set(None),
        gateway_signature: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        paid_at: Set((status == OrderStatus::Paid).then_some(now)),
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(new_order.lines.len());
    for line in &new_order.lines {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id.clone()),
            product_id: Set(line.product_id.clone()),
            name: Set(line.name.clone()),
            image_url: Set(line.image_url.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
        }
        .insert(txn)
        .await?;
        items.push(item);
    }

    Ok((order, items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            address_line1: "12 MG Road".into(),
            ..Default::default()
        }
    }

    #[test]
    fn address_requires_name_phone_and_first_line() {
        assert!(address().validate().is_ok());

        for broken in [
            ShippingAddress {
                full_name: "  ".into(),
                ..address()
            },
            ShippingAddress {
                phone: String::new(),
                ..address()
            },
            ShippingAddress {
                address_line1: String::new(),
                ..address()
            },
        ] {
            assert!(broken.validate().is_err());
        }
    }

    #[test]
    fn malformed_email_is_rejected() {
        let addr = ShippingAddress {
            email: Some("not-an-email".into()),
            ..address()
        };
        assert!(addr.validate().is_err());
    }

    #[test]
    fn view_sums_lines() {
        let now = Utc::now();
        let order = OrderModel {
            id: "order_1".into(),
            user_id: "uid-1".into(),
            status: OrderStatus::Pending,
            payment_mode: PaymentMode::Prepaid,
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            email: None,
            address_line1: "12 MG Road".into(),
            address_line2: None,
            postal_code: None,
            city: None,
            state: None,
            order_note: None,
            coupon_code: None,
            coupon_kind: None,
            coupon_value: None,
            subtotal: dec!(1000),
            discount: dec!(0),
            total: dec!(1000),
            currency: "INR".into(),
            gateway_order_id: Some("order_1".into()),
            gateway_payment_id: None,
            gateway_signature: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        let items = vec![OrderItemModel {
            id: Uuid::new_v4(),
            order_id: "order_1".into(),
            product_id: "A".into(),
            name: "Mug".into(),
            image_url: None,
            quantity: 2,
            unit_price: dec!(500),
        }];

        let view = OrderView::from_parts(order, items);
        assert_eq!(view.items[0].line_total, dec!(1000));
        assert_eq!(view.product_ids(), vec!["A".to_string()]);
        assert!(!view.is_paid());
        assert_eq!(view.address.full_name, "Asha Rao");
    }
}
