pub mod commerce;
pub mod common;
pub mod coupons;
pub mod health;
pub mod payments;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        commerce::{CartService, CheckoutService, CheckoutSettings},
        coupons::CouponService,
        inventory::InventoryService,
        orders::OrderService,
        payments::PaymentGateway,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub coupons: Arc<CouponService>,
    pub carts: Arc<CartService>,
    pub inventory: Arc<InventoryService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        let coupons = CouponService::new(db_pool.clone(), event_sender.clone());
        let carts = CartService::new(db_pool.clone(), event_sender.clone());
        let inventory = InventoryService::new(db_pool.clone(), event_sender.clone());
        let orders = OrderService::new(
            db_pool,
            event_sender.clone(),
            carts.clone(),
            inventory.clone(),
        );
        let checkout = CheckoutService::new(
            carts.clone(),
            coupons.clone(),
            orders.clone(),
            gateway,
            event_sender,
            settings,
        );

        Self {
            coupons: Arc::new(coupons),
            carts: Arc::new(carts),
            inventory: Arc::new(inventory),
            orders: Arc::new(orders),
            checkout: Arc::new(checkout),
        }
    }
}
