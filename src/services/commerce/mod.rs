/// Commerce services module - cart, pricing and checkout
pub mod cart_service;
pub mod checkout_service;
pub mod pricing_service;

// Re-export services for convenience
pub use cart_service::{CartService, CartView, SetCartItemInput};
pub use checkout_service::{CheckoutFlow, CheckoutService, CheckoutSettings, CheckoutStep};
pub use pricing_service::{CouponTerms, DiscountKind, OrderTotals, PricedLine};
