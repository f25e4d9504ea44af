pub mod commerce;
pub mod coupon;
pub mod order;
pub mod order_item;
