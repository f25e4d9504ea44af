// Coupon ledger and payment gateway
pub mod coupons;
pub mod payments;

// Orders and their follow-up writes
pub mod inventory;
pub mod orders;

// Cart, pricing and checkout
pub mod commerce;
