/// Commerce handlers - checkout, order history and the stored cart
pub mod carts;
pub mod checkout;
pub mod orders;

pub use carts::carts_routes;
pub use checkout::checkout_routes;
pub use orders::orders_routes;
