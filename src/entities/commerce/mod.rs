pub mod cart_item;
pub mod product;

pub use cart_item::Entity as CartItem;
pub use product::Entity as Product;
