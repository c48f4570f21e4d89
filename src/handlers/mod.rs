pub mod cart;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod payments;

pub use cart::carts_routes;
pub use checkout::checkout_routes;
pub use orders::orders_routes;
pub use payments::payments_routes;
