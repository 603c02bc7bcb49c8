pub mod inventory;
pub mod order;
pub mod order_detail;
pub mod product;
pub mod reservation;
pub mod setting;

pub use order::OrderStatus;
