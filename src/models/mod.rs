pub mod dispatch;
pub mod driver;
pub mod events;
pub mod identity;
pub mod order;
