pub mod dispatch;
mod worker;

pub use dispatch::DispatchEngine;
