pub mod connection;
pub mod feed;
pub mod subscription;

pub use feed::ChangeFeed;
pub use subscription::{SubscriptionError, SubscriptionHandle, SubscriptionManager};
