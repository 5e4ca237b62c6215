//! Change feed.
//!
//! Catalog transitions become [`Change`] values and are fanned out to any
//! number of subscribers through the [`EventBus`].

mod bus;
mod types;

pub use bus::{EventBus, Subscription};
pub use types::{Change, ChangeKind};
