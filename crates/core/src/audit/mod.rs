mod events;
mod journal;
mod sqlite;
mod store;

pub use events::*;
pub use journal::*;
pub use sqlite::*;
pub use store::*;
