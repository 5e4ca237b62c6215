//! Transfer engine abstraction.
//!
//! The catalog never moves bytes itself. It hands descriptors to a
//! [`TransferEngine`] and observes the resulting [`TransferHandle`].

mod librqbit;
mod types;

pub use self::librqbit::LibrqbitEngine;
pub use types::*;
