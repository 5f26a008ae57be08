#![forbid(unsafe_code)]

pub mod error;
pub mod gate;
pub mod ledger;
pub mod model;
pub mod placement;
pub mod report;
pub mod routing;
pub mod snapshot;
pub mod time;

pub use error::Error;
pub use time::Clock;
