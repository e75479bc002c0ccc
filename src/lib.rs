pub mod amount;
pub mod csv;
pub mod engine;
pub mod model;

pub use amount::Amount;
pub use engine::{Marketplace, run_expiry_sweep};
pub use model::{
    DisputeOutcome, Event, ResponseId, ReviewId, TaskId, TaskStatus, TxId, UserId,
};
