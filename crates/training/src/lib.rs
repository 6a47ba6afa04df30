//! Training lifecycle: scheduled, lock-serialized subprocess training with
//! status files, stale-lock reclamation, model validation, and atomic
//! swap-in.
//!
//! [`scheduler`] is the long-lived background task the server runs;
//! [`subprocess`] is what the `guardian train` subcommand actually executes
//! inside the spawned child process.

pub mod error;
pub mod global_lock;
pub mod lock;
pub mod scheduler;
pub mod status;
pub mod subprocess;
pub mod trainers;

pub use error::TrainingError;
pub use global_lock::GlobalLock;
pub use scheduler::TrainerBinary;
pub use status::{Status, TrainStatus};
