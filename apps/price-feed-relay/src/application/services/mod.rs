//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ingest`: applies feed events to the price cache
//! - `registrar`: registers the record schema with the ledger
//! - `scheduler`: periodic snapshot, encode and submit loop
//! - `clock`: wall-clock source for timestamps and record ids

pub mod clock;
pub mod ingest;
pub mod registrar;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ingest::{FeedState, apply_event, run_ingest};
pub use registrar::{RegistrationError, RegistrationOutcome, SchemaRegistrar};
pub use scheduler::{
    PublishCycleOutcome, PublishError, PublishScheduler, PublishStats, PublishedRecord,
    SchedulerConfig,
};
