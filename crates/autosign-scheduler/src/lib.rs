//! # Autosign Scheduler
//!
//! Turns due schedule rows into task-queue work.
//!
//! ```text
//! tokio interval (30s)
//!   └── get_pending(now)
//!         └── per row, concurrently:
//!               policy ──► safety gate ──► next run ──► enqueue "scheduler:policy"
//!                                                        ├── next = Some → set_next
//!                                                        └── next = None → delete schedule + deactivate policy
//! ```

pub mod interval;
pub mod worker;

pub use interval::{FrequencyInterval, Frequency};
pub use worker::{SchedulerGauges, SchedulerOptions, SchedulerWorker};
