//! Runtime helpers shared by the engines.

pub mod clock;
pub mod locked;
pub mod polling;
pub mod shutdown;
pub mod stream;

pub use clock::{Clock, ManualClock, SystemClock};
pub use locked::Locked;
pub use polling::{LoopConfig, run_polling_loop};
pub use shutdown::{spawn_signal_listener, wait_for_signal};
pub use stream::{Sink, produce, pump};
