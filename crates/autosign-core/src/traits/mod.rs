//! Capability traits the engines depend on.
//!
//! Each integration point is a narrow contract with one implementation per
//! backend; engines never see a concrete database or HTTP client.

pub mod emitter;
pub mod interval;
pub mod queue;
pub mod relay;
pub mod rpc;
pub mod safety;
pub mod store;

pub use emitter::Emitter;
pub use interval::IntervalStrategy;
pub use queue::{EnqueueOptions, TASK_TYPE_KEYSIGN, TASK_TYPE_SCHEDULER, Task, TaskInfo, TaskQueue};
pub use relay::Relay;
pub use rpc::RpcAdapter;
pub use safety::SafetyGate;
pub use store::{PolicyStore, SchedulerStore, StoreTx, Transactional, TxIndexerStore, TxStream};
