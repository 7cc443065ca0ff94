pub mod batch;
pub mod envelope;
pub mod hooks;
pub mod registry;
pub mod service;
pub mod translate;

pub use batch::{run_batch, BatchOutcome, BatchState, TxScope, WriteOp};
pub use hooks::{Hook, HookBinding, HookReturn, HookSet, HookShape, Operation};
pub use registry::{describe, hook_set};
pub use service::CrudService;
pub use translate::{address_predicate, translate};
