pub use factory::*;
pub use pool::*;
pub use worker::*;

mod factory;
mod pool;
mod worker;

use crate::error::BridgeResult;
use std::sync::Arc;

/// Source of workers for a broker consumer, and the sink workers report
/// back to when a dispatch ends.
pub trait SessionPool: Send + Sync {
    fn server_session(&self) -> BridgeResult<Arc<DispatchWorker>>;

    fn release(&self, worker: &Arc<DispatchWorker>);

    fn invalidate(&self, worker: &Arc<DispatchWorker>);
}
