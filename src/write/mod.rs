//! Write strategies layered on a [`crate::adapter::CacheAdapter`]
//!
//! - [`WriteThrough`]: origin first, then cache; origin failures propagate
//! - [`WriteBehind`]: cache first, origin later from an in-process queue

pub mod behind;
pub mod queue;
pub mod through;

pub use behind::{FlushReport, FlusherHandle, WriteBehind, WriteBehindStats};
pub use queue::{PendingWrite, PendingWriteState, WriteQueue};
pub use through::WriteThrough;

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

/// Origin write of a write-behind entry
///
/// Invoked once per attempt, so it must be callable repeatedly.
pub type WriteFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`WriteFn`]
///
/// ```
/// use ouroboros_cache::write::write_fn;
///
/// let write = write_fn(|| async {
///     // UPDATE products SET ...
///     Ok(())
/// });
/// # let _ = write;
/// ```
pub fn write_fn<F, Fut>(f: F) -> WriteFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}
