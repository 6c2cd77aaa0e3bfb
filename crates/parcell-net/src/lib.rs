pub mod navigation;
pub mod scheduler;
pub mod status;
pub mod surface;
pub mod transport;
pub mod url;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use navigation::{require_project, return_project};
pub use scheduler::RequestScheduler;
pub use status::StatusAggregator;
pub use surface::{FanoutSurface, LogSurface};
pub use transport::HttpTransport;
pub use url::{build_url, encode_args};

/// Lock a table that is never left half-updated, so poisoning carries no
/// information worth propagating.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
