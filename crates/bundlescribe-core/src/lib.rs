//! Bundlescribe Core - shared infrastructure for the crawl and dataset stages
//!
//! Logging, progress display, shutdown signalling, the single-permit gate
//! used to serialize inference calls, and the shared HTTP runtime.

pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod semaphore;
pub mod shutdown;

// Re-exports for convenience
pub use http::{SHARED_RUNTIME, http_client};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{RetryPolicy, retry_with_delay};
pub use semaphore::{Semaphore, SemaphoreGuard};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag, sleep_unless_shutdown};
