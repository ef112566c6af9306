//! Company-page scraping
//!
//! Key components:
//! - `FetchEngine`: HTTP GET with rotating user agents and classified errors
//! - `RetryPolicy`: bounded, jittered retries of transient failures
//! - `JobExtractor`: HTML to raw jobs through a fallback chain of strategies
//! - `validator`: raw jobs to typed [`JobRecord`](crate::types::JobRecord)s
//! - `ScrapeCoordinator`: feeder plus worker pool draining the company queue

pub mod coordinator;
pub mod extractor;
pub mod fetcher;
pub mod retry;
pub mod validator;

pub use coordinator::{CoordinatorConfig, ScrapeCoordinator, ScrapeStats};
pub use extractor::JobExtractor;
pub use fetcher::{FetchConfig, FetchEngine, FetchError, PageFetcher};
pub use retry::{RetryError, RetryPolicy, Transient};
pub use validator::{validate, InvalidJob, ValidationError};
