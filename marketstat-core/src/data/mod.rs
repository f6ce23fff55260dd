//! Fetching and caching.

pub mod cache;
pub mod fetcher;
pub mod session;
pub mod transport;

pub use cache::{CacheError, SourceCache};
pub use fetcher::{Fetch, FetchError, ResilientFetcher, RetryPolicy};
pub use session::{ReqwestSession, ReqwestSessionFactory, SessionProfile, DEFAULT_USER_AGENT};
pub use transport::{HttpResponse, HttpSession, SessionFactory, TransportError};
