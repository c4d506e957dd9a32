pub mod client;
pub mod error;
pub mod parse;
pub mod rate_limit;
pub mod types;
pub mod user_agents;

pub use client::SerpClient;
pub use error::SerpError;
pub use parse::{parse_with_fallback, ParseStrategy};
pub use rate_limit::{RateLimiter, SurfaceLimiters, MAX_RETRY_AFTER_SECS};
pub use types::{SerpQuery, SerpResult};
pub use user_agents::UserAgentPool;
