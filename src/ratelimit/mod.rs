//! Rate limiting logic and state management.

mod counter;
mod identifier;
mod limiter;

pub use counter::{RateLimitDecision, RateLimitRecord};
pub use identifier::{client_identifier, CONNECTING_IP, FORWARDED_FOR, UNKNOWN_CLIENT};
pub use limiter::RateLimiter;
