//! Identity-provider login.
//!
//! ## Flow
//! 1. Load the login form and scrape its anti-forgery fields
//! 2. Fetch the captcha bound to that form's cookies
//! 3. Submit the encrypted password with a solver guess or the caller's code
//! 4. Follow the ticket redirects into the application portal
//! 5. Persist the cookie jar as an opaque session token

mod choreographer;
pub mod markup;
mod rate_limit;
mod retry;
mod solver;

pub use choreographer::{LoginChoreographer, LoginOutcome, LoginRequest, ManualCode, token_prefix};
pub use retry::RetryPolicy;
pub use solver::{CaptchaSolver, HttpCaptchaSolver};
