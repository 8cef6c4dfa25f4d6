//! # Registrar Common
//!
//! Shared types, traits, and utilities used across Registrar components.
//!
//! ## Modules
//! - `types` - Core data structures (challenges, sessions, schedule rows)
//! - `cookies` - Domain-scoped cookie jar carried through the handshake
//! - `clock` - Injectable time source
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod clock;
pub mod constants;
pub mod cookies;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cookies::CookieJar;
pub use error::RegistrarError;
pub use types::*;
