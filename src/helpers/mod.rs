//! Response and security helpers available on every controller.
//!
//! - [`negotiation`]: `respond_to` content negotiation
//! - [`csrf`]: `protect_from_forgery` and token signing
//! - [`forwarders`]: `send`, `header`, `redirect`, `flash`, `render`

pub mod csrf;
pub mod forwarders;
pub mod negotiation;

pub use csrf::{generate_seed, sign, tokens_match, DEFAULT_PARAM};
pub use negotiation::{Format, Variants};
