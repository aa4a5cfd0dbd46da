//! Credential minting and introspection.
//!
//! The identity platform issues HS256 token pairs; the client decodes the
//! access token's claims to learn who it is effectively authenticated as.
//! A scoped credential carries an acting-as claim and an absolute expiry.

mod claims;
mod config;
mod service;

pub use claims::{AccessClaims, AssuranceLevel, TokenType};
pub use config::TokenConfig;
pub use service::{TokenPair, TokenService};
