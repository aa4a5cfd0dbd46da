pub mod email;
pub mod reason;

pub use email::validate_email;
pub use reason::validate_reason;
