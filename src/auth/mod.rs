//! Bearer-token boundary. Tokens are issued elsewhere; this module only
//! checks them and hands the caller's id to the handlers.

mod extractors;
pub mod jwt;

pub use extractors::AuthUser;
pub use jwt::{Claims, JwtKeys, TokenKind};
