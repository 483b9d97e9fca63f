//! Database models split into separate files.

pub mod session;
pub mod slot;
pub mod user;

pub use self::session::*;
pub use self::slot::*;
pub use self::user::*;
