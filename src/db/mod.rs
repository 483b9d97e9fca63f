pub mod models;
pub mod repository;

pub use models::{BookingIdentity, Session, Slot, User};
pub use repository::{SessionRepository, SlotRepository, UserRepository};
