pub mod delivery;
pub mod event;
pub mod order;
pub mod user;
