pub mod delivery;
pub mod donation;
pub mod event;
pub mod location;
pub mod request;
pub mod stop;
pub mod user;
