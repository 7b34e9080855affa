pub mod expiry;
pub mod filter;
pub mod lifecycle;
pub mod route;
pub mod stops;
