pub mod config;
pub mod error;
pub mod store;

// Domain
pub mod catalog;
pub mod clock;
pub mod policy;
pub mod requests;
pub mod users;

// HTTP surface
pub mod api;
pub mod auth;
pub mod validation;
