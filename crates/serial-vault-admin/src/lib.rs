pub mod account;
pub mod client;
pub mod database;
pub mod user;
