pub mod config;
pub mod errors;
pub mod irondb;
pub mod models;
