pub mod auth;
pub mod dao;
