pub mod api;
pub mod capture;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod retention;
pub mod views;
