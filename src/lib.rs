pub mod config;
pub mod db;
pub mod error;
pub mod gp51;
pub mod models;
pub mod repositories;
pub mod services;
