pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mailer;
pub mod models;
pub mod records;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod services;
pub mod state;
pub mod storage;
