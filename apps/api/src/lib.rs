//! Resume tailoring service: selects, rewrites and scores a user's experience
//! bullets against a target job description.

pub mod config;
pub mod db;
pub mod errors;
pub mod llm_client;
pub mod models;
pub mod repository;
pub mod routes;
pub mod state;
pub mod tailoring;
