//! Anime Catalog API Library
//!
//! This library provides the catalog entities, user accounts and the REST API
//! of the anime catalog service.

pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod routes;
pub mod service;
