//! Scribbly: a small social-blogging server.
//!
//! Layers follow the usual split: `domain` holds records and rules,
//! `application` the services and repository traits, `infra` Postgres,
//! HTTP and uploads, `cache` the index page cache and `presentation`
//! the askama views.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
