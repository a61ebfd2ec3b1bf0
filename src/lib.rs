//! Page server that splices server-rendered web component fragments into HTML pages.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
