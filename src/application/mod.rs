//! Application services: page assembly over the fragment seam, the render command, and the HTTP error mapping.

pub mod assembler;
pub mod error;
pub mod fragments;
pub mod pages;
pub mod render;
pub mod sitemap;
