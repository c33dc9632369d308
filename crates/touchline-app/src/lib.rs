// Library root: exposes the console modules so integration tests and the
// binary share one API.

pub mod app;
pub mod auth;
pub mod config;
pub mod render;
pub mod rest;
