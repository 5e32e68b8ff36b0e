// src/lib.rs

pub mod api;
pub mod app_state;
pub mod clock;
pub mod config;
pub mod error;
pub mod metadata;
pub mod retention;
pub mod service;
pub mod storage;
