//! becore - content catalog backend
//!
//! Tagged content pages, S3-backed file storage with orphan cleanup,
//! bearer-token accounts, and a catalog of packs, teams and addon pages.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod storage;
