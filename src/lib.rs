#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod clients;
pub mod config;
pub mod domain;
pub mod mock_service;
pub mod observability;
pub mod pipeline;
pub mod schema;
pub mod storage;
