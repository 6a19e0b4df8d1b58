pub mod archive;
pub mod bin_dir;
pub mod cleanup;
pub mod config;
pub mod download;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod http;
pub mod install;
pub mod manifest;
pub mod plan;
pub mod platform;
pub mod runtime;
