//! stackpilot library
//!
//! Deployment engine for stacks of containerized resources: stack and
//! profile configuration, build-context templates, the container runtime
//! interface, the deployment orchestrator and the CLI commands built on it.

pub mod app;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod console;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod logstream;
pub mod models;
pub mod runtime;
pub mod storage;
pub mod templates;
