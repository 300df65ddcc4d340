//! Deployment engine

pub mod bootstrap;
pub mod context;
pub mod diff;
pub mod fsm;
pub mod hooks;
pub mod images;
pub mod orchestrator;
pub mod pipeline;
pub mod proxy;
pub mod rollback;
pub mod status;
pub mod version;
