//! Management service clients

pub mod client;
pub mod deployments;
pub mod proxies;
