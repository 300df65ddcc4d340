//! Wire models shared with the stackpilot management service.

pub mod models;
