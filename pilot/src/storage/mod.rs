//! Stack files, profiles and on-disk layout

pub mod layout;
pub mod profiles;
pub mod stack;
