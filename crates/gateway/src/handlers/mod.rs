//! API handlers module

pub mod health;
pub mod search;
pub mod stream;
pub mod vision;
