//! HTTP 핸들러

pub mod evaluate;
pub mod health;
