//! Core domain types and logic.

pub mod bar;
pub mod calc;
pub mod config;
pub mod error;
pub mod interval;
pub mod session;
pub mod window;
