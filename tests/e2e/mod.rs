//! End-to-End Tests for Form Uploadr
//!
//! Each test starts a real server bound to `127.0.0.1:0` and talks to it
//! with `reqwest`. Storage is replaced by [`common::MemoryStore`] or a
//! `mockall` mock.

pub mod common;
pub mod error_scenarios;
pub mod upload_flow;
