//! Test utilities for use case and HTTP tests.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - An in-memory billing store implementing every repository trait
//! - A scripted payment provider standing in for the real adapters
//! - Webhook signing helpers matching the verifier's schemes
//! - A builder wiring all of the above into use cases and an `AppState`

mod app_state_builder;
mod billing_mocks;
mod factories;
mod webhook_mocks;

pub use app_state_builder::*;
pub use billing_mocks::*;
pub use factories::*;
pub use webhook_mocks::*;
