// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod error;
pub mod gateway;
pub mod http;
pub mod token;

pub use error::GatewayError;
pub use gateway::{router, run, AppState};
