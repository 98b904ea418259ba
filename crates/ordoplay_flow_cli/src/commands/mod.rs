// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI command implementations.

pub mod build;
pub mod compile;
pub mod rename;
pub mod run;
pub mod synthesize;
pub mod types;
