// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PackGuard Core
//!
//! Decides how pack-delivery requests from game servers are handled (allow,
//! block or sandbox), keeps sandboxed payloads away from the engine, isolates
//! the engine's download cache per account and launch, and watches for
//! request bursts used to fingerprint clients.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Implements the pack-request policy and sandboxing pipeline

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{PackPolicyService, SandboxOutcome};
