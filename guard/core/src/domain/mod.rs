// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types and rules of the pack-delivery pipeline.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements request interpretation, classification and bounded state

pub mod config;
pub mod context;
pub mod decision;
pub mod decision_cache;
pub mod events;
pub mod file_naming;
pub mod fingerprint;
pub mod host;
pub mod notification;
pub mod ports;
