// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cache_isolation;
pub mod policy_service;
pub mod sandbox;

pub use cache_isolation::CacheIsolator;
pub use policy_service::{PackPolicyService, PackPolicyServiceBuilder, ServiceError};
pub use sandbox::{FlavorLabels, SandboxDownloader, SandboxOutcome};
