// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod archive;
pub mod audit_log;
pub mod cached_pack_copier;
pub mod event_bus;
pub mod host_resolver;
pub mod http_fetcher;
pub mod pack_cache;
pub mod registry;

pub use audit_log::AuditLog;
pub use event_bus::{EventBus, EventReceiver};
pub use host_resolver::SystemResolver;
pub use registry::{ContextRegistry, DownloadTargetRegistry, SnapshotDedupe};
