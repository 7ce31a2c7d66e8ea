// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host Application Ports
//!
//! Traits the enclosing application implements so the pack pipeline can
//! talk back to the peer, read the active session and display alerts
//! without knowing anything about the host's UI or transport.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Defines collaborator interfaces consumed by the core

use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::decision::PackStatus;
use crate::domain::notification::Toast;

/// Errors raised when replying to the remote peer.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer connection is closed")]
    Closed,

    #[error("failed to send pack status: {0}")]
    Send(String),
}

/// Errors raised by a toast renderer for a single item.
#[derive(Debug, Error)]
#[error("toast rendering failed: {0}")]
pub struct RenderError(pub String);

/// Best-effort DNS lookup.
pub trait HostResolver: Send + Sync {
    /// Resolve `host` to one address, `None` when resolution fails.
    fn resolve(&self, host: &str, port: u16) -> Option<IpAddr>;
}

/// The connection a pack-delivery request arrived on.
pub trait PackPeer: Send + Sync {
    /// Reply to the peer with a protocol status for `pack_id`.
    fn send_status(&self, pack_id: Option<Uuid>, status: PackStatus) -> Result<(), PeerError>;

    /// Dismiss any pending confirmation UI queued for this delivery.
    fn clear_pending_prompt(&self, _pack_id: Option<Uuid>) {}
}

/// Read access to the active game session.
pub trait SessionProvider: Send + Sync {
    /// Stable identifier of the logged-in account, if any.
    fn account_id(&self) -> Option<String>;
}

/// Session provider used when the host exposes no session.
pub struct NoSession;

impl SessionProvider for NoSession {
    fn account_id(&self) -> Option<String> {
        None
    }
}

/// Renders queued toasts through the host's UI layer.
pub trait ToastRenderer {
    fn render(&self, toast: &Toast) -> Result<(), RenderError>;
}

/// Direct user-facing message channel (e.g. the local chat log).
pub trait ChatSink: Send + Sync {
    fn send_chat(&self, message: &str);
}
