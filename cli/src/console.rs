// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Terminal implementations of the ports a game client would normally provide.

use colored::Colorize;
use packguard_core::domain::decision::PackStatus;
use packguard_core::domain::notification::{Toast, ToastLevel};
use packguard_core::domain::ports::{
    ChatSink, PackPeer, PeerError, RenderError, SessionProvider, ToastRenderer,
};
use uuid::Uuid;

/// Prints the status a real client would send back to the server.
pub struct ConsolePeer;

impl PackPeer for ConsolePeer {
    fn send_status(&self, pack_id: Option<Uuid>, status: PackStatus) -> Result<(), PeerError> {
        let id = pack_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} {:?} (pack {})", "→ peer:".dimmed(), status, id);
        Ok(())
    }

    fn clear_pending_prompt(&self, pack_id: Option<Uuid>) {
        if let Some(id) = pack_id {
            println!("  {} cleared pending prompt for {}", "→ ui:".dimmed(), id);
        }
    }
}

pub struct ConsoleRenderer;

impl ToastRenderer for ConsoleRenderer {
    fn render(&self, toast: &Toast) -> Result<(), RenderError> {
        let level = match toast.level {
            ToastLevel::Info => "INFO".blue(),
            ToastLevel::Warn => "WARN".yellow(),
            ToastLevel::Error => "ERROR".red(),
        };
        println!("  [{}] {}: {}", level, toast.title.bold(), toast.body);
        Ok(())
    }
}

pub struct ConsoleChat;

impl ChatSink for ConsoleChat {
    fn send_chat(&self, message: &str) {
        println!("  {} {}", "chat:".magenta(), message);
    }
}

/// Session identity given on the command line.
pub struct StaticSession(pub Option<String>);

impl SessionProvider for StaticSession {
    fn account_id(&self) -> Option<String> {
        self.0.clone()
    }
}
