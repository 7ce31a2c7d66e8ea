// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Request Context
//!
//! [`PackRequest`] is the typed inbound pack-delivery message. A
//! [`PackContext`] is built once per request and shared immutably between
//! the policy path and any asynchronous sandbox work it schedules.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements request interpretation and cache-key derivation

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::host::{HostClassifier, HostInfo};

/// Longest prompt kept for display, in characters.
pub const MAX_PROMPT_CHARS: usize = 256;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("request carries no url, hash or pack id")]
    EmptyRequest,
}

/// Inbound pack-delivery request as decoded by the host's protocol layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub pack_id: Option<Uuid>,
}

/// Immutable per-request context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackContext {
    pub url: String,
    pub hash: String,
    pub host: HostInfo,
    pub required: bool,
    pub cache_key: Option<String>,
    pub pack_id: Option<Uuid>,
    pub prompt: String,
}

impl PackContext {
    pub fn build(
        request: &PackRequest,
        classifier: &HostClassifier,
        remote: Option<&str>,
    ) -> Result<Self, ContextError> {
        let url = request.url.trim().to_string();
        let hash = request.hash.trim().to_ascii_lowercase();

        if url.is_empty() && hash.is_empty() && request.pack_id.is_none() {
            return Err(ContextError::EmptyRequest);
        }

        let host = classifier.classify(&url, remote);
        let cache_key = derive_cache_key(request.pack_id, host.canonical_or_fallback(), &hash, &url);

        Ok(Self {
            url,
            hash,
            host,
            required: request.required,
            cache_key,
            pack_id: request.pack_id,
            prompt: sanitize_prompt(request.prompt.as_deref().unwrap_or_default()),
        })
    }

    /// Context built without classification, used when evaluation failed.
    pub fn degraded(request: &PackRequest, remote: Option<&str>) -> Self {
        let host = HostInfo {
            original: request.url.trim().to_string(),
            local: true,
            ..HostInfo::default()
        }
        .with_fallback(remote);

        Self {
            url: request.url.trim().to_string(),
            hash: request.hash.trim().to_ascii_lowercase(),
            host,
            required: request.required,
            cache_key: None,
            pack_id: request.pack_id,
            prompt: sanitize_prompt(request.prompt.as_deref().unwrap_or_default()),
        }
    }

    /// Key under which async collaborators find this context's download target.
    pub fn registry_key(&self) -> Option<String> {
        self.pack_id
            .map(|id| id.to_string())
            .or_else(|| self.cache_key.clone())
            .or_else(|| (!self.url.is_empty()).then(|| self.url.clone()))
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt.is_empty()
    }
}

/// `pack:<id>`, else `hash:<origin>|<hash>`, else `url:<url>`.
pub fn derive_cache_key(pack_id: Option<Uuid>, origin: &str, hash: &str, url: &str) -> Option<String> {
    if let Some(id) = pack_id {
        return Some(format!("pack:{}", id));
    }
    if !hash.is_empty() {
        return Some(format!("hash:{}|{}", origin, hash));
    }
    if !url.is_empty() {
        return Some(format!("url:{}", url));
    }
    None
}

/// Strip line breaks and control characters, collapse whitespace, bound length.
pub fn sanitize_prompt(raw: &str) -> String {
    let flattened: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    flattened
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_PROMPT_CHARS)
        .collect()
}
