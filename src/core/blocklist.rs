//! The block set.
//!
//! Written by manual block/unblock requests and by the auto-block policy,
//! read by the aggregator and the request path. Insertion is conditioned on
//! the IP being absent, so the check and the insert happen under one write
//! lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::core::mitigation::{MitigationAction, Mitigator};

/// A blocked IP
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockEntry {
    pub ip: String,
    pub blocked_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Blocked,
    AlreadyBlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockOutcome {
    Unblocked,
    NotBlocked,
}

/// IP-keyed set of block entries
pub struct BlockList {
    entries: RwLock<HashMap<String, BlockEntry>>,
    mitigator: Arc<dyn Mitigator>,
}

impl BlockList {
    pub fn new(mitigator: Arc<dyn Mitigator>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            mitigator,
        }
    }

    /// Block `ip` unless it is already blocked.
    ///
    /// An existing entry keeps its original time and reason.
    pub async fn block(&self, ip: &str, reason: &str) -> BlockOutcome {
        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(ip) {
                return BlockOutcome::AlreadyBlocked;
            }
            entries.insert(
                ip.to_string(),
                BlockEntry {
                    ip: ip.to_string(),
                    blocked_at: Utc::now(),
                    reason: reason.to_string(),
                },
            );
        }

        info!("IP {} blocked: {}", ip, reason);
        self.mitigate(ip, MitigationAction::Add).await;
        BlockOutcome::Blocked
    }

    pub async fn unblock(&self, ip: &str) -> UnblockOutcome {
        let removed = self.entries.write().await.remove(ip);
        if removed.is_none() {
            return UnblockOutcome::NotBlocked;
        }

        info!("IP {} unblocked", ip);
        self.mitigate(ip, MitigationAction::Delete).await;
        UnblockOutcome::Unblocked
    }

    pub async fn contains(&self, ip: &str) -> bool {
        self.entries.read().await.contains_key(ip)
    }

    pub async fn get(&self, ip: &str) -> Option<BlockEntry> {
        self.entries.read().await.get(ip).cloned()
    }

    /// All entries, oldest block first.
    pub async fn list(&self) -> Vec<BlockEntry> {
        let mut entries: Vec<BlockEntry> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.blocked_at.cmp(&b.blocked_at).then_with(|| a.ip.cmp(&b.ip)));
        entries
    }

    pub async fn blocked_ips(&self) -> HashSet<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn mitigate(&self, ip: &str, action: MitigationAction) {
        if let Err(e) = self.mitigator.apply(ip, action).await {
            warn!("Mitigation {} for {} failed: {}", action.as_str(), ip, e);
        }
    }
}
