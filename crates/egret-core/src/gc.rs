// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Background idle-session sweeper. Grounded in the teacher's
//! `sven-gateway::gateway::run` periodic-task idiom: a `tokio::spawn`ed
//! loop ticking on an interval, wired to a `CancellationToken`-free
//! shutdown signal via `tokio::select!`.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::session::SessionRegistry;

pub struct SessionReaper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl SessionReaper {
    /// Spawns the sweep loop. `sweep_interval` and `idle_ttl` come from
    /// `egret_config::Config::session`.
    pub fn spawn(registry: SessionRegistry, sweep_interval: Duration, idle_ttl: Duration) -> Self {
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let expired = registry.sweep_idle(idle_ttl).await;
                        if !expired.is_empty() {
                            tracing::info!(count = expired.len(), "swept idle sessions");
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        Self { handle, shutdown: tx }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}
