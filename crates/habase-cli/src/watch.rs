// Copyright 2025 habase Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use habase_client::{Connection, EndpointStatus, Liveness};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Format duration in milliseconds to human-readable string
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{}s", ms / 1000)
    } else if ms < 3_600_000 {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    } else {
        format!("{}h {}m", ms / 3_600_000, (ms % 3_600_000) / 60_000)
    }
}

/// One line per endpoint: `host:port up (0 failures)`
pub fn describe(statuses: &[EndpointStatus]) -> Vec<String> {
    statuses
        .iter()
        .map(|status| {
            let liveness = match status.liveness {
                Liveness::Up => "up",
                Liveness::Down => "down",
            };
            format!("{} {} ({} failures)", status.endpoint, liveness, status.failures)
        })
        .collect()
}

/// Polls `is_table_enabled` every `interval_ms` until Ctrl-C, or until
/// `count` polls have run.
///
/// Endpoint liveness is logged whenever it changes, so servers dropping out
/// of rotation and coming back are visible as they happen.
pub async fn run_watch(
    connection: &Connection,
    table: &str,
    interval_ms: u64,
    count: Option<u64>,
) -> Result<()> {
    let started = Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    let mut last = connection.statuses();
    let mut polls = 0u64;
    let mut failed = 0u64;

    for line in describe(&last) {
        info!("{}", line);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {}
        }

        match connection.is_table_enabled(table).await {
            Ok(enabled) => {
                let live = connection.live_count();
                info!(table, enabled, live, "poll");
            }
            Err(e) => {
                failed += 1;
                warn!(table, "poll failed: {}", e);
            }
        }

        let statuses = connection.statuses();
        for (before, now) in last.iter().zip(&statuses) {
            if before.liveness != now.liveness {
                info!("{}", describe(std::slice::from_ref(now)).join(""));
            }
        }
        last = statuses;

        polls += 1;
        if count.is_some_and(|count| polls >= count) {
            break;
        }
    }

    info!(
        "{} polls, {} failed, over {}",
        polls,
        failed,
        format_duration_ms(started.elapsed().as_millis() as u64)
    );
    Ok(())
}
