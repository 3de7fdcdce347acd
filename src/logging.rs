// SPDX-FileCopyrightText: 2024 blinry
// SPDX-FileCopyrightText: 2024 zormit
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use time;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber. The filter is driven by
/// `RUST_LOG` (§6.4), defaulting to `info` when unset or unparseable.
pub fn initialize() {
    let timer = time::format_description::parse("[hour]:[minute]:[second]")
        .expect("Could not create time format description");
    let time_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = fmt::time::OffsetTime::new(time_offset, timer);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .with_timer(timer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Setting default log subscriber failed");
}
