//! Tracing subscriber setup for the `stash` binary.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Filter used when `RUST_LOG` is unset: the configured level for the cache
/// and the binary, `warn` for every other target.
pub fn default_filter(logging: &LoggingConfig) -> EnvFilter {
    let level = logging.level.to_ascii_lowercase();
    EnvFilter::new(format!("warn,stash_cache={level},stash={level}"))
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Calling this twice is harmless.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(logging));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_thread_ids(true))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_scopes_level_to_cache_targets() {
        let filter = default_filter(&LoggingConfig {
            level: "DEBUG".into(),
        });
        let directives = filter.to_string();
        assert!(directives.contains("stash_cache=debug"));
        assert!(directives.contains("stash=debug"));
        assert!(directives.contains("warn"));
    }
}
