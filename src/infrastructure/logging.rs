use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "POMOTASK_DEBUG_LOG";

/// Installs a fmt subscriber for the domain diagnostics. `RUST_LOG` wins,
/// `POMOTASK_DEBUG_LOG=1` forces debug, otherwise `info`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    let debug_enabled = std::env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_keeps_the_first_subscriber() {
        init_tracing();
        init_tracing();
        assert!(tracing::dispatcher::has_been_set());
        tracing::debug!(component = "logging", "subscriber installed");
    }
}
