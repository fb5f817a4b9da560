use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "HOSTPKG_LOG";

const DEFAULT_FILTER: &str = "info";

/// Installs the fmt subscriber once per process; later calls are no-ops.
/// Returns whether this call installed it.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::init_tracing;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_tracing();
        assert!(!init_tracing());
    }
}
