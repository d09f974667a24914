//! Tracing setup for the binary.

use tracing_subscriber::EnvFilter;

/// Filter directive for `verbose` repetitions of `-v` over the configured level
pub fn filter_directive(verbose: u8, configured: &str) -> String {
    match verbose {
        0 if configured.trim().is_empty() => "info".to_string(),
        0 => configured.trim().to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber, logging to stderr.
///
/// `RUST_LOG` takes precedence over the directive.
pub fn init(verbose: u8, configured: &str, ansi: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(verbose, configured)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive(0, "warn"), "warn");
        assert_eq!(filter_directive(0, " "), "info");
        assert_eq!(filter_directive(1, "warn"), "debug");
        assert_eq!(filter_directive(3, "warn"), "trace");
    }
}
