//! Log subscriber setup

use crate::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `level`
///
/// `RUST_LOG` takes precedence when set. Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init(level: LogLevel) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_no_op() {
        init(LogLevel::Silent);
        assert!(!init(LogLevel::Verbose));
    }

    #[test]
    fn test_directives_parse() {
        for level in [LogLevel::Silent, LogLevel::Errors, LogLevel::Verbose] {
            assert!(level.directive().parse::<EnvFilter>().is_ok());
        }
    }
}
