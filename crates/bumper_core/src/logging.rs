//! Logging setup
//!
//! The crate logs through `tracing`. Applications that don't install their
//! own subscriber can call [`init_logging`] early in `main`.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Logger configuration
///
/// `env_filter` uses `EnvFilter` directive syntax (e.g. "info",
/// "bumper_core=debug"). When unset, `RUST_LOG` is consulted, then `info`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    /// Emit ANSI colors
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            ansi: true,
        }
    }
}

static INIT: Once = Once::new();

/// Install a global fmt subscriber once; later calls are ignored
///
/// If another subscriber is already installed this leaves it in place.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = match config.env_filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.ansi)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!("logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging(LoggingConfig {
            env_filter: Some("bumper_core=trace".into()),
            ansi: false,
        });
        init_logging(LoggingConfig::default());

        // Lifecycle logging must not disturb normal operation
        let game = crate::game_state::GameState::new();
        game.time.set(1.0);
        assert_eq!(game.props().time, 1.0);
    }
}
