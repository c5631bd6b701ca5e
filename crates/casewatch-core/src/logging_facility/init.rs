//! Subscriber installation

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Output format and default verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable lines, `casewatch=debug`
    Development,
    /// One JSON object per line, `casewatch=info`
    Production,
    /// Bare registry; events are dropped unless a test layer is installed
    Test,
}

impl Profile {
    /// Parse a profile name as given on the command line or in `CASEWATCH_LOG_PROFILE`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Profile::Development),
            "prod" | "production" | "json" => Some(Profile::Production),
            "test" => Some(Profile::Test),
            _ => None,
        }
    }

    fn default_directive(&self) -> &'static str {
        match self {
            Profile::Development => "casewatch=debug",
            Profile::Production | Profile::Test => "casewatch=info",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Install the global subscriber for `profile`
///
/// Only the first call has an effect. `RUST_LOG` overrides the profile's
/// default filter. Lines go to stderr; stdout belongs to command output.
///
/// # Example
///
/// ```
/// use casewatch_core::logging_facility::{init, Profile};
///
/// init(Profile::Development);
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(profile.default_directive()));

        match profile {
            Profile::Development => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
            Profile::Production => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
            Profile::Test => {
                tracing_subscriber::registry().init();
            }
        }
    });
}
