//! Tuning knobs for the coordination core.

use std::time::Duration;

/// Default time an invocation waits for its terminal message.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`ContractSupport`].
///
/// [`ContractSupport`]: crate::service::ContractSupport
#[derive(Debug, Clone)]
pub struct SupportConfig {
    /// How long `invoke` waits for COMPLETED or ERROR before giving up.
    pub invoke_timeout: Duration,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
        }
    }
}

impl SupportConfig {
    /// Overrides the invocation timeout.
    #[must_use]
    pub const fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    /// Short timeout so tests fail fast instead of hanging.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            invoke_timeout: Duration::from_millis(250),
        }
    }
}
