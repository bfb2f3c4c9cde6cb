//! Host capabilities outside audio
//!
//! OS-level experiment-mode hardening (pausing background services, power
//! plans) is a platform capability. No platform implements it here; the
//! no-op implementation lets the session record that it did not happen.

use crate::error::Result;
use std::sync::Arc;

pub trait HostCapabilities: Send + Sync {
    fn supports_service_hardening(&self) -> bool;

    /// Put the host into experiment mode for the session's duration
    fn enter_experiment_mode(&self) -> Result<()>;

    fn leave_experiment_mode(&self);
}

/// Fallback for hosts without hardening support
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHardening;

impl HostCapabilities for NoHardening {
    fn supports_service_hardening(&self) -> bool {
        false
    }

    fn enter_experiment_mode(&self) -> Result<()> {
        Ok(())
    }

    fn leave_experiment_mode(&self) {}
}

/// Capabilities of the running host, chosen once at startup
pub fn detect() -> Arc<dyn HostCapabilities> {
    Arc::new(NoHardening)
}
