use std::time::Duration;

/// How a warranted scale-up is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpMode {
    /// Resize the node group as soon as the decision fires.
    #[default]
    Immediate,
    /// Record a pending action and re-check before resizing.
    Graceful,
}

/// Tunables for the decision engine and the capacity poller.
#[derive(Debug, Clone)]
pub struct AutoscaleConfig {
    /// Scale up when the largest registered container no longer fits.
    /// Disabled, fit is treated as always satisfied and only the
    /// scale-down checks run.
    pub scale_up_enabled: bool,
    /// Scale down when every zone carries surplus capacity.
    pub scale_down_enabled: bool,
    pub up_mode: UpMode,
    /// Window after any scaling action during which new scale-up
    /// triggers are suppressed.
    pub up_cooldown: Duration,
    pub down_cooldown: Duration,
    /// Re-evaluation polls before a pending scale-up is applied.
    pub pending_up_polls: u32,
    /// Re-evaluation polls before a pending scale-down is applied.
    pub pending_down_polls: u32,
    pub pending_interval: Duration,
    /// Capacity snapshots older than this are rebuilt from the
    /// provider.
    pub cache_ttl: Duration,
    /// Poller lock self-expiry.
    pub lock_ttl: Duration,
    pub sweep_interval: Duration,
    /// Consecutive sweeps a service must show desired > running
    /// before the poller forces a scale-up.
    pub sustained_shortfall_polls: u32,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            scale_up_enabled: true,
            scale_down_enabled: true,
            up_mode: UpMode::Immediate,
            up_cooldown: Duration::from_secs(5 * 60),
            down_cooldown: Duration::from_secs(5 * 60),
            pending_up_polls: 2,
            pending_down_polls: 5,
            pending_interval: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(4 * 60),
            lock_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            sustained_shortfall_polls: 5,
        }
    }
}
