//! Management modes
//!
//! The mode is chosen once at startup and never changes. Every parameter a
//! mode needs is validated when the mode is built, so refresh cycles never
//! see a half-configured policy.

use std::time::Duration;

use bee_api::BatchId;

use crate::error::{Error, Result};

/// Depth and per-chunk amount of the batches a managed mode buys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSpec {
    pub depth: u8,
    pub amount: String,
}

impl BatchSpec {
    /// Both values are required for autobuy and autoextend.
    pub fn new(depth: Option<u8>, amount: Option<String>) -> Result<Self> {
        let (Some(depth), Some(amount)) = (depth, amount) else {
            return Err(Error::Configuration(
                "managed stamp modes require both depth and amount to be set".into(),
            ));
        };
        if depth == 0 {
            return Err(Error::Configuration("depth must be greater than 0".into()));
        }
        if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Configuration(format!(
                "amount must be a decimal integer, got: {amount:?}"
            )));
        }
        Ok(Self { depth, amount })
    }
}

/// Autobuy: keep a pool of same-shaped batches and buy before it runs dry.
#[derive(Debug, Clone, PartialEq)]
pub struct AutobuyPolicy {
    pub batch: BatchSpec,
    /// Buy once the least-used candidate reaches this usage.
    pub usage_threshold: f64,
    /// Candidates at or above this usage are dropped.
    pub usage_max: f64,
    /// Candidates expiring within this window are dropped.
    pub ttl_min: Duration,
    pub refresh_period: Duration,
}

impl AutobuyPolicy {
    pub fn new(
        batch: BatchSpec,
        usage_threshold: f64,
        usage_max: f64,
        ttl_min: Duration,
        refresh_period: Duration,
    ) -> Result<Self> {
        check_ratio("usage_threshold", usage_threshold)?;
        check_ratio("usage_max", usage_max)?;
        check_period(refresh_period)?;
        Ok(Self {
            batch,
            usage_threshold,
            usage_max,
            ttl_min,
            refresh_period,
        })
    }
}

/// Autoextend: keep the node's existing batches alive by topping them up.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoextendPolicy {
    /// Shape of the batch bought when none is usable; `amount` is also the
    /// top-up amount.
    pub batch: BatchSpec,
    pub ttl_min: Duration,
    pub refresh_period: Duration,
}

impl AutoextendPolicy {
    pub fn new(batch: BatchSpec, ttl_min: Duration, refresh_period: Duration) -> Result<Self> {
        check_period(refresh_period)?;
        Ok(Self {
            batch,
            ttl_min,
            refresh_period,
        })
    }

    /// Batches with less TTL than this would fall under `ttl_min` before the
    /// next cycle gets a chance to extend them.
    pub fn top_up_threshold(&self) -> Duration {
        self.ttl_min + self.refresh_period
    }
}

/// How the gateway obtains the stamp it injects into uploads.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagementMode {
    /// No stamp management; the accessor always fails.
    Disabled,
    /// Always use this batch.
    Hardcoded(BatchId),
    Autobuy(AutobuyPolicy),
    Autoextend(AutoextendPolicy),
}

impl ManagementMode {
    /// Hardcoded mode with a non-empty batch id.
    pub fn hardcoded(stamp: Option<String>) -> Result<Self> {
        match stamp {
            Some(id) if !id.trim().is_empty() => Ok(Self::Hardcoded(BatchId::new(id.trim()))),
            _ => Err(Error::Configuration(
                "hardcoded stamp mode requires a stamp to be set".into(),
            )),
        }
    }

    /// Label for health reporting and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ManagementMode::Disabled => "disabled",
            ManagementMode::Hardcoded(_) => "hardcoded",
            ManagementMode::Autobuy(_) => "autobuy",
            ManagementMode::Autoextend(_) => "autoextend",
        }
    }

    /// Period of the background refresh loop; `None` for modes without one.
    pub fn refresh_period(&self) -> Option<Duration> {
        match self {
            ManagementMode::Autobuy(policy) => Some(policy.refresh_period),
            ManagementMode::Autoextend(policy) => Some(policy.refresh_period),
            ManagementMode::Disabled | ManagementMode::Hardcoded(_) => None,
        }
    }

    /// Whether uploads get a stamp injected at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ManagementMode::Disabled)
    }
}

fn check_ratio(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "{name} must be within (0, 1], got: {value}"
        )))
    }
}

fn check_period(period: Duration) -> Result<()> {
    if period.is_zero() {
        return Err(Error::Configuration(
            "refresh period must be greater than 0".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BatchSpec {
        BatchSpec::new(Some(20), Some("1000".into())).unwrap()
    }

    #[test]
    fn batch_spec_requires_depth_and_amount() {
        assert!(BatchSpec::new(None, Some("1000".into())).is_err());
        assert!(BatchSpec::new(Some(20), None).is_err());
        let err = BatchSpec::new(None, None).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn batch_spec_rejects_non_decimal_amount() {
        assert!(BatchSpec::new(Some(20), Some("1e6".into())).is_err());
        assert!(BatchSpec::new(Some(20), Some("-5".into())).is_err());
        assert!(BatchSpec::new(Some(20), Some(String::new())).is_err());
        assert!(BatchSpec::new(Some(0), Some("1000".into())).is_err());
    }

    #[test]
    fn autobuy_rejects_ratios_outside_unit_interval() {
        let ok = |t, m| AutobuyPolicy::new(spec(), t, m, Duration::ZERO, Duration::from_secs(1));
        assert!(ok(0.7, 0.9).is_ok());
        assert!(ok(1.0, 1.0).is_ok());
        assert!(ok(0.0, 0.9).is_err());
        assert!(ok(0.7, 1.5).is_err());
        assert!(ok(f64::NAN, 0.9).is_err());
    }

    #[test]
    fn zero_refresh_period_rejected() {
        assert!(AutobuyPolicy::new(spec(), 0.7, 0.9, Duration::ZERO, Duration::ZERO).is_err());
        assert!(AutoextendPolicy::new(spec(), Duration::ZERO, Duration::ZERO).is_err());
    }

    #[test]
    fn top_up_threshold_adds_refresh_period_to_min_ttl() {
        let policy = AutoextendPolicy::new(
            spec(),
            Duration::from_secs(900),
            Duration::from_secs(300),
        )
        .unwrap();
        assert_eq!(policy.top_up_threshold(), Duration::from_secs(1200));
    }

    #[test]
    fn hardcoded_requires_non_empty_stamp() {
        assert!(ManagementMode::hardcoded(None).is_err());
        assert!(ManagementMode::hardcoded(Some("  ".into())).is_err());
        let mode = ManagementMode::hardcoded(Some("abcd".into())).unwrap();
        assert_eq!(mode, ManagementMode::Hardcoded(BatchId::from("abcd")));
    }

    #[test]
    fn only_managed_modes_have_a_refresh_loop() {
        let autobuy = ManagementMode::Autobuy(
            AutobuyPolicy::new(spec(), 0.7, 0.9, Duration::ZERO, Duration::from_secs(300))
                .unwrap(),
        );
        assert_eq!(autobuy.refresh_period(), Some(Duration::from_secs(300)));
        assert_eq!(ManagementMode::Disabled.refresh_period(), None);
        assert_eq!(
            ManagementMode::Hardcoded(BatchId::from("ab")).refresh_period(),
            None
        );
        assert!(!ManagementMode::Disabled.is_enabled());
        assert_eq!(autobuy.label(), "autobuy");
    }
}
