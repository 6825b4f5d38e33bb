//! Engine configuration.
//!
//! An [`EngineConfig`] is built once by the host application and handed to
//! every engine at construction. Algorithm code never reads the environment.
//!
//! # Example
//!
//! ```rust
//! use tandem_core::{EngineConfig, LinkMode};
//!
//! let config = EngineConfig::default()
//!     .with_threshold(0.5)
//!     .with_top_k(10)
//!     .with_mode(LinkMode::Slope);
//! assert!(config.validate().is_ok());
//! ```

use std::env;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::LinkMode;
use crate::retention::RetentionHorizon;

/// Rating values assigned by the automatic rating operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingValues {
    /// Minimum rating treated as genuine interest.
    pub threshold: f64,
    /// Rating recorded on purchase; ceiling for click increments.
    pub purchased: f64,
    /// Rating recorded on first click.
    pub click_initial: f64,
    /// Increment applied on repeated clicks.
    pub click_increase: f64,
    /// Sentinel stored for "not interested".
    pub not_interested: f64,
}

impl Default for RatingValues {
    fn default() -> Self {
        Self {
            threshold: defaults::RATING_THRESHOLD,
            purchased: defaults::RATING_PURCHASED,
            click_initial: defaults::RATING_CLICK_INITIAL,
            click_increase: defaults::RATING_CLICK_INCREASE,
            not_interested: defaults::RATING_NOT_INTERESTED,
        }
    }
}

impl RatingValues {
    /// Value a click moves `current` to, or `None` when it is already at
    /// the purchased ceiling. A missing rating or a not-interested marker
    /// restarts at `click_initial`.
    pub fn next_click(&self, current: Option<f64>) -> Option<f64> {
        match current {
            None => Some(self.click_initial),
            Some(value) if value < 0.0 => Some(self.click_initial),
            Some(value) if value < self.purchased => {
                Some((value + self.click_increase).min(self.purchased))
            }
            Some(_) => None,
        }
    }
}

/// Configuration consumed by the aggregator, query, ranking and rating engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ratings: RatingValues,
    /// Maximum outgoing links per source item; `<= 0` keeps every link.
    pub top_k: i64,
    /// Retention offset such as `"-6 months"`; empty disables pruning.
    pub retention_period: String,
    /// Aggregation mode used by batch runs.
    pub mode: LinkMode,
    /// Recompute co-occurrence links when a rating crosses the threshold.
    pub realtime_link: bool,
    /// Recompute slope links when a positive rating changes.
    pub realtime_slope: bool,
    /// Default maximum result count for list queries.
    pub items_max_return: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ratings: RatingValues::default(),
            top_k: defaults::LINKS_MAX_NUMBER,
            retention_period: defaults::RATING_RETENTION_PERIOD.to_string(),
            mode: LinkMode::default(),
            realtime_link: false,
            realtime_slope: false,
            items_max_return: defaults::ITEMS_MAX_RETURN,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TANDEM_RATING_THRESHOLD` | `0.66` | Interest threshold |
    /// | `TANDEM_RATING_PURCHASED` | `1.0` | Purchase rating |
    /// | `TANDEM_RATING_CLICK_INITIAL` | `0.7` | First click rating |
    /// | `TANDEM_RATING_CLICK_INCREASE` | `0.01` | Repeated click increment |
    /// | `TANDEM_RATING_NOT_INTERESTED` | `-1.0` | Not-interested sentinel |
    /// | `TANDEM_RATING_RETENTION_PERIOD` | `-6 months` | Retention horizon |
    /// | `TANDEM_LINKS_MAX_NUMBER` | `30` | Top-K links per item |
    /// | `TANDEM_LINKS_MODE` | `links` | `links` or `slope` |
    /// | `TANDEM_LINKS_REALTIME_LINK` | `false` | Incremental co-occurrence updates |
    /// | `TANDEM_LINKS_REALTIME_SLOPE` | `false` | Incremental slope updates |
    /// | `TANDEM_ITEMS_MAX_RETURN` | `1000000` | Default list size |
    pub fn from_env() -> Result<Self> {
        let base = Self::default();

        let config = Self {
            ratings: RatingValues {
                threshold: env_parse("TANDEM_RATING_THRESHOLD", base.ratings.threshold)?,
                purchased: env_parse("TANDEM_RATING_PURCHASED", base.ratings.purchased)?,
                click_initial: env_parse(
                    "TANDEM_RATING_CLICK_INITIAL",
                    base.ratings.click_initial,
                )?,
                click_increase: env_parse(
                    "TANDEM_RATING_CLICK_INCREASE",
                    base.ratings.click_increase,
                )?,
                not_interested: env_parse(
                    "TANDEM_RATING_NOT_INTERESTED",
                    base.ratings.not_interested,
                )?,
            },
            top_k: env_parse("TANDEM_LINKS_MAX_NUMBER", base.top_k)?,
            retention_period: env::var("TANDEM_RATING_RETENTION_PERIOD")
                .unwrap_or(base.retention_period),
            mode: env_parse("TANDEM_LINKS_MODE", base.mode)?,
            realtime_link: env_flag("TANDEM_LINKS_REALTIME_LINK", base.realtime_link),
            realtime_slope: env_flag("TANDEM_LINKS_REALTIME_SLOPE", base.realtime_slope),
            items_max_return: env_parse("TANDEM_ITEMS_MAX_RETURN", base.items_max_return)?,
        };

        config.validate()?;
        debug!(
            subsystem = "config",
            threshold = config.ratings.threshold,
            top_k = config.top_k,
            mode = %config.mode,
            retention = %config.retention_period,
            "Loaded engine configuration from environment"
        );
        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.ratings.threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_retention_period(mut self, period: impl Into<String>) -> Self {
        self.retention_period = period.into();
        self
    }

    pub fn with_mode(mut self, mode: LinkMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_realtime_link(mut self, enabled: bool) -> Self {
        self.realtime_link = enabled;
        self
    }

    pub fn with_realtime_slope(mut self, enabled: bool) -> Self {
        self.realtime_slope = enabled;
        self
    }

    pub fn with_items_max_return(mut self, max: usize) -> Self {
        self.items_max_return = max;
        self
    }

    /// Parsed retention horizon, `None` when pruning is disabled.
    pub fn retention_horizon(&self) -> Result<Option<RetentionHorizon>> {
        RetentionHorizon::parse_optional(&self.retention_period)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let r = &self.ratings;
        for (name, value) in [
            ("threshold", r.threshold),
            ("purchased", r.purchased),
            ("click_initial", r.click_initial),
            ("click_increase", r.click_increase),
            ("not_interested", r.not_interested),
        ] {
            if !value.is_finite() {
                return Err(Error::Config(format!("{} must be finite", name)));
            }
        }
        if r.not_interested >= 0.0 {
            return Err(Error::Config(
                "not_interested sentinel must be negative".to_string(),
            ));
        }
        if r.click_initial < 0.0 || r.click_initial > r.purchased {
            return Err(Error::Config(format!(
                "click_initial {} must lie in [0, purchased={}]",
                r.click_initial, r.purchased
            )));
        }
        if r.click_increase < 0.0 {
            return Err(Error::Config(
                "click_increase must not be negative".to_string(),
            ));
        }
        self.retention_horizon()?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.ratings.threshold, 0.66);
        assert_eq!(config.ratings.purchased, 1.0);
        assert_eq!(config.ratings.click_initial, 0.7);
        assert_eq!(config.ratings.click_increase, 0.01);
        assert_eq!(config.ratings.not_interested, -1.0);
        assert_eq!(config.top_k, 30);
        assert_eq!(config.retention_period, "-6 months");
        assert_eq!(config.mode, LinkMode::Links);
        assert!(!config.realtime_link);
        assert!(!config.realtime_slope);
    }

    #[test]
    fn click_steps_towards_purchased() {
        let values = RatingValues::default();
        assert_eq!(values.next_click(None), Some(0.7));
        assert_eq!(values.next_click(Some(-1.0)), Some(0.7));
        assert!((values.next_click(Some(0.7)).unwrap() - 0.71).abs() < 1e-9);
        assert_eq!(values.next_click(Some(0.995)), Some(1.0));
        assert_eq!(values.next_click(Some(1.0)), None);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = EngineConfig::new()
            .with_threshold(0.5)
            .with_top_k(0)
            .with_mode(LinkMode::Slope)
            .with_realtime_slope(true)
            .with_retention_period("");
        assert_eq!(config.ratings.threshold, 0.5);
        assert_eq!(config.top_k, 0);
        assert_eq!(config.mode, LinkMode::Slope);
        assert!(config.realtime_slope);
        assert_eq!(config.retention_horizon().unwrap(), None);
    }

    #[test]
    fn rejects_non_negative_sentinel() {
        let mut config = EngineConfig::default();
        config.ratings.not_interested = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_nan_threshold() {
        let config = EngineConfig::default().with_threshold(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_retention() {
        let config = EngineConfig::default().with_retention_period("soon");
        assert!(config.validate().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let config = EngineConfig::default().with_mode(LinkMode::Slope);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
