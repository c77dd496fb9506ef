//! Serde support for [`RetryPolicy`].
//!
//! Policies serialize to a flat, human-editable form with durations in
//! seconds or milliseconds. Deserialization validates the values, so a
//! policy loaded from configuration is always usable.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::PolicyError;
use super::policy::{RetryPolicy, DEFAULT_JITTER_MAX, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES};

#[derive(Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PolicyConfig {
    max_retries: u32,
    max_backoff_secs: f64,
    jitter_max_millis: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_backoff_secs: DEFAULT_MAX_BACKOFF.as_secs_f64(),
            jitter_max_millis: DEFAULT_JITTER_MAX.as_millis() as u64,
        }
    }
}

impl TryFrom<PolicyConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(config: PolicyConfig) -> Result<Self, Self::Error> {
        let policy = RetryPolicy::default()
            .with_max_retries(config.max_retries)
            .with_max_backoff_secs(config.max_backoff_secs)?
            .with_jitter_max(Duration::from_millis(config.jitter_max_millis));
        policy.validate()?;
        Ok(policy)
    }
}

impl From<&RetryPolicy> for PolicyConfig {
    fn from(policy: &RetryPolicy) -> Self {
        Self {
            max_retries: policy.max_retries(),
            max_backoff_secs: policy.max_backoff().as_secs_f64(),
            jitter_max_millis: u64::try_from(policy.jitter_max().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Serialize for RetryPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        PolicyConfig::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RetryPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let config = PolicyConfig::deserialize(deserializer)?;
        RetryPolicy::try_from(config).map_err(serde::de::Error::custom)
    }
}
