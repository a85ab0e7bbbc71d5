//! Typed access to a cache of JSON values.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::store::ExpiringCache;
use crate::error::{Result, TollgateError};

/// A cache shared by handlers that store values of different types.
///
/// Values are kept as JSON and decoded on read, so asking for the wrong
/// type is reported as [`TollgateError::CacheDecode`].
pub type JsonCache = ExpiringCache<serde_json::Value>;

impl ExpiringCache<serde_json::Value> {
    /// Serialize `value` and store it under `key` for `ttl`.
    pub fn set_json<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) -> Result<()> {
        let key = key.into();
        let json = serde_json::to_value(value).map_err(|source| TollgateError::CacheDecode {
            key: key.clone(),
            source,
        })?;
        self.set(key, json, ttl);
        Ok(())
    }

    /// Fetch the value under `key` and decode it as `T`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|json| {
                serde_json::from_value(json).map_err(|source| TollgateError::CacheDecode {
                    key: key.to_owned(),
                    source,
                })
            })
            .transpose()
    }
}
