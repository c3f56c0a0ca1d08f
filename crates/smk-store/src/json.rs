use anyhow::Context;
use serde::{de::DeserializeOwned, Serialize};

use crate::KeyValueStore;

/// Read and decode a JSON value. `Ok(None)` if the key is absent; an error if
/// the stored value does not decode as `T`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw).with_context(|| {
        format!(
            "key '{key}' does not decode as {}",
            std::any::type_name::<T>()
        )
    })?;
    Ok(Some(value))
}

pub async fn set_json<T: Serialize + Sync + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value).with_context(|| format!("encode '{key}' failed"))?;
    store.set(key, &raw).await
}
