/*!
 * Serde utilities for metadata store records.
 *
 * The remote metadata store is written by several processes and older records
 * carry nulls or retired status names. These helpers read such fields leniently
 * so one odd record does not block a whole delivery.
 */

use serde::{Deserialize, Deserializer};

use crate::state_machine::states::{DeliveryState, DeliveryToken};

/// Deserialize an optional delivery state, mapping unknown names to `None`.
///
/// ```rust
/// use serde::Deserialize;
/// use delivery_core::state_machine::DeliveryState;
/// use delivery_core::utils::serde::deserialize_lenient_state;
///
/// #[derive(Deserialize)]
/// struct Entry {
///     #[serde(default, deserialize_with = "deserialize_lenient_state")]
///     delivery_status: Option<DeliveryState>,
/// }
///
/// let entry: Entry = serde_json::from_str(r#"{"delivery_status":"SOMETHING_OLD"}"#).unwrap();
/// assert!(entry.delivery_status.is_none());
/// ```
pub fn deserialize_lenient_state<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DeliveryState>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|raw| match raw.parse::<DeliveryState>() {
        Ok(state) => Some(state),
        Err(_) => {
            tracing::warn!(delivery_status = %raw, "Ignoring unknown delivery status on record");
            None
        }
    }))
}

/// Deserialize a delivery token where `null` means the sentinel
pub fn deserialize_token_or_sentinel<'de, D>(
    deserializer: D,
) -> std::result::Result<DeliveryToken, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(DeliveryToken::new).unwrap_or_default())
}

/// Deserialize a list where `null` means empty
pub fn deserialize_null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let value: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}
