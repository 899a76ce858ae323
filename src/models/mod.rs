pub mod authorizer;
pub mod error;
pub mod proxy;

pub use authorizer::*;
pub use error::{AuthError, ConfigError, ProxyError, SecretStoreError};
pub use proxy::{ProxyRequest, ProxyResponse};

use serde::{Deserialize, Deserializer};

/// API Gateway sends `null` for absent maps and flags; treat it as the default.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
