//! Access credentials used for signing

use std::fmt;

/// Access identifier plus secret key.
///
/// Immutable once built. The secret never appears in `Debug` output and the
/// type is deliberately not `Serialize`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_id: String,
    secret_key: Vec<u8>,
}

impl Credential {
    pub fn new(access_id: impl Into<String>, secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            access_id: access_id.into(),
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    pub fn access_id(&self) -> &str {
        &self.access_id
    }

    pub(crate) fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_id", &self.access_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
