//! Secret values and the repository audit trail
//!
//! Secret values never reach `Debug`, `Display` or the audit log; only key
//! names and file locations are logged.

use std::fmt;

use zeroize::Zeroizing;

/// Secret text, wiped from memory on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SecureString(Zeroizing<String>);

impl SecureString {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    /// The plain value; pass it straight to the consumer
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_owned())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString([REDACTED {} bytes])", self.len())
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Password repository operations that leave an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryAccess {
    Unlock,
    Save,
    Store,
}

impl RepositoryAccess {
    pub fn as_str(self) -> &'static str {
        match self {
            RepositoryAccess::Unlock => "unlock",
            RepositoryAccess::Save => "save",
            RepositoryAccess::Store => "store",
        }
    }
}

/// Emit an audit record under the `engage_secrets::audit` target.
///
/// `location` is the repository file, or `memory` for in-memory edits.
pub fn audit(access: RepositoryAccess, location: &str, key: Option<&str>, failure: Option<&dyn fmt::Display>) {
    let key = key.unwrap_or("-");
    match failure {
        None => tracing::info!(
            target: "engage_secrets::audit",
            access = access.as_str(),
            key,
            location,
            "Password repository access"
        ),
        Some(err) => tracing::warn!(
            target: "engage_secrets::audit",
            access = access.as_str(),
            key,
            location,
            error = %err,
            "Password repository access failed"
        ),
    }
}
