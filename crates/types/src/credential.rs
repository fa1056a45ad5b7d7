//! Privilege escalation secret

use std::fmt;

/// The user's privilege-escalation secret.
///
/// Never serialized, never displayed, and not `Clone`: the session owns the
/// single copy and moves it in from the presentation layer. The only way to
/// read it back is [`Credential::expose`], used when piping it to a
/// subprocess. The memory is not wiped when dropped.
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
