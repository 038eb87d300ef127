//! Cache key derivation.

use std::borrow::Cow;

/// The two cache keys holding one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// Key of the header sub-record (lock state, flag, timeout).
    pub header: String,
    /// Key of the data sub-record (serialized items).
    pub data: String,
}

/// Maps session ids to namespaced cache keys.
///
/// The namespace identifies the deployment, so deployments sharing one cache
/// never read each other's sessions. Whitespace in it is replaced with `-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeriver {
    namespace: String,
}

impl KeyDeriver {
    /// Create a deriver for the given deployment namespace.
    pub fn new(namespace: impl AsRef<str>) -> Self {
        let namespace = namespace
            .as_ref()
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .collect();
        Self { namespace }
    }

    /// The normalized namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Keys for a session id.
    ///
    /// `+` and `%` in the id are percent-escaped, so the last `+` of a key
    /// always separates namespace from id and no two (namespace, id) pairs
    /// share a key.
    pub fn derive(&self, session_id: &str) -> SessionKeys {
        let id = escape_id(session_id);
        SessionKeys {
            header: format!("{}+info-{}", self.namespace, id),
            data: format!("{}+data-{}", self.namespace, id),
        }
    }
}

fn escape_id(session_id: &str) -> Cow<'_, str> {
    if !session_id.contains(['+', '%']) {
        return Cow::Borrowed(session_id);
    }
    let mut escaped = String::with_capacity(session_id.len() + 4);
    for c in session_id.chars() {
        match c {
            '+' => escaped.push_str("%2B"),
            '%' => escaped.push_str("%25"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
