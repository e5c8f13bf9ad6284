use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

macro_rules! newtype {
    ($name:ident, $doc:expr, $pattern:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new instance without validation; callers are responsible for conformity.
            pub fn new(value: String) -> Self {
                Self(value)
            }

            /// Parses a validated identifier from a string.
            pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
                static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
                let s = value.into();
                let re = PATTERN.get_or_init(|| Regex::new($pattern).expect("invalid regex"));
                if !re.is_match(&s) {
                    return Err(ValidationError::PatternMismatch {
                        field: stringify!($name),
                        value: s,
                    });
                }
                Ok(Self(s))
            }

            /// Borrows the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

macro_rules! generated {
    ($name:ident, $prefix:expr) => {
        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(format!("{}{}", $prefix, uuid::Uuid::new_v4().simple()))
            }
        }
    };
}

newtype!(
    CredentialId,
    "Credential identifier (URL-safe, 1-128 chars).",
    r"^[A-Za-z0-9_-]{1,128}$"
);
newtype!(
    SessionId,
    "Session identifier, also used as the opaque session token.",
    r"^[A-Za-z0-9_-]{1,128}$"
);
newtype!(
    EventId,
    "Revocation event identifier.",
    r"^[A-Za-z0-9_-]{1,128}$"
);
newtype!(
    NodeId,
    "Verifier node or gateway identifier (`node1`, `gateway`, ...).",
    r"^[a-z][a-z0-9_-]{0,62}$"
);
newtype!(
    SubjectId,
    "Subject the credential is issued to (typically an e-mail address).",
    r"^[A-Za-z0-9_.@+-]{1,254}$"
);
newtype!(
    Actor,
    "Principal requesting an operation such as a revocation.",
    r"^[A-Za-z0-9_.@+:-]{1,254}$"
);
newtype!(
    EventType,
    "Ledger event type (`REVOKE`, `SESSION_OPEN`, ...).",
    r"^[A-Z][A-Z0-9_]{0,31}$"
);

generated!(CredentialId, "cred_");
generated!(SessionId, "sess_");
generated!(EventId, "rev_");
