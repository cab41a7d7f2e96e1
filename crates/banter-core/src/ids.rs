//! String newtypes for the identifiers that cross the wire.
//!
//! Item and owner IDs are server-assigned and kept verbatim. Client IDs tag
//! local capture connections in logs and are UUID v7.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the raw value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Take the raw value.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

string_id!(
    /// A generated item (one banter response).
    ItemId
);

string_id!(
    /// The account whose event stream is followed.
    OwnerId
);

string_id!(
    /// One locally attached capture client.
    ClientId
);

impl ClientId {
    /// Fresh time-ordered ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_bare_string() {
        let id = ItemId::from("x1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"x1\"");
        assert_eq!(serde_json::from_str::<ItemId>("\"x1\"").unwrap(), id);
    }

    #[test]
    fn derefs_to_str() {
        let owner = OwnerId::from(String::from("streamer-42"));
        assert_eq!(owner.to_string(), "streamer-42");
        assert!(owner.starts_with("streamer"));
        assert!(OwnerId::default().is_empty());
        assert_eq!(owner.into_inner(), "streamer-42");
    }

    #[test]
    fn generated_client_ids_differ() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
