//! Identifier types for meterd.
//!
//! Entitlements and subjects use UUIDs. Grants and reset events use ULIDs:
//! ULIDs sort by creation time, which gives grant listings their documented
//! secondary ordering (priority first, then creation time) and lets reset
//! events be range-scanned chronologically in the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Define a UUID-backed identifier newtype with the standard trait set.
///
/// Generates `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, string-based
/// `Serialize`/`Deserialize`, `FromStr`, `Display`, `Debug`,
/// `TryFrom<String>`, `Into<String>`, and `AsRef<[u8]>`.
macro_rules! uuid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create an identifier from a UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the bytes of the UUID (16 bytes).
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

/// Define a ULID-backed identifier newtype with the standard trait set.
///
/// ULID ids are time-ordered; `to_bytes`/`from_bytes` expose the 16-byte
/// big-endian form used directly as store keys.
macro_rules! ulid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// Create an identifier from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Generate a new identifier with the current timestamp.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Return the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> &Ulid {
                &self.0
            }

            /// Return the bytes of the ULID (16 bytes, big-endian).
            #[must_use]
            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }

            /// Create an identifier from 16 raw bytes.
            ///
            /// # Errors
            ///
            /// Returns an error if the bytes are not a valid ULID.
            pub fn from_bytes(bytes: [u8; 16]) -> Result<Self, IdError> {
                Ok(Self(Ulid::from_bytes(bytes)))
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
                Ok(Self(ulid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

uuid_id_type!(
    EntitlementId,
    "An entitlement identifier (UUID).\n\nOne entitlement grants one subject access to one feature."
);
uuid_id_type!(
    SubjectId,
    "A subject identifier (UUID).\n\nSubjects are the customers or users entitlements belong to."
);

ulid_id_type!(
    GrantId,
    "A grant identifier (ULID, time-ordered).\n\nCreation-time ordering of grant ids is the tie-break for equal-priority burn-down."
);
ulid_id_type!(
    ResetId,
    "A reset-event identifier (ULID, time-ordered)."
);

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entitlement_id_roundtrip() {
        let id = EntitlementId::generate();
        let parsed = EntitlementId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn entitlement_id_serde_json() {
        let id = EntitlementId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: EntitlementId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn grant_id_roundtrip() {
        let id = GrantId::generate();
        let parsed = GrantId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn grant_id_bytes_roundtrip() {
        let id = GrantId::generate();
        let parsed = GrantId::from_bytes(id.to_bytes()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn grant_ids_order_by_creation() {
        let a = GrantId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = GrantId::generate();
        assert!(a < b);
    }

    #[test]
    fn invalid_uuid_rejected() {
        assert_eq!(
            "not-a-uuid".parse::<EntitlementId>(),
            Err(IdError::InvalidUuid)
        );
    }

    #[test]
    fn invalid_ulid_rejected() {
        assert_eq!("!!!".parse::<GrantId>(), Err(IdError::InvalidUlid));
    }
}
