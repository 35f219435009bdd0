//! Type-safe string identifiers for stations and picks.
//!
//! Station codes and pick ids both travel as plain strings on the wire.
//! Wrapping them prevents a pick id from being used as a map key where a
//! station code is expected.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_code {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a string value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
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

        impl core::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_code! {
    /// Bare station code (e.g. `A024`), the key of every per-station record.
    StationCode
}

define_code! {
    /// Opaque pick identity as published upstream.
    ///
    /// Republished picks may change their id, so this is carried for
    /// display only and never used for deduplication.
    PickId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_code_serializes_as_plain_string() {
        let code = StationCode::new("A024");
        let json = serde_json::to_string(&code).unwrap_or_default();
        assert_eq!(json, "\"A024\"");
    }

    #[test]
    fn codes_order_lexicographically() {
        let a = StationCode::from("A024");
        let b = StationCode::from("B131");
        assert!(a < b);
        assert_eq!(a.to_string(), "A024");
    }
}
