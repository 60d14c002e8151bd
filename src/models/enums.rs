use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// Lifecycle of a dataset from upload to a fully labeled state.
    DatasetStatus {
        Uploaded => "uploaded",
        Configured => "configured",
        Labeling => "labeling",
        Completed => "completed",
        Error => "error",
    }
);

str_enum!(
    /// Triage state of a single item.
    ///
    /// `Pending` until a label is assigned, then one of the three confidence
    /// bands, and finally `Reviewed` once a human has acted on it.
    ReviewStatus {
        Pending => "pending",
        AutoAccepted => "auto_accepted",
        NeedsReview => "needs_review",
        LowConfidence => "low_confidence",
        Reviewed => "reviewed",
    }
);
