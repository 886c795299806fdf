use super::ModelError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(LabOrderStatus {
    Requested => "Requested",
    Completed => "Completed",
});

// Wire codes used by the case service when it refuses a mutation.
str_enum!(RejectionReason {
    ExceedsOrderedQuantity => "EXCEEDS_ORDERED_QUANTITY",
    InsufficientStock => "INSUFFICIENT_STOCK",
    AlreadyDispensed => "ALREADY_DISPENSED",
    InvalidQuantity => "INVALID_QUANTITY",
    AlreadyCompleted => "ALREADY_COMPLETED",
    InvalidResult => "INVALID_RESULT",
    InvalidTestName => "INVALID_TEST_NAME",
    CaseClosed => "CASE_CLOSED",
});

str_enum!(AttachmentKind {
    Image => "image",
    Audio => "audio",
});
