use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
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

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
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

str_enum!(Channel {
    DocumentUpload => "document_upload",
    PhotoCapture => "photo_capture",
    StructuredForm => "structured_form",
    InboundMessage => "inbound_message",
});

str_enum!(QuoteStatus {
    Received => "received",
    Processing => "processing",
    Standardized => "standardized",
    NeedsClarification => "needs_clarification",
    Updated => "updated",
    Reviewed => "reviewed",
    Accepted => "accepted",
    Rejected => "rejected",
    Withdrawn => "withdrawn",
});

impl QuoteStatus {
    /// Accepted, rejected and withdrawn quotes never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Withdrawn)
    }

    /// Still moving through intake or extraction.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Received | Self::Processing | Self::Updated)
    }
}

str_enum!(ExtractionMethod {
    Pattern => "pattern",
    SemanticParse => "semantic_parse",
    StructuredForm => "structured_form",
    VisionText => "vision_text",
    Manual => "manual",
});

impl ExtractionMethod {
    /// Tie-break precedence when two candidates carry equal confidence.
    /// Higher wins.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Manual => 5,
            Self::StructuredForm => 4,
            Self::SemanticParse => 3,
            Self::Pattern => 2,
            Self::VisionText => 1,
        }
    }
}

str_enum!(LineItemType {
    Labor => "labor",
    Material => "material",
    Other => "other",
});

str_enum!(Component {
    Pricing => "pricing",
    Timeline => "timeline",
    Scope => "scope",
    Terms => "terms",
});

str_enum!(TradeCategory {
    Plumbing => "plumbing",
    Electrical => "electrical",
    Hvac => "hvac",
    Roofing => "roofing",
    Flooring => "flooring",
    Appliances => "appliances",
    GeneralMaintenance => "general_maintenance",
});
