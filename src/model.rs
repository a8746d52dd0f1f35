use serde::{Deserialize, Serialize};
use std::fmt;

/// An enum whose members are addressed by fixed literal names on the wire.
///
/// Filter parameters arrive as untrusted strings; `parse_literal` is the only
/// way they become typed values.
pub trait Literal: Sized + Copy + 'static {
    /// Field name used in error messages (e.g. "severity").
    const FIELD: &'static str;

    /// Every member, in declaration order.
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    /// The literal set rendered for humans: "Critical, High, Medium, Low".
    fn literal_set() -> String {
        Self::ALL
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Normalise `raw` and match it against the literal set.
    ///
    /// Matching is case-insensitive over the whole literal, so `in_progress`
    /// resolves to `In_Progress` even though plain first-letter
    /// capitalisation would yield `In_progress`.
    fn parse_literal(raw: &str) -> Option<Self> {
        let normalized = capitalize_first(raw.trim());
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(&normalized))
    }
}

/// Upper-case the first character and lower-case the rest.
pub fn capitalize_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

macro_rules! literal_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal { $($variant:ident => $lit:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $lit)]
                $variant,
            )+
        }

        impl Literal for $name {
            const FIELD: &'static str = $field;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $lit,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

literal_enum!(
    /// How bad an incident is.
    Severity, "severity" {
        Critical => "Critical",
        High => "High",
        Medium => "Medium",
        Low => "Low",
    }
);

literal_enum!(
    /// Lifecycle state of an incident.
    State, "state" {
        Open => "Open",
        Close => "Close",
        InProgress => "In_Progress",
    }
);

literal_enum!(
    /// Triage priority of an incident.
    Priority, "priority" {
        High => "High",
        Medium => "Medium",
        Low => "Low",
    }
);
