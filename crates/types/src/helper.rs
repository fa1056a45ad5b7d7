//! Supported AUR helpers

use std::str::FromStr;

use lunaris_errors::HelperError;
use serde::{Deserialize, Serialize};

/// An AUR helper the installer knows how to bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelperKind {
    #[default]
    Yay,
    Paru,
}

impl HelperKind {
    pub const ALL: [HelperKind; 2] = [HelperKind::Yay, HelperKind::Paru];

    /// Executable name, also the AUR package name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Yay => "yay",
            Self::Paru => "paru",
        }
    }

    /// Git URL of the helper's build recipe.
    #[must_use]
    pub fn recipe_url(self) -> String {
        format!("https://aur.archlinux.org/{}.git", self.name())
    }
}

impl FromStr for HelperKind {
    type Err = HelperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yay" => Ok(Self::Yay),
            "paru" => Ok(Self::Paru),
            other => Err(HelperError::Unsupported {
                helper: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for HelperKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl clap::ValueEnum for HelperKind {
    fn value_variants<'a>() -> &'a [Self] {
        &Self::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.name()))
    }
}
