//! AWS region to inference-profile geography mapping.

use std::fmt;

/// Geography prefix of a cross-region inference profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Geography {
    /// United States commercial regions (`us.`)
    Us,
    /// European regions (`eu.`)
    Eu,
    /// Asia Pacific regions (`apac.`)
    Apac,
    /// AWS GovCloud regions (`us-gov.`)
    UsGov,
}

impl Geography {
    /// All geographies, in prefix-matching order
    pub const ALL: [Self; 4] = [Self::UsGov, Self::Us, Self::Eu, Self::Apac];

    /// Model id prefix without the trailing dot
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Eu => "eu",
            Self::Apac => "apac",
            Self::UsGov => "us-gov",
        }
    }

    /// Parse a prefix such as `eu`
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.prefix() == prefix)
    }
}

impl fmt::Display for Geography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Prefix of the global (cross-geography) profile, without the dot
pub const GLOBAL_PREFIX: &str = "global";

// Ordered: the GovCloud pattern must be tested before the commercial `us-` one.
const REGION_PATTERNS: &[(&str, Geography)] = &[
    ("us-gov-", Geography::UsGov),
    ("us-", Geography::Us),
    ("ca-", Geography::Us),
    ("eu-", Geography::Eu),
    ("ap-", Geography::Apac),
];

/// Canonical region name: trimmed and lowercased
#[must_use]
pub fn normalize_region(region: &str) -> String {
    region.trim().to_ascii_lowercase()
}

/// Geography for an AWS region, or `None` for regions without profiles
#[must_use]
pub fn geography_for_region(region: &str) -> Option<Geography> {
    let region = normalize_region(region);
    REGION_PATTERNS
        .iter()
        .find(|(pattern, _)| region.starts_with(pattern))
        .map(|(_, geography)| *geography)
}

/// Split an already-qualified model id into its prefix and base id
#[must_use]
pub fn split_qualified(model_id: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = model_id.split_once('.')?;
    let known = prefix == GLOBAL_PREFIX || Geography::from_prefix(prefix).is_some();
    // Base ids themselves contain a dot (`anthropic.claude-...`)
    (known && rest.contains('.')).then_some((prefix, rest))
}
