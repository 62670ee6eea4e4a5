//! Built-in cross-region inference profile tables.

use crate::region::Geography;
use Geography::{Apac, Eu, Us, UsGov};

/// Region-qualified variants a base model exposes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfiles {
    /// Geographies with a `<geo>.<model>` profile
    pub geographies: Vec<Geography>,
    /// Whether a `global.<model>` profile exists
    pub global: bool,
}

impl ModelProfiles {
    /// Profiles for the given geographies, without a global variant
    #[must_use]
    pub fn geographies(geographies: &[Geography]) -> Self {
        Self {
            geographies: geographies.to_vec(),
            global: false,
        }
    }

    /// Add the global variant
    #[must_use]
    pub fn with_global(mut self) -> Self {
        self.global = true;
        self
    }

    /// Whether the geography has a profile
    #[must_use]
    pub fn has(&self, geography: Geography) -> bool {
        self.geographies.contains(&geography)
    }
}

/// `(base model id, geographies, has global profile)`
pub(crate) const DEFAULT_PROFILES: &[(&str, &[Geography], bool)] = &[
    // Anthropic
    ("anthropic.claude-3-haiku-20240307-v1:0", &[Us, Eu, Apac, UsGov], false),
    ("anthropic.claude-3-sonnet-20240229-v1:0", &[Us, Eu, Apac], false),
    ("anthropic.claude-3-opus-20240229-v1:0", &[Us], false),
    ("anthropic.claude-3-5-haiku-20241022-v1:0", &[Us], false),
    ("anthropic.claude-3-5-sonnet-20240620-v1:0", &[Us, Eu, Apac, UsGov], false),
    ("anthropic.claude-3-5-sonnet-20241022-v2:0", &[Us, Apac], false),
    ("anthropic.claude-3-7-sonnet-20250219-v1:0", &[Us, Eu, Apac], false),
    ("anthropic.claude-sonnet-4-20250514-v1:0", &[Us, Eu, Apac], true),
    ("anthropic.claude-opus-4-20250514-v1:0", &[Us], false),
    ("anthropic.claude-opus-4-1-20250805-v1:0", &[Us], false),
    ("anthropic.claude-sonnet-4-5-20250929-v1:0", &[Us, Eu, Apac], true),
    ("anthropic.claude-haiku-4-5-20251001-v1:0", &[Us, Eu, Apac], true),
    // Amazon
    ("amazon.nova-micro-v1:0", &[Us, Eu, Apac], false),
    ("amazon.nova-lite-v1:0", &[Us, Eu, Apac], false),
    ("amazon.nova-pro-v1:0", &[Us, Eu, Apac], false),
    ("amazon.nova-premier-v1:0", &[Us], false),
    // Meta
    ("meta.llama3-1-8b-instruct-v1:0", &[Us], false),
    ("meta.llama3-1-70b-instruct-v1:0", &[Us], false),
    ("meta.llama3-2-1b-instruct-v1:0", &[Us, Eu], false),
    ("meta.llama3-2-3b-instruct-v1:0", &[Us, Eu], false),
    ("meta.llama3-2-11b-instruct-v1:0", &[Us], false),
    ("meta.llama3-2-90b-instruct-v1:0", &[Us], false),
    ("meta.llama3-3-70b-instruct-v1:0", &[Us], false),
    ("meta.llama4-scout-17b-instruct-v1:0", &[Us], false),
    ("meta.llama4-maverick-17b-instruct-v1:0", &[Us], false),
    // DeepSeek
    ("deepseek.r1-v1:0", &[Us], false),
    // Mistral
    ("mistral.pixtral-large-2502-v1:0", &[Us, Eu], false),
];

/// Regions allowed to use `global.` profiles
pub(crate) const DEFAULT_GLOBAL_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
];
