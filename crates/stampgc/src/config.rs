//! Configuration Module - metadata construction parameters
//!
//! Controls how the tables are built: the bit layout of tagged references,
//! how multiply-inherited classes are recognised, and how strictly scan
//! descriptors are checked against the declared layout.

use crate::object::{TagScheme, OBJECT_ALIGNMENT};
use serde::{Deserialize, Serialize};

/// How classes reached through a secondary base are recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Derive ambiguity from the declared hierarchy; annotations may only
    /// force a class ambiguous
    #[default]
    Automatic,

    /// Every multiply-inherited class must carry an explicit annotation;
    /// unannotated ones are rejected at build time
    ExplicitOnly,
}

/// Main configuration for metadata construction
///
/// # Examples
///
/// ```rust
/// use stampgc::{AmbiguityPolicy, MetadataConfig};
///
/// let config = MetadataConfig {
///     ambiguity_policy: AmbiguityPolicy::ExplicitOnly,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Bit layout of tagged references
    ///
    /// Default: 3 low tag bits, no high tag bits, even low tags are immediates
    pub tag_scheme: TagScheme,

    /// Ambiguity detection policy
    ///
    /// Default: `Automatic`
    pub ambiguity_policy: AmbiguityPolicy,

    /// Require the length field of a trailing array to be declared as plain data
    ///
    /// Default: true
    pub strict_layouts: bool,

    /// Largest stamp a class may use
    ///
    /// Stamp-indexed tables are dense, so this also bounds their size.
    ///
    /// Default: 1 << 20
    pub max_stamp: u32,

    /// Echo metadata events to the console once installed
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            tag_scheme: TagScheme::default(),
            ambiguity_policy: AmbiguityPolicy::Automatic,
            strict_layouts: true,
            max_stamp: DEFAULT_MAX_STAMP,
            verbose: false,
        }
    }
}

impl MetadataConfig {
    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stampgc::{MetadataConfig, TagScheme};
    ///
    /// let config = MetadataConfig {
    ///     tag_scheme: TagScheme { low_tag_bits: 5, ..TagScheme::default() },
    ///     ..Default::default()
    /// };
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheme = &self.tag_scheme;
        let alignment_bits = OBJECT_ALIGNMENT.trailing_zeros();

        if scheme.low_tag_bits > alignment_bits {
            return Err(ConfigError::InvalidTagBits(format!(
                "low_tag_bits {} exceeds the {} bits freed by {}-byte object alignment",
                scheme.low_tag_bits, alignment_bits, OBJECT_ALIGNMENT
            )));
        }

        if scheme.high_tag_mask & scheme.low_mask() != 0 {
            return Err(ConfigError::InvalidTagBits(
                "high_tag_mask overlaps the low tag bits".to_string(),
            ));
        }

        if scheme.high_tag_mask & ADDRESS_BITS_MASK != 0 {
            return Err(ConfigError::InvalidTagBits(format!(
                "high_tag_mask {:#x} overlaps the {}-bit address space",
                scheme.high_tag_mask, ADDRESS_BITS
            )));
        }

        let tag_values = 1u64 << scheme.low_tag_bits;
        if tag_values < 32 && u64::from(scheme.immediate_tags) >> tag_values != 0 {
            return Err(ConfigError::InvalidImmediateTags(format!(
                "immediate_tags {:#b} names tag values beyond {} low bits",
                scheme.immediate_tags, scheme.low_tag_bits
            )));
        }

        let all_tags = ((1u64 << tag_values) - 1) as u32;
        if scheme.immediate_tags & all_tags == all_tags {
            return Err(ConfigError::InvalidImmediateTags(
                "every low tag is an immediate, no tag is left for pointers".to_string(),
            ));
        }

        if self.max_stamp == 0 || self.max_stamp == u32::MAX {
            return Err(ConfigError::InvalidStampLimit(format!(
                "max_stamp must lie in 1..{}, got {}",
                u32::MAX,
                self.max_stamp
            )));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with:
    /// - STAMPGC_LOW_TAG_BITS
    /// - STAMPGC_HIGH_TAG_MASK (decimal or `0x` hex)
    /// - STAMPGC_IMMEDIATE_TAGS (decimal or `0x` hex bitset)
    /// - STAMPGC_AMBIGUITY (`automatic` or `explicit`)
    /// - STAMPGC_STRICT_LAYOUTS
    /// - STAMPGC_MAX_STAMP
    /// - STAMPGC_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("STAMPGC_LOW_TAG_BITS") {
            if let Ok(bits) = val.parse::<u32>() {
                config.tag_scheme.low_tag_bits = bits;
            }
        }

        if let Ok(val) = std::env::var("STAMPGC_HIGH_TAG_MASK") {
            if let Some(mask) = parse_number(&val) {
                config.tag_scheme.high_tag_mask = mask as usize;
            }
        }

        if let Ok(val) = std::env::var("STAMPGC_IMMEDIATE_TAGS") {
            if let Some(tags) = parse_number(&val) {
                config.tag_scheme.immediate_tags = tags as u32;
            }
        }

        if let Ok(val) = std::env::var("STAMPGC_AMBIGUITY") {
            if val.eq_ignore_ascii_case("explicit") {
                config.ambiguity_policy = AmbiguityPolicy::ExplicitOnly;
            } else if val.eq_ignore_ascii_case("automatic") {
                config.ambiguity_policy = AmbiguityPolicy::Automatic;
            }
        }

        if let Ok(val) = std::env::var("STAMPGC_STRICT_LAYOUTS") {
            config.strict_layouts = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("STAMPGC_MAX_STAMP") {
            if let Some(max) = parse_number(&val).and_then(|max| u32::try_from(max).ok()) {
                config.max_stamp = max;
            }
        }

        if let Ok(val) = std::env::var("STAMPGC_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid tag bits: {0}")]
    InvalidTagBits(String),

    #[error("Invalid immediate tags: {0}")]
    InvalidImmediateTags(String),

    #[error("Invalid stamp limit: {0}")]
    InvalidStampLimit(String),
}

// ============================================================================
// CONSTANTS & HELPERS
// ============================================================================

/// Default bound on stamps
pub const DEFAULT_MAX_STAMP: u32 = 1 << 20;

/// Virtual address bits a heap object may occupy
const ADDRESS_BITS: u32 = 48;

const ADDRESS_BITS_MASK: usize = ((1u64 << ADDRESS_BITS) - 1) as usize;

fn parse_number(val: &str) -> Option<u64> {
    let trimmed = val.trim();
    match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => trimmed.parse::<u64>().ok(),
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}
