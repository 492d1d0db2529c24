//! Pass configuration.
//!
//! The tagging scheme reserves one flag bit in every 64-bit pointer and
//! stores the byte offset of derived pointers above it:
//!
//! ```text
//!  63            49  48  47                              0
//! +----------------+----+--------------------------------+
//! | embedded offset|flag|            address             |
//! +----------------+----+--------------------------------+
//! ```
//!
//! The symbol prefixes drive the name-based vtable heuristics and the
//! exclusion of runtime-support functions.

use crate::error::{CanonPtrError, CanonPtrResult};
use serde::{Deserialize, Serialize};

/// Configuration for [`CanonPtrPass`](crate::pass::CanonPtrPass).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonPtrConfig {
    /// Bit that enables offset embedding for a pointer
    pub flag_bit: u32,

    /// Left shift applied to the byte offset before it is added
    pub offset_shift: u32,

    /// Functions whose names start with this prefix belong to the runtime
    pub runtime_prefix: String,

    /// Base pointers named with this prefix are vtable loads
    pub vtable_prefix: String,

    /// Single indices named with this prefix are virtual-base offsets
    pub vbase_offset_prefix: String,

    /// Mangled-name prefix of vtable globals
    pub vtable_symbol_prefix: String,
}

impl Default for CanonPtrConfig {
    fn default() -> Self {
        Self {
            flag_bit: 48,
            offset_shift: 49,
            runtime_prefix: "__canonptr_".to_string(),
            vtable_prefix: "vtable".to_string(),
            vbase_offset_prefix: "vbase.offset".to_string(),
            vtable_symbol_prefix: "_ZTV".to_string(),
        }
    }
}

impl CanonPtrConfig {
    /// Validate bit positions.
    ///
    /// - `flag_bit` must be a bit of a 64-bit word
    /// - `offset_shift` must place the offset strictly above the flag bit
    pub fn validate(&self) -> CanonPtrResult<()> {
        if self.flag_bit >= 64 {
            return Err(CanonPtrError::InvalidConfig(format!(
                "flag_bit must be below 64 (got {})",
                self.flag_bit
            )));
        }
        if self.offset_shift >= 64 {
            return Err(CanonPtrError::InvalidConfig(format!(
                "offset_shift must be below 64 (got {})",
                self.offset_shift
            )));
        }
        if self.offset_shift <= self.flag_bit {
            return Err(CanonPtrError::InvalidConfig(format!(
                "offset_shift ({}) must be above flag_bit ({})",
                self.offset_shift, self.flag_bit
            )));
        }
        Ok(())
    }

    /// Mask selecting the flag bit.
    pub fn flag_mask(&self) -> u64 {
        1u64 << self.flag_bit
    }

    /// Number of offset bits that fit above `offset_shift`.
    pub fn offset_bits(&self) -> u32 {
        64 - self.offset_shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = CanonPtrConfig::default();
        config.validate().unwrap();
        assert_eq!(config.flag_mask(), 1 << 48);
        assert_eq!(config.offset_bits(), 15);
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let config = CanonPtrConfig {
            offset_shift: 48,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CanonPtrError::InvalidConfig(_))));

        let config = CanonPtrConfig {
            flag_bit: 64,
            offset_shift: 65,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CanonPtrConfig = serde_json::from_str(r#"{ "flag_bit": 40, "offset_shift": 41 }"#).unwrap();
        assert_eq!(config.flag_bit, 40);
        assert_eq!(config.offset_shift, 41);
        assert_eq!(config.runtime_prefix, "__canonptr_");
        config.validate().unwrap();
    }
}
