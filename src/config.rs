//! Construction-time configuration for a `Node`.
//!
//! Page size and the inline-storage thresholds are session parameters
//! rather than compile-time constants, the same way `PageCacheConfig` one
//! layer up is a small `Default`-implementing struct handed to a
//! constructor instead of baked-in constants.

use crate::errors::NodeError;

#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    pub page_size: usize,
    pub inline_keys_threshold: usize,
    pub inline_values_threshold: usize,
    /// When set, `delete` on a leaf marks a tombstone instead of physically
    /// removing the slot (spec.md §4.5 / §3 invariant 6: internal nodes
    /// never use this).
    pub tombstone_mode: bool,
    pub encoders_version: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            inline_keys_threshold: 64,
            inline_values_threshold: 64,
            tombstone_mode: false,
            encoders_version: 0,
        }
    }
}

impl NodeConfig {
    /// Sanity-check construction parameters, the node-layer analogue of the
    /// checks `BTree::create` runs on `page_size` one layer up.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.page_size <= crate::header::HEADER_SIZE {
            return Err(NodeError::invariant(format!(
                "page_size {} too small for header of {} bytes",
                self.page_size,
                crate::header::HEADER_SIZE
            )));
        }
        if self.page_size > u16::MAX as usize {
            return Err(NodeError::invariant(format!(
                "page_size {} too large for u16 in-page offsets",
                self.page_size
            )));
        }
        if self.inline_keys_threshold == 0 || self.inline_values_threshold == 0 {
            return Err(NodeError::invariant(
                "inline thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
