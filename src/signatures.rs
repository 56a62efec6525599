use std::collections::HashMap;

use alloy::primitives::{B256, keccak256};

pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

pub const SWAP_EVENT: &str = "Swap(address,address,int256,int256,uint160,uint128,int24)";

/// `keccak256(TRANSFER_EVENT)`
pub const TRANSFER_SIGNATURE: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// `keccak256(SWAP_EVENT)`
pub const SWAP_SIGNATURE: &str =
    "0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67";

/// Event signature hash → display name. Used only for message labels.
#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    names: HashMap<B256, String>,
}

impl SignatureTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table with the events the notifier knows out of the box.
    pub fn builtin() -> Self {
        Self::empty()
            .with_event(TRANSFER_EVENT, "Transfer")
            .with_event(SWAP_EVENT, "Swap")
    }

    pub fn with(mut self, signature: B256, name: impl Into<String>) -> Self {
        self.names.insert(signature, name.into());
        self
    }

    /// Register an event by its canonical declaration, e.g. `Approval(address,address,uint256)`.
    pub fn with_event(self, declaration: &str, name: impl Into<String>) -> Self {
        self.with(keccak256(declaration), name)
    }

    /// Display name for a signature, or `""` when unknown.
    pub fn label(&self, signature: &B256) -> &str {
        self.names.get(signature).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
