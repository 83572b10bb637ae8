// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use alloy::primitives::{Address, TxHash};

/// EVM network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Public RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL (empty when the network has none)
    pub explorer_url: &'static str,
}

/// Ethereum Sepolia testnet, where the UserProxy demo is deployed.
pub const SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Sepolia",
    chain_id: 11_155_111,
    rpc_url: "https://rpc.sentio.xyz/sepolia",
    explorer_url: "https://eth-sepolia.blockscout.com",
};

/// Local development chain (anvil / the in-process ledger).
pub const DEVNET: NetworkConfig = NetworkConfig {
    name: "Local Devnet",
    chain_id: 31_337,
    rpc_url: "http://127.0.0.1:8545",
    explorer_url: "",
};

/// Look up a known network by chain id.
pub fn network_for_chain(chain_id: u64) -> Option<NetworkConfig> {
    [SEPOLIA, DEVNET]
        .into_iter()
        .find(|network| network.chain_id == chain_id)
}

impl NetworkConfig {
    /// Explorer link for a transaction.
    pub fn tx_url(&self, tx_hash: &TxHash) -> Option<String> {
        if self.explorer_url.is_empty() {
            return None;
        }
        Some(format!("{}/tx/{tx_hash}", self.explorer_url))
    }

    /// Explorer link for an account or contract.
    pub fn address_url(&self, address: &Address) -> Option<String> {
        if self.explorer_url.is_empty() {
            return None;
        }
        Some(format!("{}/address/{address}", self.explorer_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_networks() {
        assert_eq!(network_for_chain(11_155_111), Some(SEPOLIA));
        assert_eq!(network_for_chain(31_337), Some(DEVNET));
        assert_eq!(network_for_chain(1), None);
    }

    #[test]
    fn explorer_links() {
        let hash = TxHash::repeat_byte(0xab);
        let url = SEPOLIA.tx_url(&hash).unwrap();
        assert!(url.starts_with("https://eth-sepolia.blockscout.com/tx/0xabab"));
        assert_eq!(DEVNET.tx_url(&hash), None);
        assert!(SEPOLIA
            .address_url(&Address::ZERO)
            .unwrap()
            .ends_with("/address/0x0000000000000000000000000000000000000000"));
    }
}
