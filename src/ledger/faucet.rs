// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Demo ERC-20 with a public `faucet()` mint, hosted by the local ledger as a
//! forwarding target.

use std::collections::HashMap;

use alloy::{
    primitives::{address, Address, Bytes, U256},
    sol,
    sol_types::{SolCall, SolError, SolInterface, SolValue},
};

use super::local::CallTarget;

/// Address of the faucet token on Sepolia.
pub const SEPOLIA_FAUCET_TOKEN: Address = address!("4cBedDEDA88fDd9e116618a5cD71BB0E440C2A78");

/// Tokens minted per `faucet()` call (1000 with 18 decimals).
pub const FAUCET_DRIP: U256 = U256::from_limbs([0x35C9_ADC5_DEA0_0000, 0x36, 0, 0]);

sol! {
    interface IFaucetToken {
        error ERC20InsufficientBalance(address sender, uint256 balance, uint256 needed);

        function faucet() external;
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 value) external returns (bool);
        function totalSupply() external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

/// In-memory balances for the demo token.
#[derive(Debug, Default, Clone)]
pub struct FaucetToken {
    balances: HashMap<Address, U256>,
    total_supply: U256,
}

impl FaucetToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    /// Calldata for `faucet()`, the call the demo flow relays.
    pub fn faucet_calldata() -> Bytes {
        IFaucetToken::faucetCall {}.abi_encode().into()
    }

    /// Calldata for `transfer(to, value)`.
    pub fn transfer_calldata(to: Address, value: U256) -> Bytes {
        IFaucetToken::transferCall { to, value }.abi_encode().into()
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), Bytes> {
        let balance = self.balance_of(from);
        if balance < value {
            return Err(IFaucetToken::ERC20InsufficientBalance {
                sender: from,
                balance,
                needed: value,
            }
            .abi_encode()
            .into());
        }
        self.balances.insert(from, balance - value);
        *self.balances.entry(to).or_default() += value;
        Ok(())
    }
}

impl CallTarget for FaucetToken {
    fn call(&mut self, sender: Address, data: &Bytes) -> Result<Bytes, Bytes> {
        use IFaucetToken::IFaucetTokenCalls as Call;

        let call = Call::abi_decode(data).map_err(|_| Bytes::new())?;
        let output = match call {
            Call::faucet(_) => {
                *self.balances.entry(sender).or_default() += FAUCET_DRIP;
                self.total_supply += FAUCET_DRIP;
                Vec::new()
            }
            Call::balanceOf(c) => self.balance_of(c.account).abi_encode(),
            Call::transfer(c) => {
                self.transfer(sender, c.to, c.value)?;
                true.abi_encode()
            }
            Call::totalSupply(_) => self.total_supply.abi_encode(),
            Call::decimals(_) => U256::from(18u8).abi_encode(),
        };
        Ok(output.into())
    }
}
