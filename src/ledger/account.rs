// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The `UserProxy` account: owner, nonce, verify-then-forward.
//!
//! Mirrors `contracts/UserProxy.sol`. A failed forwarded call still consumes
//! the nonce; only signature and nonce rejections leave state untouched.

use alloy::primitives::{Address, Bytes, U256};

use super::{ExecuteCall, ExecutionResult, ProxyError};
use crate::codec::{self, ProxyDomain};

/// One user's delegated-execution account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAccount {
    domain: ProxyDomain,
    owner: Address,
    nonce: U256,
}

impl ProxyAccount {
    /// Construct an active account. There is no uninitialized instance: the
    /// owner is bound here or construction fails.
    pub fn new(domain: ProxyDomain, owner: Address) -> Result<Self, ProxyError> {
        if owner == Address::ZERO {
            return Err(ProxyError::InvalidOwner);
        }
        Ok(Self {
            domain,
            owner,
            nonce: U256::ZERO,
        })
    }

    pub fn address(&self) -> Address {
        self.domain.verifying_contract
    }

    pub fn domain(&self) -> &ProxyDomain {
        &self.domain
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }

    /// Signature and nonce checks of `execute`, without mutating anything.
    pub fn authorize(&self, call: &ExecuteCall) -> Result<(), ProxyError> {
        let canonical = codec::encode(&call.request(), &self.domain);
        let signer = codec::recover_signer(&canonical, &call.signature)
            .map_err(|_| ProxyError::InvalidSignature)?;

        if signer != self.owner {
            return Err(ProxyError::Unauthorized { signer });
        }
        if call.nonce != self.nonce {
            return Err(ProxyError::StaleNonce {
                expected: self.nonce,
                provided: call.nonce,
            });
        }
        Ok(())
    }

    /// Verify `call`, consume the nonce, and forward the call through `forward`.
    ///
    /// `forward` receives `(sender, target, data)` and returns the callee's
    /// return data or revert data.
    pub fn execute<F>(
        &mut self,
        call: &ExecuteCall,
        forward: F,
    ) -> Result<ExecutionResult, ProxyError>
    where
        F: FnOnce(Address, Address, &Bytes) -> Result<Bytes, Bytes>,
    {
        self.authorize(call)?;

        self.nonce += U256::from(1);

        let result = match forward(self.address(), call.target, &call.data) {
            Ok(output) => ExecutionResult {
                success: true,
                output,
            },
            Err(revert) => ExecutionResult {
                success: false,
                output: revert,
            },
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{signing_hash, AuthorizationRequest, RelaySignature};
    use alloy::signers::{local::PrivateKeySigner, SignerSync};

    const CHAIN_ID: u64 = 31337;

    fn proxy_for(owner: &PrivateKeySigner) -> ProxyAccount {
        let domain = ProxyDomain::new(CHAIN_ID, Address::repeat_byte(0x50));
        ProxyAccount::new(domain, owner.address()).unwrap()
    }

    fn signed_call(signer: &PrivateKeySigner, proxy: &ProxyAccount, nonce: u64) -> ExecuteCall {
        let request =
            AuthorizationRequest::new(Address::repeat_byte(0x77), vec![1, 2, 3], U256::from(nonce));
        let signature: RelaySignature = signer
            .sign_hash_sync(&signing_hash(&request, proxy.domain()))
            .unwrap()
            .into();
        ExecuteCall {
            target: request.target,
            data: request.data,
            nonce: request.nonce,
            signature,
        }
    }

    fn echo(_: Address, _: Address, data: &Bytes) -> Result<Bytes, Bytes> {
        Ok(data.clone())
    }

    #[test]
    fn zero_owner_is_rejected() {
        let domain = ProxyDomain::new(CHAIN_ID, Address::repeat_byte(0x50));
        assert_eq!(
            ProxyAccount::new(domain, Address::ZERO),
            Err(ProxyError::InvalidOwner)
        );
    }

    #[test]
    fn owner_executes_exactly_once() {
        let owner = PrivateKeySigner::random();
        let mut proxy = proxy_for(&owner);
        let call = signed_call(&owner, &proxy, 0);

        let result = proxy.execute(&call, echo).unwrap();
        assert!(result.success);
        assert_eq!(result.output, Bytes::from(vec![1, 2, 3]));
        assert_eq!(proxy.nonce(), U256::from(1));

        assert_eq!(
            proxy.execute(&call, echo),
            Err(ProxyError::StaleNonce {
                expected: U256::from(1),
                provided: U256::ZERO
            })
        );
        assert_eq!(proxy.nonce(), U256::from(1));
    }

    #[test]
    fn foreign_signer_is_unauthorized_regardless_of_nonce() {
        let owner = PrivateKeySigner::random();
        let intruder = PrivateKeySigner::random();
        let mut proxy = proxy_for(&owner);

        for nonce in [0, 1, 5] {
            let call = signed_call(&intruder, &proxy, nonce);
            assert_eq!(
                proxy.execute(&call, echo),
                Err(ProxyError::Unauthorized {
                    signer: intruder.address()
                })
            );
        }
        assert_eq!(proxy.nonce(), U256::ZERO);
    }

    #[test]
    fn nonce_is_monotonic_and_old_nonces_never_succeed() {
        let owner = PrivateKeySigner::random();
        let mut proxy = proxy_for(&owner);

        for n in 0..5 {
            let call = signed_call(&owner, &proxy, n);
            proxy.execute(&call, echo).unwrap();
        }
        assert_eq!(proxy.nonce(), U256::from(5));

        for n in 0..5 {
            let call = signed_call(&owner, &proxy, n);
            assert!(matches!(
                proxy.execute(&call, echo),
                Err(ProxyError::StaleNonce { .. })
            ));
        }
    }

    #[test]
    fn future_nonce_is_rejected() {
        let owner = PrivateKeySigner::random();
        let mut proxy = proxy_for(&owner);
        let call = signed_call(&owner, &proxy, 3);

        assert!(matches!(
            proxy.execute(&call, echo),
            Err(ProxyError::StaleNonce { .. })
        ));
    }

    #[test]
    fn tampered_fields_do_not_authorize() {
        let owner = PrivateKeySigner::random();
        let proxy = proxy_for(&owner);
        let call = signed_call(&owner, &proxy, 0);

        let mut target = call.clone();
        target.target = Address::repeat_byte(0x01);
        let mut data = call.clone();
        data.data = Bytes::from(vec![9]);
        let mut nonce = call.clone();
        nonce.nonce = U256::from(1);

        for tampered in [target, data, nonce] {
            let err = proxy.authorize(&tampered).unwrap_err();
            assert!(matches!(
                err,
                ProxyError::Unauthorized { .. } | ProxyError::InvalidSignature
            ));
        }
    }

    #[test]
    fn signature_for_another_proxy_is_rejected() {
        let owner = PrivateKeySigner::random();
        let proxy_a = proxy_for(&owner);
        let domain_b = ProxyDomain::new(CHAIN_ID, Address::repeat_byte(0x51));
        let mut proxy_b = ProxyAccount::new(domain_b, owner.address()).unwrap();
        let call = signed_call(&owner, &proxy_a, 0);

        assert!(matches!(
            proxy_b.execute(&call, echo),
            Err(ProxyError::Unauthorized { .. })
        ));
    }

    #[test]
    fn signature_from_another_chain_is_rejected() {
        let owner = PrivateKeySigner::random();
        let proxy = proxy_for(&owner);
        let forked_domain = ProxyDomain::new(CHAIN_ID + 1, proxy.address());
        let mut forked = ProxyAccount::new(forked_domain, owner.address()).unwrap();
        let call = signed_call(&owner, &proxy, 0);

        assert!(matches!(
            forked.execute(&call, echo),
            Err(ProxyError::Unauthorized { .. })
        ));
        assert_eq!(forked.nonce(), U256::ZERO);
    }

    #[test]
    fn failed_forward_still_consumes_nonce() {
        let owner = PrivateKeySigner::random();
        let mut proxy = proxy_for(&owner);
        let call = signed_call(&owner, &proxy, 0);

        let result = proxy
            .execute(&call, |_, _, _| Err(Bytes::from_static(b"nope")))
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, Bytes::from_static(b"nope"));
        assert_eq!(proxy.nonce(), U256::from(1));
    }

    #[test]
    fn forward_sees_proxy_as_sender() {
        let owner = PrivateKeySigner::random();
        let mut proxy = proxy_for(&owner);
        let call = signed_call(&owner, &proxy, 0);
        let expected = proxy.address();

        proxy
            .execute(&call, |sender, target, _| {
                assert_eq!(sender, expected);
                assert_eq!(target, Address::repeat_byte(0x77));
                Ok(Bytes::new())
            })
            .unwrap();
    }

    #[test]
    fn malformed_signature_is_invalid() {
        let owner = PrivateKeySigner::random();
        let mut proxy = proxy_for(&owner);
        let mut call = signed_call(&owner, &proxy, 0);
        call.signature.v = 3;

        assert_eq!(proxy.execute(&call, echo), Err(ProxyError::InvalidSignature));
        assert_eq!(proxy.nonce(), U256::ZERO);
    }
}
