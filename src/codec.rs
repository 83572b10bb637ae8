// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Codec
//!
//! Builds the canonical EIP-712 message that a proxy owner signs, and recovers
//! the signer from a `(v, r, s)` triple.
//!
//! ## Typed Data
//!
//! ```text
//! SignedAccess(address target,bytes data,uint256 nonce)
//!
//! domain = { name: "UserProxy", version: "1", chainId, verifyingContract: <proxy> }
//! ```
//!
//! The canonical bytes are the EIP-712 preimage
//! `0x19 ‖ 0x01 ‖ domainSeparator ‖ hashStruct(message)`; their keccak256 is the
//! digest wallets sign for `eth_signTypedData_v4`. Binding the proxy address and
//! chain id into the domain makes a signature useless on any other proxy or
//! network.

use alloy::{
    primitives::{keccak256, Address, Bytes, Signature, B256, U256},
    sol,
    sol_types::{Eip712Domain, SolStruct},
};
use serde::{Deserialize, Serialize};

/// EIP-712 domain name of the UserProxy contract.
pub const DOMAIN_NAME: &str = "UserProxy";

/// EIP-712 domain version of the UserProxy contract.
pub const DOMAIN_VERSION: &str = "1";

/// Length of the canonical preimage: 2 prefix bytes + two 32-byte hashes.
pub const CANONICAL_LEN: usize = 66;

/// secp256k1 group order `n`.
const SECP256K1_N: U256 = U256::from_limbs([
    0xBFD2_5E8C_D036_4141,
    0xBAAE_DCE6_AF48_A03B,
    0xFFFF_FFFF_FFFF_FFFE,
    0xFFFF_FFFF_FFFF_FFFF,
]);

/// `n / 2`; signatures with `s` above this are rejected as malleable.
const SECP256K1_HALF_N: U256 = U256::from_limbs([
    0xDFE9_2F46_681B_20A0,
    0x5D57_6E73_57A4_501D,
    0xFFFF_FFFF_FFFF_FFFF,
    0x7FFF_FFFF_FFFF_FFFF,
]);

sol! {
    /// The typed structure a proxy owner signs.
    struct SignedAccess {
        address target;
        bytes data;
        uint256 nonce;
    }
}

/// Errors produced while decoding or recovering a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("canonical message must be {CANONICAL_LEN} bytes starting with 0x1901, got {0} bytes")]
    MalformedMessage(usize),
}

/// The domain a signature is bound to: one proxy on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyDomain {
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl ProxyDomain {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            chain_id,
            verifying_contract,
        }
    }

    /// The alloy EIP-712 domain for this proxy.
    pub fn eip712(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(DOMAIN_NAME.into()),
            Some(DOMAIN_VERSION.into()),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }

    /// `hashStruct(EIP712Domain)`.
    pub fn separator(&self) -> B256 {
        self.eip712().separator()
    }
}

/// The unsigned payload of a relay: what the owner authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub target: Address,
    pub data: Bytes,
    pub nonce: U256,
}

impl AuthorizationRequest {
    pub fn new(target: Address, data: impl Into<Bytes>, nonce: U256) -> Self {
        Self {
            target,
            data: data.into(),
            nonce,
        }
    }

    fn as_typed(&self) -> SignedAccess {
        SignedAccess {
            target: self.target,
            data: self.data.clone(),
            nonce: self.nonce,
        }
    }

    /// `hashStruct(SignedAccess)`.
    pub fn struct_hash(&self) -> B256 {
        self.as_typed().eip712_hash_struct()
    }
}

/// Build the canonical bytes that are hashed and signed.
pub fn encode(request: &AuthorizationRequest, domain: &ProxyDomain) -> Bytes {
    let mut out = Vec::with_capacity(CANONICAL_LEN);
    out.extend_from_slice(&[0x19, 0x01]);
    out.extend_from_slice(domain.separator().as_slice());
    out.extend_from_slice(request.struct_hash().as_slice());
    out.into()
}

/// The EIP-712 digest for `request` under `domain`.
pub fn signing_hash(request: &AuthorizationRequest, domain: &ProxyDomain) -> B256 {
    keccak256(encode(request, domain))
}

/// ECDSA signature in the `(v, r, s)` form the proxy contract takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySignature {
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

impl RelaySignature {
    pub fn new(v: u8, r: B256, s: B256) -> Self {
        Self { v, r, s }
    }

    /// Split a 65-byte `r ‖ s ‖ v` signature, as returned by wallets.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != 65 {
            return Err(CodecError::InvalidSignature(format!(
                "expected 65 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            r: B256::from_slice(&bytes[..32]),
            s: B256::from_slice(&bytes[32..64]),
            v: bytes[64],
        })
    }

    /// Join back into `r ‖ s ‖ v`.
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v;
        out
    }

    /// y-parity encoded by `v`. Accepts both `{0, 1}` and `{27, 28}`.
    fn y_parity(&self) -> Result<bool, CodecError> {
        match self.v {
            0 | 27 => Ok(false),
            1 | 28 => Ok(true),
            other => Err(CodecError::InvalidSignature(format!(
                "unsupported recovery id {other}"
            ))),
        }
    }

    /// Validate scalar ranges and convert to an alloy signature.
    pub fn to_signature(&self) -> Result<Signature, CodecError> {
        let parity = self.y_parity()?;
        let r = U256::from_be_bytes(self.r.0);
        let s = U256::from_be_bytes(self.s.0);

        if r.is_zero() || r >= SECP256K1_N {
            return Err(CodecError::InvalidSignature("r out of range".to_string()));
        }
        if s.is_zero() || s >= SECP256K1_N {
            return Err(CodecError::InvalidSignature("s out of range".to_string()));
        }
        if s > SECP256K1_HALF_N {
            return Err(CodecError::InvalidSignature(
                "s is in the upper half of the curve order".to_string(),
            ));
        }

        Ok(Signature::new(r, s, parity))
    }
}

impl From<Signature> for RelaySignature {
    fn from(sig: Signature) -> Self {
        Self {
            v: 27 + u8::from(sig.v()),
            r: B256::from(sig.r().to_be_bytes::<32>()),
            s: B256::from(sig.s().to_be_bytes::<32>()),
        }
    }
}

/// Recover the identity that signed `canonical` (the output of [`encode`]).
pub fn recover_signer(canonical: &[u8], signature: &RelaySignature) -> Result<Address, CodecError> {
    if canonical.len() != CANONICAL_LEN || canonical[..2] != [0x19, 0x01] {
        return Err(CodecError::MalformedMessage(canonical.len()));
    }
    let sig = signature.to_signature()?;
    sig.recover_address_from_prehash(&keccak256(canonical))
        .map_err(|e| CodecError::InvalidSignature(e.to_string()))
}

/// Convenience for verifiers: re-encode and recover in one step.
pub fn recover_request_signer(
    request: &AuthorizationRequest,
    domain: &ProxyDomain,
    signature: &RelaySignature,
) -> Result<Address, CodecError> {
    recover_signer(&encode(request, domain), signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::{local::PrivateKeySigner, SignerSync};
    use alloy::sol_types::SolValue;

    fn sign(
        signer: &PrivateKeySigner,
        request: &AuthorizationRequest,
        domain: &ProxyDomain,
    ) -> RelaySignature {
        signer
            .sign_hash_sync(&signing_hash(request, domain))
            .expect("sign")
            .into()
    }

    fn sample() -> (AuthorizationRequest, ProxyDomain) {
        let request = AuthorizationRequest::new(
            Address::repeat_byte(0x4c),
            vec![0xde, 0x5f, 0x72, 0xfd],
            U256::from(7),
        );
        let domain = ProxyDomain::new(11_155_111, Address::repeat_byte(0xaa));
        (request, domain)
    }

    #[test]
    fn struct_hash_matches_manual_eip712_encoding() {
        let (request, _) = sample();
        let type_hash = keccak256("SignedAccess(address target,bytes data,uint256 nonce)");
        let manual = keccak256(
            (type_hash, request.target, keccak256(&request.data), request.nonce).abi_encode(),
        );
        assert_eq!(request.struct_hash(), manual);
    }

    #[test]
    fn domain_separator_matches_manual_encoding() {
        let (_, domain) = sample();
        let type_hash = keccak256(
            "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let manual = keccak256(
            (
                type_hash,
                keccak256(DOMAIN_NAME),
                keccak256(DOMAIN_VERSION),
                U256::from(domain.chain_id),
                domain.verifying_contract,
            )
                .abi_encode(),
        );
        assert_eq!(domain.separator(), manual);
    }

    #[test]
    fn encode_is_the_eip712_preimage() {
        let (request, domain) = sample();
        let bytes = encode(&request, &domain);
        assert_eq!(bytes.len(), CANONICAL_LEN);
        assert_eq!(&bytes[..2], &[0x19, 0x01]);
        assert_eq!(&bytes[2..34], domain.separator().as_slice());
        assert_eq!(&bytes[34..], request.struct_hash().as_slice());
        assert_eq!(
            signing_hash(&request, &domain),
            request.as_typed().eip712_signing_hash(&domain.eip712())
        );
    }

    #[test]
    fn recover_returns_signer() {
        let signer = PrivateKeySigner::random();
        let (request, domain) = sample();
        let sig = sign(&signer, &request, &domain);

        let recovered = recover_signer(&encode(&request, &domain), &sig).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn recover_accepts_zero_one_recovery_ids() {
        let signer = PrivateKeySigner::random();
        let (request, domain) = sample();
        let mut sig = sign(&signer, &request, &domain);
        sig.v -= 27;

        let recovered = recover_request_signer(&request, &domain, &sig).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn tampering_changes_recovered_identity() {
        let signer = PrivateKeySigner::random();
        let (request, domain) = sample();
        let sig = sign(&signer, &request, &domain);

        let mut other_target = request.clone();
        other_target.target = Address::repeat_byte(0x01);
        let mut other_data = request.clone();
        other_data.data = Bytes::from(vec![0x00]);
        let mut other_nonce = request.clone();
        other_nonce.nonce = U256::from(8);
        let other_proxy = ProxyDomain::new(domain.chain_id, Address::repeat_byte(0xbb));
        let other_chain = ProxyDomain::new(1, domain.verifying_contract);

        for (req, dom) in [
            (&other_target, &domain),
            (&other_data, &domain),
            (&other_nonce, &domain),
            (&request, &other_proxy),
            (&request, &other_chain),
        ] {
            let recovered = recover_request_signer(req, dom, &sig);
            assert_ne!(recovered, Ok(signer.address()));
        }
    }

    #[test]
    fn rejects_bad_recovery_id() {
        let (request, domain) = sample();
        let sig = RelaySignature::new(5, B256::repeat_byte(1), B256::repeat_byte(1));
        assert!(matches!(
            recover_request_signer(&request, &domain, &sig),
            Err(CodecError::InvalidSignature(_))
        ));
    }

    #[test]
    fn rejects_zero_and_out_of_range_scalars() {
        let (request, domain) = sample();
        let zero_r = RelaySignature::new(27, B256::ZERO, B256::repeat_byte(1));
        let big_s = RelaySignature::new(27, B256::repeat_byte(1), B256::repeat_byte(0xff));

        assert!(recover_request_signer(&request, &domain, &zero_r).is_err());
        assert!(recover_request_signer(&request, &domain, &big_s).is_err());
    }

    #[test]
    fn rejects_high_s_form() {
        let signer = PrivateKeySigner::random();
        let (request, domain) = sample();
        let sig = sign(&signer, &request, &domain);

        // Flip to the malleable twin (n - s, opposite parity).
        let s = U256::from_be_bytes(sig.s.0);
        let flipped = RelaySignature::new(
            if sig.v == 27 { 28 } else { 27 },
            sig.r,
            B256::from((SECP256K1_N - s).to_be_bytes::<32>()),
        );
        assert!(matches!(
            recover_request_signer(&request, &domain, &flipped),
            Err(CodecError::InvalidSignature(_))
        ));
    }

    #[test]
    fn rejects_malformed_canonical_bytes() {
        let sig = RelaySignature::new(27, B256::repeat_byte(1), B256::repeat_byte(1));
        assert_eq!(
            recover_signer(&[0u8; 10], &sig),
            Err(CodecError::MalformedMessage(10))
        );
    }

    #[test]
    fn signature_bytes_split_and_join() {
        let signer = PrivateKeySigner::random();
        let (request, domain) = sample();
        let sig = sign(&signer, &request, &domain);

        let joined = sig.to_bytes();
        assert_eq!(RelaySignature::from_bytes(&joined).unwrap(), sig);
        assert!(RelaySignature::from_bytes(&joined[..64]).is_err());
    }
}
