// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Client
//!
//! Caller-side counterpart of the `/server` API: reads proxy state, builds the
//! `SignedAccess` message, has it signed, and submits it for relay.
//!
//! ```rust,ignore
//! let client = RelayClient::new("http://127.0.0.1:8080", 11155111)?;
//! let proxy = client.deploy(owner.address()).await?.contract_address;
//! let sent = client
//!     .sign_and_relay(&owner, proxy.parse()?, token, calldata)
//!     .await?;
//! ```

use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::signers::{local::PrivateKeySigner, Signer};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::codec::{signing_hash, AuthorizationRequest, ProxyDomain, RelaySignature};
use crate::models::{
    DeployRequest, DeployResponse, MessageRequest, MessageResponse, NonceResponse, NonceValue,
    RegistryResponse,
};
use crate::storage::RelayRecord;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid relayer URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Relayer returned {status}: {message}")]
    Api {
        status: StatusCode,
        message: String,
        /// `error_code` from the response body, when present.
        code: Option<String>,
    },

    #[error("Malformed relayer response: {0}")]
    Decode(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Signer did not answer within {0:?}")]
    SigningTimeout(Duration),
}

impl ClientError {
    /// The relayer's `error_code`, for API errors.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Something able to sign a `SignedAccess` message: a local key, or a
/// wallet reached over some other channel.
#[async_trait]
pub trait AuthorizationSigner: Send + Sync {
    /// Identity whose proxy is being driven.
    fn address(&self) -> Address;

    async fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
        domain: &ProxyDomain,
    ) -> Result<RelaySignature, ClientError>;
}

#[async_trait]
impl AuthorizationSigner for PrivateKeySigner {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_authorization(
        &self,
        request: &AuthorizationRequest,
        domain: &ProxyDomain,
    ) -> Result<RelaySignature, ClientError> {
        let signature = self
            .sign_hash(&signing_hash(request, domain))
            .await
            .map_err(|e| ClientError::Signing(e.to_string()))?;
        Ok(signature.into())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_code: Option<String>,
}

/// HTTP client for a relayer.
pub struct RelayClient {
    base_url: url::Url,
    chain_id: u64,
    http: reqwest::Client,
    signing_timeout: Duration,
}

impl RelayClient {
    /// `chain_id` must be the chain the relayer submits to; it is part of
    /// every signed domain.
    pub fn new(base_url: &str, chain_id: u64) -> Result<Self, ClientError> {
        let base_url: url::Url = base_url
            .parse()
            .map_err(|e: url::ParseError| ClientError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            chain_id,
            http,
            signing_timeout: DEFAULT_SIGNING_TIMEOUT,
        })
    }

    pub fn with_signing_timeout(mut self, timeout: Duration) -> Self {
        self.signing_timeout = timeout;
        self
    }

    pub async fn deploy(&self, owner: Address) -> Result<DeployResponse, ClientError> {
        let body = DeployRequest {
            owner_address: owner.to_checksum(None),
        };
        self.post("/server/deploy", &body).await
    }

    pub async fn proxy_nonce(&self, proxy: Address) -> Result<NonceResponse, ClientError> {
        self.get(&format!("/server/proxy/{proxy}/nonce")).await
    }

    pub async fn registry(&self, owner: Address) -> Result<RegistryResponse, ClientError> {
        self.get(&format!("/server/registry/{owner}")).await
    }

    pub async fn relay_status(&self, tx_hash: TxHash) -> Result<RelayRecord, ClientError> {
        self.get(&format!("/server/relays/{tx_hash}")).await
    }

    /// Submit an already-signed authorization.
    pub async fn relay(
        &self,
        proxy: Address,
        request: &AuthorizationRequest,
        signature: RelaySignature,
    ) -> Result<MessageResponse, ClientError> {
        let body = MessageRequest {
            proxy: proxy.to_checksum(None),
            target: request.target.to_checksum(None),
            data: request.data.to_string(),
            v: signature.v,
            r: signature.r.to_string(),
            s: signature.s.to_string(),
            nonce: Some(NonceValue::Text(request.nonce.to_string())),
        };
        self.post("/server/message", &body).await
    }

    /// Read the proxy's nonce, sign `{target, data, nonce}` and relay it.
    pub async fn sign_and_relay(
        &self,
        signer: &dyn AuthorizationSigner,
        proxy: Address,
        target: Address,
        data: Bytes,
    ) -> Result<MessageResponse, ClientError> {
        let state = self.proxy_nonce(proxy).await?;
        let nonce: U256 = state
            .nonce
            .parse()
            .map_err(|_| ClientError::Decode(format!("nonce {:?}", state.nonce)))?;

        let request = AuthorizationRequest::new(target, data, nonce);
        let domain = ProxyDomain::new(self.chain_id, proxy);

        let signature = tokio::time::timeout(
            self.signing_timeout,
            signer.sign_authorization(&request, &domain),
        )
        .await
        .map_err(|_| ClientError::SigningTimeout(self.signing_timeout))??;

        debug!(proxy = %proxy, nonce = %nonce, "Signed authorization");
        self.relay(proxy, &request, signature).await
    }

    fn url(&self, path: &str) -> Result<url::Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.http.get(self.url(path)?).send().await?;
        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self.http.post(self.url(path)?).json(body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let (message, code) = match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(body) => (body.error, body.error_code),
            Err(_) => (String::from_utf8_lossy(&bytes).into_owned(), None),
        };
        return Err(ClientError::Api {
            status,
            message,
            code,
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
