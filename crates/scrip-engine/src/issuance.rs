//! key issuance service client
//!
//! the service hands out ots keys for a deposit over http. it is treated
//! as untrusted input: every returned key has its merkle proof re-verified
//! locally before the caller may store it. request bodies are signed over
//! the canonical json form (keys sorted recursively, `", "` / `": "`
//! separators) so the issuer's signature check matches byte for byte

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use scrip_core::{
    canonical_json,
    normalize::RawIssuanceResponse,
    unix_now, OtsKey, RedeemError, Result,
};

/// wallet-layer signer for issuance requests; the engine never holds the
/// owner's wallet key
#[async_trait]
pub trait RequestSigner: Send + Sync {
    async fn sign_message(&self, message: &str) -> Result<String>;
}

#[derive(Clone, Debug, Serialize)]
pub struct WithdrawalRequestItem {
    #[serde(rename = "targetChain")]
    pub target_chain: String,
    #[serde(rename = "tokenSymbol")]
    pub token_symbol: String,
    pub denomination: String,
}

pub struct IssuanceClient {
    http: reqwest::Client,
    base_url: String,
}

impl IssuanceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RedeemError::Issuance(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `POST /withdrawal`
    pub async fn request_withdrawal_keys(
        &self,
        owner: &str,
        deposit_tx_hash: &str,
        source_chain: &str,
        items: &[WithdrawalRequestItem],
        signer: &dyn RequestSigner,
    ) -> Result<(String, Vec<OtsKey>)> {
        self.request(owner, deposit_tx_hash, source_chain, items, signer, "/withdrawal")
            .await
    }

    /// `POST /cross-chain/request-mixed-withdrawal`: items may target
    /// chains other than the deposit's source chain
    pub async fn request_mixed_withdrawal(
        &self,
        owner: &str,
        deposit_tx_hash: &str,
        source_chain: &str,
        items: &[WithdrawalRequestItem],
        signer: &dyn RequestSigner,
    ) -> Result<(String, Vec<OtsKey>)> {
        self.request(
            owner,
            deposit_tx_hash,
            source_chain,
            items,
            signer,
            "/cross-chain/request-mixed-withdrawal",
        )
        .await
    }

    async fn request(
        &self,
        owner: &str,
        deposit_tx_hash: &str,
        source_chain: &str,
        items: &[WithdrawalRequestItem],
        signer: &dyn RequestSigner,
        path: &str,
    ) -> Result<(String, Vec<OtsKey>)> {
        let mut body = json!({
            "ownerAddress": owner,
            "depositTxHash": deposit_tx_hash,
            "sourceChain": source_chain,
            "requests": items,
            "timestamp": unix_now(),
        });

        let message = canonical_json(&body);
        debug!(%message, "signing issuance request");
        let signature = signer.sign_message(&message).await?;
        body["signature"] = signature.into();

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RedeemError::Issuance(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RedeemError::Issuance(format!("{url}: {status}: {text}")));
        }

        let raw: RawIssuanceResponse = response
            .json()
            .await
            .map_err(|e| RedeemError::Issuance(format!("bad response body: {e}")))?;

        let keys = raw
            .keys
            .into_iter()
            .map(|k| k.normalize())
            .collect::<Result<Vec<OtsKey>>>()?;

        verify_issued_keys(&keys)?;

        info!(request_id = %raw.request_id, keys = keys.len(), "issuance response verified");
        Ok((raw.request_id, keys))
    }
}

/// the service's responses are untrusted input: a key whose proof does
/// not recompute to its claimed root is rejected before it can be stored
pub fn verify_issued_keys(keys: &[OtsKey]) -> Result<()> {
    for key in keys {
        let identity = key.leaf_identity()?;
        let root = scrip_merkle::compute_root(&identity, &key.merkle_proof, key.tree_index)
            .map_err(|e| RedeemError::Malformed(e.to_string()))?;
        if root != key.merkle_root {
            return Err(RedeemError::InvalidProof);
        }
    }
    Ok(())
}
