//! Local Wallet
//!
//! Creates and manages the EVM wallet that acts as the session's external
//! signer. The private key lives at `~/.strom/wallet.json`; its absence is
//! exactly the "no signer connected" condition the payment gate reports.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::get_strom_dir;
use crate::types::TransferSigner;

/// Wallet file name within the strom directory.
const WALLET_FILENAME: &str = "wallet.json";

/// On-disk wallet representation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletData {
    /// Hex-encoded private key with "0x" prefix.
    pub private_key: String,
    /// ISO-8601 timestamp of when this wallet was created.
    pub created_at: String,
}

/// Returns the full path to the wallet file: `~/.strom/wallet.json`.
pub fn get_wallet_path() -> PathBuf {
    get_strom_dir().join(WALLET_FILENAME)
}

/// Get or create the local wallet.
///
/// If a wallet file already exists, loads the private key from it.
/// Otherwise, generates a new random secp256k1 private key and persists it.
///
/// Returns the signer and a boolean indicating whether a new wallet was created.
pub fn get_wallet() -> Result<(PrivateKeySigner, bool)> {
    let dir = get_strom_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create strom directory")?;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
            .context("Failed to set directory permissions")?;
    }

    let wallet_path = get_wallet_path();

    if wallet_path.exists() {
        let contents = fs::read_to_string(&wallet_path).context("Failed to read wallet file")?;
        let wallet_data: WalletData =
            serde_json::from_str(&contents).context("Failed to parse wallet JSON")?;

        let signer: PrivateKeySigner = wallet_data
            .private_key
            .parse()
            .context("Failed to parse private key from wallet file")?;

        Ok((signer, false))
    } else {
        let signer = PrivateKeySigner::random();

        let private_key_bytes = signer.credential().to_bytes();
        let private_key_hex = format!("0x{}", hex::encode(private_key_bytes));

        let wallet_data = WalletData {
            private_key: private_key_hex,
            created_at: Utc::now().to_rfc3339(),
        };

        let json =
            serde_json::to_string_pretty(&wallet_data).context("Failed to serialize wallet")?;

        fs::write(&wallet_path, &json).context("Failed to write wallet file")?;
        fs::set_permissions(&wallet_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set wallet file permissions")?;

        Ok((signer, true))
    }
}

/// Check whether a wallet file exists on disk.
pub fn wallet_exists() -> bool {
    get_wallet_path().exists()
}

// ── Signer capability ───────────────────────────────────────────────

/// The local wallet as a transfer signer. Holds the key (if present on
/// disk) and the RPC endpoint transfers are submitted through.
pub struct LocalWallet {
    signer: Option<PrivateKeySigner>,
    rpc_url: String,
}

impl LocalWallet {
    /// Load the wallet from disk if one exists. A missing or unreadable
    /// wallet file yields a disconnected signer, not an error.
    pub fn load(rpc_url: &str) -> Self {
        let signer = if wallet_exists() {
            fs::read_to_string(get_wallet_path())
                .ok()
                .and_then(|c| serde_json::from_str::<WalletData>(&c).ok())
                .and_then(|w| w.private_key.parse().ok())
        } else {
            None
        };

        Self {
            signer,
            rpc_url: rpc_url.to_string(),
        }
    }

    /// A signer with no key material, for sessions without a wallet.
    pub fn disconnected() -> Self {
        Self {
            signer: None,
            rpc_url: String::new(),
        }
    }
}

#[async_trait]
impl TransferSigner for LocalWallet {
    fn is_connected(&self) -> bool {
        self.signer.is_some()
    }

    fn address(&self) -> Option<String> {
        self.signer.as_ref().map(|s| s.address().to_checksum(None))
    }

    /// Submit a native-value transfer to `recipient` and return the
    /// transaction hash once the transaction is accepted by the node.
    async fn transfer(&self, amount_native: f64, recipient: &str) -> Result<String> {
        let signer = self
            .signer
            .clone()
            .context("no wallet loaded")?;

        let to: Address = recipient.parse().context("invalid recipient address")?;
        let value = to_wei(amount_native).context("invalid transfer amount")?;

        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.parse().context("invalid RPC URL")?);

        let tx = TransactionRequest::default().with_to(to).with_value(value);

        let pending = provider
            .send_transaction(tx)
            .await
            .context("transfer submission failed")?;
        let hash = *pending.tx_hash();

        info!(%hash, amount_native, "transfer submitted");
        Ok(format!("{hash:?}"))
    }
}

/// Convert a native-unit amount to wei. Micro-unit precision is kept
/// before scaling so user-facing amounts like 1.1 convert exactly.
fn to_wei(amount: f64) -> Option<U256> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    let micro = (amount * 1e6).round() as u64;
    Some(U256::from(micro) * U256::from(1_000_000_000_000u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_path_is_under_strom_dir() {
        let path = get_wallet_path();
        assert!(path.ends_with("wallet.json"));
        assert!(path.starts_with(get_strom_dir()));
    }

    #[test]
    fn disconnected_wallet_reports_no_signer() {
        let wallet = LocalWallet::disconnected();
        assert!(!wallet.is_connected());
        assert!(wallet.address().is_none());
    }

    #[test]
    fn to_wei_converts_fractional_amounts_exactly() {
        assert_eq!(
            to_wei(1.1),
            Some(U256::from(1_100_000u64) * U256::from(1_000_000_000_000u64))
        );
        assert_eq!(to_wei(0.5), Some(U256::from(500_000_000_000_000_000u64)));
        assert_eq!(to_wei(-1.0), None);
        assert_eq!(to_wei(f64::NAN), None);
    }
}
