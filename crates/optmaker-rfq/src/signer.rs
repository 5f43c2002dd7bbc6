//! Quote signing.
//!
//! Accepted quotes are signed as EIP-712 typed data against the settlement
//! contract of the configured chain. The key is loaded once at startup.

use std::path::PathBuf;

use alloy::primitives::{Address, Bytes, PrimitiveSignature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use thiserror::Error;
use zeroize::Zeroizing;

// =============================================================================
// KeySource and KeyManager
// =============================================================================

/// Source of the private key.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Load from environment variable (development).
    EnvVar { var_name: String },
    /// Load from file (production, recommend 0600 permissions).
    File { path: PathBuf },
}

/// Holds the maker signing key.
///
/// Never log private key material.
pub struct KeyManager {
    signer: PrivateKeySigner,
}

impl KeyManager {
    /// Load the key and optionally verify the derived address.
    ///
    /// # Errors
    /// Returns `KeyError` if the variable or file is missing, the hex is
    /// malformed, the key is invalid, or the address does not match.
    pub fn load(source: &KeySource, expected_address: Option<Address>) -> Result<Self, KeyError> {
        let hex_key: Zeroizing<String> = match source {
            KeySource::EnvVar { var_name } => Zeroizing::new(
                std::env::var(var_name).map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
            ),
            KeySource::File { path } => Zeroizing::new(std::fs::read_to_string(path)?),
        };
        Self::from_hex(&hex_key, expected_address)
    }

    /// Parse a hex key (optional `0x` prefix, surrounding whitespace ignored).
    pub fn from_hex(hex_key: &str, expected_address: Option<Address>) -> Result<Self, KeyError> {
        let trimmed = hex_key.trim().trim_start_matches("0x");
        let secret_bytes = Zeroizing::new(hex::decode(trimmed)?);
        let signer = PrivateKeySigner::from_slice(&secret_bytes)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        if let Some(expected) = expected_address {
            if signer.address() != expected {
                return Err(KeyError::AddressMismatch {
                    expected,
                    actual: signer.address(),
                });
            }
        }
        Ok(Self { signer })
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

/// Key management errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// EIP-712 quote
// =============================================================================

pub const EIP712_DOMAIN_NAME: &str = "OptionsSettlement";
pub const EIP712_DOMAIN_VERSION: &str = "1";

sol! {
    #[derive(Debug)]
    struct RfqQuote {
        uint64 partnerId;
        uint256 expiry;
        address takerAddress;
        address makerAddress;
        uint256 makerNonce;
        address takerToken;
        address makerToken;
        uint256 takerAmount;
        uint256 makerAmount;
        address receiver;
        bytes packedCommands;
    }
}

/// Terms of an accepted quote, from the taker's point of view: the taker
/// gives `taker_amount` of `taker_token` and receives `maker_amount` of
/// `maker_token`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteTerms {
    pub partner_id: u64,
    pub expiry: u64,
    pub taker: Address,
    pub maker: Address,
    pub nonce: U256,
    pub taker_token: Address,
    pub maker_token: Address,
    pub taker_amount: U256,
    pub maker_amount: U256,
    pub receiver: Address,
    pub commands: Vec<u8>,
}

impl From<&QuoteTerms> for RfqQuote {
    fn from(terms: &QuoteTerms) -> Self {
        Self {
            partnerId: terms.partner_id,
            expiry: U256::from(terms.expiry),
            takerAddress: terms.taker,
            makerAddress: terms.maker,
            makerNonce: terms.nonce,
            takerToken: terms.taker_token,
            makerToken: terms.maker_token,
            takerAmount: terms.taker_amount,
            makerAmount: terms.maker_amount,
            receiver: terms.receiver,
            packedCommands: Bytes::from(terms.commands.clone()),
        }
    }
}

/// Signing errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Signing failed: {0}")]
    SigningFailed(#[from] alloy::signers::Error),
}

pub struct QuoteSigner {
    keys: KeyManager,
    chain_id: u64,
    settlement: Address,
}

impl QuoteSigner {
    pub fn new(keys: KeyManager, chain_id: u64, settlement: Address) -> Self {
        Self {
            keys,
            chain_id,
            settlement,
        }
    }

    /// Maker address quotes are signed for.
    pub fn address(&self) -> Address {
        self.keys.address()
    }

    /// `keccak256(0x1901 || domain_separator || struct_hash)`.
    pub fn signing_hash(&self, terms: &QuoteTerms) -> B256 {
        let domain = eip712_domain! {
            name: EIP712_DOMAIN_NAME,
            version: EIP712_DOMAIN_VERSION,
            chain_id: self.chain_id,
            verifying_contract: self.settlement,
        };
        RfqQuote::from(terms).eip712_signing_hash(&domain)
    }

    pub async fn sign(&self, terms: &QuoteTerms) -> Result<PrimitiveSignature, SignerError> {
        let hash = self.signing_hash(terms);
        Ok(self.keys.signer().sign_hash(&hash).await?)
    }

    /// Signature as `0x`-prefixed 65-byte hex.
    pub async fn sign_hex(&self, terms: &QuoteTerms) -> Result<String, SignerError> {
        let signature = self.sign(terms).await?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Well-known test private key (DO NOT use in production)
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn terms() -> QuoteTerms {
        QuoteTerms {
            partner_id: 7,
            expiry: 1_700_000_030,
            taker: Address::repeat_byte(0x11),
            maker: Address::ZERO,
            nonce: U256::from(123u64),
            taker_token: Address::repeat_byte(0x05),
            maker_token: Address::repeat_byte(0xa1),
            taker_amount: U256::from(300_500_000u64),
            maker_amount: U256::from(2_000_000_000_000_000_000u128),
            receiver: Address::repeat_byte(0x11),
            commands: vec![1, 2],
        }
    }

    fn signer(chain_id: u64) -> QuoteSigner {
        let keys = KeyManager::from_hex(TEST_PRIVATE_KEY, None).unwrap();
        QuoteSigner::new(keys, chain_id, Address::repeat_byte(0xee))
    }

    #[test]
    fn test_key_manager_address_mismatch() {
        let result = KeyManager::from_hex(TEST_PRIVATE_KEY, Some(Address::ZERO));
        assert!(matches!(result, Err(KeyError::AddressMismatch { .. })));
    }

    #[test]
    fn test_key_manager_bad_hex() {
        assert!(matches!(
            KeyManager::from_hex("0xnothex", None),
            Err(KeyError::HexDecode(_))
        ));
    }

    #[test]
    fn test_key_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  {TEST_PRIVATE_KEY}  ").unwrap();
        let keys = KeyManager::load(
            &KeySource::File {
                path: file.path().to_path_buf(),
            },
            None,
        )
        .unwrap();
        let direct = KeyManager::from_hex(TEST_PRIVATE_KEY, None).unwrap();
        assert_eq!(keys.address(), direct.address());
    }

    #[test]
    fn test_missing_env_var() {
        let result = KeyManager::load(
            &KeySource::EnvVar {
                var_name: "OPTMAKER_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            },
            None,
        );
        assert!(matches!(result, Err(KeyError::EnvVarNotFound(_))));
    }

    #[test]
    fn test_domain_separates_chains() {
        assert_ne!(signer(1).signing_hash(&terms()), signer(42161).signing_hash(&terms()));
    }

    #[tokio::test]
    async fn test_signature_recovers_maker() {
        let signer = signer(42161);
        let terms = terms();
        let signature = signer.sign(&terms).await.unwrap();
        let recovered = signature
            .recover_address_from_prehash(&signer.signing_hash(&terms))
            .unwrap();
        assert_eq!(recovered, signer.address());

        let hex_sig = signer.sign_hex(&terms).await.unwrap();
        assert_eq!(hex_sig.len(), 2 + 130);
    }
}
