//! HD wallet model

use std::collections::BTreeMap;
use std::str::FromStr;

use secp256k1::Secp256k1;
use serde::{Deserialize, Serialize};

use crate::crypto::keys::{ChildIndex, DerivationPath, ExtendedPrivateKey, Network};
use crate::crypto::mnemonic::{mnemonic_to_entropy_hex, MasterSeed};
use crate::error::{DerivationError, Result, WalletError};

/// Label given to accounts synthesized by the core
pub const DEFAULT_ACCOUNT_LABEL: &str = "Private Key Wallet";

/// Address derivation scheme of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DerivationType {
    /// BIP44 P2PKH
    #[serde(rename = "legacy")]
    Legacy,
    /// BIP84 native segwit
    #[serde(rename = "bech32")]
    Segwit,
}

impl DerivationType {
    /// Every supported type, in canonical order
    pub const ALL: [DerivationType; 2] = [DerivationType::Legacy, DerivationType::Segwit];

    /// BIP43 purpose bound to the type
    pub fn purpose(&self) -> u32 {
        match self {
            Self::Legacy => 44,
            Self::Segwit => 84,
        }
    }
}

impl FromStr for DerivationType {
    type Err = DerivationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "segwit" | "bech32" => Ok(Self::Segwit),
            other => Err(DerivationError::UnknownDerivationType(other.to_string())),
        }
    }
}

/// Denormalized receive/change xpubs used for fast address-list queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressCache {
    pub receive_account: String,
    pub change_account: String,
}

/// One derivation scheme applied to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    #[serde(rename = "type")]
    pub derivation_type: DerivationType,
    pub purpose: u32,
    pub xpriv: Option<String>,
    pub xpub: String,
    /// User labels keyed by derived-address index
    #[serde(default)]
    pub address_labels: BTreeMap<u32, String>,
    pub cache: AddressCache,
}

impl Derivation {
    /// Derive the account node `m/purpose'/0'/index'` with its receive and
    /// change caches. Labels start empty.
    pub fn generate(seed: &MasterSeed, derivation_type: DerivationType, account_index: u32) -> std::result::Result<Self, DerivationError> {
        let secp = Secp256k1::new();
        let path = DerivationPath::from(vec![
            ChildIndex::hardened(derivation_type.purpose())?,
            ChildIndex::hardened(0)?,
            ChildIndex::hardened(account_index)?,
        ]);

        let account = ExtendedPrivateKey::new_master(seed.as_bytes(), Network::Bitcoin)?.derive_path(&secp, &path)?;
        let receive = account.derive_child(&secp, ChildIndex::Normal(0))?;
        let change = account.derive_child(&secp, ChildIndex::Normal(1))?;

        Ok(Self {
            derivation_type,
            purpose: derivation_type.purpose(),
            xpriv: Some(account.to_string()),
            xpub: account.to_extended_public_key(&secp).to_string(),
            address_labels: BTreeMap::new(),
            cache: AddressCache {
                receive_account: receive.to_extended_public_key(&secp).to_string(),
                change_account: change.to_extended_public_key(&secp).to_string(),
            },
        })
    }

    fn is_complete(&self) -> bool {
        self.xpriv.as_deref().map_or(false, |x| !x.is_empty()) && !self.xpub.is_empty()
    }
}

/// Derivations of every supported type for one account, in canonical order
pub fn generate_derivations(seed: &MasterSeed, account_index: u32) -> std::result::Result<Vec<Derivation>, DerivationError> {
    DerivationType::ALL
        .iter()
        .map(|t| Derivation::generate(seed, *t, account_index))
        .collect()
}

/// An HD account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub index: u32,
    pub label: String,
    #[serde(default)]
    pub archived: bool,
    pub default_derivation: DerivationType,
    pub derivations: Vec<Derivation>,
}

impl Account {
    /// Account with a fully derived set of derivations
    pub fn create(seed: &MasterSeed, index: u32, label: impl Into<String>) -> std::result::Result<Self, DerivationError> {
        Ok(Self {
            index,
            label: label.into(),
            archived: false,
            default_derivation: DerivationType::Segwit,
            derivations: generate_derivations(seed, index)?,
        })
    }

    pub fn derivation(&self, derivation_type: DerivationType) -> Option<&Derivation> {
        self.derivations.iter().find(|d| d.derivation_type == derivation_type)
    }

    fn needs_replenishment(&self) -> bool {
        let missing_type = DerivationType::ALL
            .iter()
            .any(|t| self.derivations.iter().filter(|d| d.derivation_type == *t).count() != 1);

        missing_type
            || self.derivation(self.default_derivation).is_none()
            || self.derivations.iter().any(|d| !d.is_complete())
    }
}

/// A hierarchical-deterministic wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HdWallet {
    /// Hex of the BIP39 entropy
    pub seed_hex: String,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default)]
    pub mnemonic_verified: bool,
    #[serde(default)]
    pub default_account_index: u32,
    pub accounts: Vec<Account>,
}

impl HdWallet {
    /// Master seed from the persisted entropy and passphrase
    pub fn master_seed(&self) -> std::result::Result<MasterSeed, WalletError> {
        MasterSeed::from_entropy_hex(&self.seed_hex, &self.passphrase)
    }

    /// Whether the account tree is structurally incomplete. Does not verify
    /// the address caches; see `check_address_cache_legitimacy`.
    pub fn accounts_need_replenishment(&self) -> bool {
        self.accounts.is_empty() || self.accounts.iter().any(Account::needs_replenishment)
    }

    /// New wallet with one more account at the next sequential index
    pub fn create_account(&self, label: impl Into<String>, seed: &MasterSeed) -> std::result::Result<HdWallet, WalletError> {
        let index = self.accounts.iter().map(|a| a.index + 1).max().unwrap_or(0);
        let account = Account::create(seed, index, label)?;

        let mut wallet = self.clone();
        wallet.accounts.push(account);
        Ok(wallet)
    }
}

/// The decrypted wallet payload, reduced to what the custody core needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPayload {
    pub guid: String,
    #[serde(default)]
    pub hd_wallets: Vec<HdWallet>,
}

impl WalletPayload {
    pub fn default_hd_wallet(&self) -> Option<&HdWallet> {
        self.hd_wallets.first()
    }
}

/// Build a fresh HD wallet from a mnemonic with `total_accounts` derived accounts
pub fn generate_hd_wallet(
    mnemonic: &str,
    passphrase: &str,
    account_label: &str,
    total_accounts: u32,
) -> Result<HdWallet> {
    let seed_hex = mnemonic_to_entropy_hex(mnemonic)?;
    let seed = MasterSeed::from_mnemonic(mnemonic, passphrase)?;

    let accounts = (0..total_accounts.max(1))
        .map(|index| Account::create(&seed, index, account_label))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(HdWallet {
        seed_hex,
        passphrase: passphrase.to_string(),
        mnemonic_verified: false,
        default_account_index: 0,
        accounts,
    })
}
