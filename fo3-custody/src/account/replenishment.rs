//! Derivation replenishment
//!
//! Rebuilds an HD wallet's account tree so that every account carries exactly
//! one derivation per supported type, with address caches recomputed from the
//! seed and user address labels carried over.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::wallet::{Account, Derivation, DerivationType, HdWallet, WalletPayload, DEFAULT_ACCOUNT_LABEL};
use crate::crypto::mnemonic::{mnemonic_to_entropy_hex, MasterSeed, MnemonicProvider};
use crate::error::WalletError;

/// How replenishment picks each account's default derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", content = "type", rename_all = "snake_case")]
pub enum DefaultDerivationPolicy {
    /// Always reset to segwit
    #[default]
    PreferSegwit,
    /// Always reset to the given type
    Pinned(DerivationType),
    /// Keep the account's current default, segwit for new accounts
    PreserveExisting,
}

impl DefaultDerivationPolicy {
    fn resolve(&self, current: Option<DerivationType>) -> DerivationType {
        match self {
            Self::PreferSegwit => DerivationType::Segwit,
            Self::Pinned(derivation_type) => *derivation_type,
            Self::PreserveExisting => current.unwrap_or(DerivationType::Segwit),
        }
    }
}

/// Repairs HD wallets
#[derive(Debug, Clone)]
pub struct DerivationReplenisher {
    default_label: String,
    policy: DefaultDerivationPolicy,
}

impl Default for DerivationReplenisher {
    fn default() -> Self {
        Self::new(DEFAULT_ACCOUNT_LABEL, DefaultDerivationPolicy::default())
    }
}

impl DerivationReplenisher {
    pub fn new(default_label: impl Into<String>, policy: DefaultDerivationPolicy) -> Self {
        Self {
            default_label: default_label.into(),
            policy,
        }
    }

    pub fn policy(&self) -> DefaultDerivationPolicy {
        self.policy
    }

    /// Rebuild `wallet` from `seed`. The input is left untouched.
    pub fn replenish(&self, wallet: &HdWallet, seed: &MasterSeed) -> Result<HdWallet, WalletError> {
        info!("Replenishing derivations for {} account(s)", wallet.accounts.len());

        let result = self.rebuild(wallet, seed);
        match &result {
            Ok(updated) => info!("Derivation replenishment run, {} account(s)", updated.accounts.len()),
            Err(e) => error!("Derivation replenishment failed with error: {}", e),
        }
        result
    }

    fn rebuild(&self, wallet: &HdWallet, seed: &MasterSeed) -> Result<HdWallet, WalletError> {
        let mut accounts = if wallet.accounts.is_empty() {
            debug!("Wallet has no accounts, synthesizing account 0");
            vec![Account {
                index: 0,
                label: self.default_label.clone(),
                archived: false,
                default_derivation: DerivationType::Segwit,
                derivations: Vec::new(),
            }]
        } else {
            wallet.accounts.clone()
        };
        accounts.sort_by_key(|account| account.index);

        let accounts = accounts
            .iter()
            .map(|account| self.rebuild_account(account, seed))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HdWallet {
            accounts,
            ..wallet.clone()
        })
    }

    fn rebuild_account(&self, account: &Account, seed: &MasterSeed) -> Result<Account, WalletError> {
        let derivations = DerivationType::ALL
            .iter()
            .map(|derivation_type| -> Result<Derivation, WalletError> {
                let mut derivation = Derivation::generate(seed, *derivation_type, account.index)?;
                if let Some(existing) = account.derivation(*derivation_type) {
                    derivation.address_labels = existing.address_labels.clone();
                }
                Ok(derivation)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let current = Some(account.default_derivation).filter(|t| account.derivation(*t).is_some());

        Ok(Account {
            index: account.index,
            label: account.label.clone(),
            archived: account.archived,
            default_derivation: self.policy.resolve(current),
            derivations,
        })
    }

    /// Replenish the default HD wallet of a decrypted payload
    pub fn replenish_payload(&self, payload: &WalletPayload) -> Result<WalletPayload, WalletError> {
        let wallet = payload.default_hd_wallet().ok_or(WalletError::MissingWallet)?;
        let seed = wallet.master_seed()?;
        let updated = self.replenish(wallet, &seed)?;

        let mut hd_wallets = payload.hd_wallets.clone();
        hd_wallets[0] = updated;

        Ok(WalletPayload {
            guid: payload.guid.clone(),
            hd_wallets,
        })
    }

    /// Replenish using the mnemonic held by `provider`
    pub fn replenish_with(&self, provider: &dyn MnemonicProvider, wallet: &HdWallet) -> Result<HdWallet, WalletError> {
        let phrase = provider.mnemonic().map_err(|e| {
            warn!("Mnemonic unavailable for replenishment: {}", e);
            WalletError::MissingSeedHex
        })?;
        let seed_hex = mnemonic_to_entropy_hex(&phrase).map_err(|_| WalletError::MissingSeedHex)?;
        let seed = MasterSeed::from_entropy_hex(&seed_hex, &wallet.passphrase)?;

        self.replenish(wallet, &seed)
    }

    /// Replenish only when the read-only checks find something broken
    pub fn replenish_if_needed(&self, wallet: &HdWallet, seed: &MasterSeed) -> Result<Option<HdWallet>, WalletError> {
        if !wallet.accounts_need_replenishment() && !check_address_cache_legitimacy(&wallet.accounts, seed) {
            debug!("Wallet derivations are intact");
            return Ok(None);
        }
        self.replenish(wallet, seed).map(Some)
    }
}

/// Whether any persisted derivation's address cache differs from the one
/// recomputed from `seed`. Derivations that cannot be recomputed count as
/// divergent.
pub fn check_address_cache_legitimacy(accounts: &[Account], seed: &MasterSeed) -> bool {
    let mut affected = 0usize;

    for account in accounts {
        for derivation in &account.derivations {
            let diverges = match Derivation::generate(seed, derivation.derivation_type, account.index) {
                Ok(expected) => expected.cache != derivation.cache,
                Err(_) => true,
            };
            if diverges {
                warn!(
                    "Address cache mismatch on account {} ({:?})",
                    account.index, derivation.derivation_type
                );
                affected += 1;
            }
        }
    }

    affected > 0
}
