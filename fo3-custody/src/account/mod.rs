//! HD wallet accounts and derivation replenishment

pub mod replenishment;
pub mod wallet;

pub use replenishment::{check_address_cache_legitimacy, DefaultDerivationPolicy, DerivationReplenisher};
pub use wallet::{
    generate_hd_wallet, Account, AddressCache, Derivation, DerivationType, HdWallet, WalletPayload,
    DEFAULT_ACCOUNT_LABEL,
};
