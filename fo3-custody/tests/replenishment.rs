//! Tests for derivation replenishment

use std::collections::BTreeMap;

use fo3_custody::account::*;
use fo3_custody::crypto::mnemonic::{MasterSeed, StaticMnemonicProvider};
use fo3_custody::error::WalletError;
use serde_json::json;

const ZERO_SEED_HEX: &str = "00000000000000000000000000000000";
const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

const LEGACY_XPRIV: &str = "xprv9xpXFhFpqdQK3TmytPBqXtGSwS3DLjojFhTGht8gwAAii8py5X6pxeBnQ6ehJiyJ6nDjWGJfZ95WxByFXVkDxHXrqu53WCRGypk2ttuqncb";
const LEGACY_XPUB: &str = "xpub6BosfCnifzxcFwrSzQiqu2DBVTshkCXacvNsWGYJVVhhawA7d4R5WSWGFNbi8Aw6ZRc1brxMyWMzG3DSSSSoekkudhUd9yLb6qx39T9nMdj";
const LEGACY_RECEIVE: &str = "xpub6ELHKXNimKbxMCytPh7EdC2QXx46T9qLDJWGnTraz1H9kMMFdcduoU69wh9cxP12wDxqAAfbaESWGYt5rREsX1J8iR2TEunvzvddduAPYcY";
const LEGACY_CHANGE: &str = "xpub6ELHKXNimKbxNg8CV7R31x98ZCPAAT2CrHnZ1ZovqMcvvjnnHmRvLtrpoAs8oBB5YghZf5vzjWURbUBqjXzN3RsEonB3LejZ8oHr3PEJnQj";

const SEGWIT_XPRIV: &str = "xprv9ybY78BftS5UGANki6oSifuQEjkpyAC8ZmBvBNTshQnCBcxnefjHS7buPMkkqhcRzmoGZ5bokx7GuyDAiktd5HemohAU4wV1ZPMDRmLpBMm";
const SEGWIT_XPUB: &str = "xpub6CatWdiZiodmUeTDp8LT5or8nmbKNcuyvz7WyksVFkKB4RHwCD3XyuvPEbvqAQY3rAPshWcMLoP2fMFMKHPJ4ZeZXYVUhLv1VMrjPC7PW6V";
const SEGWIT_RECEIVE: &str = "xpub6FPnz8nd9KHwrramFPiKretTQ6o7o7JdjjjuVgm9ByvK69i9sfZsTgHSr59PqHcg5E4CmCDbpZ1azNws6XaVNs4Tc9cUwgKQqZmUBoK3xUt";
const SEGWIT_CHANGE: &str = "xpub6FPnz8nd9KHwvCk4KcS6RAqe3odF4cyUV1L2KsnzqyCRUxa7AmWobiftMY1zp1A59UcoVuty6RN4KpnFhCC3yfr1Zr9g3zj5mwpgCdBX6DC";

fn seed() -> MasterSeed {
    MasterSeed::from_entropy_hex(ZERO_SEED_HEX, "").unwrap()
}

fn broken_wallet() -> HdWallet {
    let labels = BTreeMap::from([(1, "some label".to_string()), (2, "some other label".to_string())]);
    HdWallet {
        seed_hex: ZERO_SEED_HEX.to_string(),
        passphrase: String::new(),
        mnemonic_verified: false,
        default_account_index: 0,
        accounts: vec![Account {
            index: 0,
            label: "Private Key Wallet".to_string(),
            archived: false,
            default_derivation: DerivationType::Segwit,
            derivations: vec![Derivation {
                derivation_type: DerivationType::Segwit,
                purpose: 84,
                xpriv: None,
                xpub: String::new(),
                address_labels: labels,
                cache: AddressCache::default(),
            }],
        }],
    }
}

fn assert_regression_vectors(account: &Account) {
    let legacy = account.derivation(DerivationType::Legacy).unwrap();
    assert_eq!(legacy.purpose, 44);
    assert_eq!(legacy.xpriv.as_deref(), Some(LEGACY_XPRIV));
    assert_eq!(legacy.xpub, LEGACY_XPUB);
    assert_eq!(legacy.cache.receive_account, LEGACY_RECEIVE);
    assert_eq!(legacy.cache.change_account, LEGACY_CHANGE);

    let segwit = account.derivation(DerivationType::Segwit).unwrap();
    assert_eq!(segwit.purpose, 84);
    assert_eq!(segwit.xpriv.as_deref(), Some(SEGWIT_XPRIV));
    assert_eq!(segwit.xpub, SEGWIT_XPUB);
    assert_eq!(segwit.cache.receive_account, SEGWIT_RECEIVE);
    assert_eq!(segwit.cache.change_account, SEGWIT_CHANGE);
}

#[test]
fn test_replenish_broken_derivations() {
    let wallet = broken_wallet();
    assert!(wallet.accounts_need_replenishment());

    let replenished = DerivationReplenisher::default().replenish(&wallet, &seed()).unwrap();

    assert_eq!(replenished.seed_hex, wallet.seed_hex);
    assert_eq!(replenished.accounts.len(), 1);

    let account = &replenished.accounts[0];
    assert_eq!(account.label, "Private Key Wallet");
    assert_eq!(account.default_derivation, DerivationType::Segwit);
    assert_eq!(account.derivations.len(), 2);
    assert_regression_vectors(account);

    let segwit = account.derivation(DerivationType::Segwit).unwrap();
    assert_eq!(segwit.address_labels.get(&1).map(String::as_str), Some("some label"));
    assert_eq!(segwit.address_labels.get(&2).map(String::as_str), Some("some other label"));
    assert!(account.derivation(DerivationType::Legacy).unwrap().address_labels.is_empty());

    assert!(!replenished.accounts_need_replenishment());
    assert!(!check_address_cache_legitimacy(&replenished.accounts, &seed()));
}

#[test]
fn test_replenish_payload_from_json() {
    let payload: WalletPayload = serde_json::from_value(json!({
        "guid": "2a3b7d4e-0000-4000-8000-000000000000",
        "hd_wallets": [{
            "seed_hex": ZERO_SEED_HEX,
            "passphrase": "",
            "mnemonic_verified": true,
            "default_account_index": 0,
            "accounts": []
        }]
    }))
    .unwrap();

    let replenished = DerivationReplenisher::default().replenish_payload(&payload).unwrap();

    assert_eq!(replenished.guid, payload.guid);
    let wallet = replenished.default_hd_wallet().unwrap();
    assert!(wallet.mnemonic_verified);
    assert_eq!(wallet.accounts[0].label, DEFAULT_ACCOUNT_LABEL);
    assert_regression_vectors(&wallet.accounts[0]);

    let serialized = serde_json::to_value(wallet).unwrap();
    assert_eq!(serialized["accounts"][0]["default_derivation"], "bech32");
    assert_eq!(serialized["accounts"][0]["derivations"][1]["cache"]["receiveAccount"], SEGWIT_RECEIVE);
}

#[test]
fn test_corrupted_cache_is_detected() {
    let wallet = generate_hd_wallet(ABANDON, "", "acc", 1).unwrap();
    assert!(!check_address_cache_legitimacy(&wallet.accounts, &seed()));

    let mut corrupted = wallet.clone();
    corrupted.accounts[0].derivations[1].cache.receive_account = LEGACY_RECEIVE.to_string();
    assert!(!corrupted.accounts_need_replenishment());
    assert!(check_address_cache_legitimacy(&corrupted.accounts, &seed()));

    let other_seed = MasterSeed::from_mnemonic(ABANDON, "TREZOR").unwrap();
    assert!(check_address_cache_legitimacy(&wallet.accounts, &other_seed));
}

#[test]
fn test_missing_seed_and_wallet() {
    let replenisher = DerivationReplenisher::default();

    let mut wallet = broken_wallet();
    wallet.seed_hex = "not hex".to_string();
    let payload = WalletPayload {
        guid: "guid".to_string(),
        hd_wallets: vec![wallet],
    };
    assert_eq!(replenisher.replenish_payload(&payload), Err(WalletError::MissingSeedHex));

    let empty = WalletPayload {
        guid: "guid".to_string(),
        hd_wallets: vec![],
    };
    assert_eq!(replenisher.replenish_payload(&empty), Err(WalletError::MissingWallet));
}

#[test]
fn test_replenish_with_mnemonic_provider() {
    let replenished = DerivationReplenisher::default()
        .replenish_with(&StaticMnemonicProvider::new(ABANDON), &broken_wallet())
        .unwrap();
    assert_regression_vectors(&replenished.accounts[0]);

    let invalid = DerivationReplenisher::default()
        .replenish_with(&StaticMnemonicProvider::new("not a mnemonic"), &broken_wallet());
    assert_eq!(invalid, Err(WalletError::MissingSeedHex));
}
