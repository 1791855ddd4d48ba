//! Custody core configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::account::{DefaultDerivationPolicy, DerivationReplenisher, DerivationType, DEFAULT_ACCOUNT_LABEL};
use crate::cache::RefreshPolicy;
use crate::error::{Error, Result};

/// Configuration of the replenisher and the delegated transaction pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Label of accounts synthesized during replenishment
    pub default_account_label: String,
    /// Default derivation assigned to replenished accounts
    pub default_derivation: DerivationType,
    /// Keep each account's existing default derivation instead of resetting it
    pub preserve_default_derivation: bool,
    /// Refresh interval of cached authentication data; scoped to
    /// login/logout when unset
    pub auth_refresh_interval_secs: Option<u64>,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            default_account_label: DEFAULT_ACCOUNT_LABEL.to_string(),
            default_derivation: DerivationType::Segwit,
            preserve_default_derivation: false,
            auth_refresh_interval_secs: None,
        }
    }
}

impl CustodyConfig {
    /// Load configuration from `CUSTODY_*` environment variables
    pub fn from_env() -> Result<Self> {
        let default_account_label = std::env::var("CUSTODY_DEFAULT_ACCOUNT_LABEL")
            .unwrap_or_else(|_| DEFAULT_ACCOUNT_LABEL.to_string());

        let default_derivation = std::env::var("CUSTODY_DEFAULT_DERIVATION")
            .unwrap_or_else(|_| "segwit".to_string())
            .parse::<DerivationType>()
            .map_err(|e| Error::Config(format!("CUSTODY_DEFAULT_DERIVATION: {}", e)))?;

        let preserve_default_derivation = std::env::var("CUSTODY_PRESERVE_DEFAULT_DERIVATION")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let auth_refresh_interval_secs = match std::env::var("CUSTODY_AUTH_REFRESH_SECS") {
            Ok(value) => Some(
                value
                    .parse()
                    .map_err(|_| Error::Config(format!("CUSTODY_AUTH_REFRESH_SECS: invalid value {:?}", value)))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            default_account_label,
            default_derivation,
            preserve_default_derivation,
            auth_refresh_interval_secs,
        })
    }

    pub fn derivation_policy(&self) -> DefaultDerivationPolicy {
        if self.preserve_default_derivation {
            DefaultDerivationPolicy::PreserveExisting
        } else if self.default_derivation == DerivationType::Segwit {
            DefaultDerivationPolicy::PreferSegwit
        } else {
            DefaultDerivationPolicy::Pinned(self.default_derivation)
        }
    }

    pub fn auth_refresh_policy(&self) -> RefreshPolicy {
        match self.auth_refresh_interval_secs {
            Some(secs) => RefreshPolicy::Periodic(Duration::from_secs(secs)),
            None => RefreshPolicy::on_login_logout(),
        }
    }

    pub fn replenisher(&self) -> DerivationReplenisher {
        DerivationReplenisher::new(self.default_account_label.clone(), self.derivation_policy())
    }
}
