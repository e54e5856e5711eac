//! Fee ledger configuration

use serde::Deserialize;

use core_kernel::{AccountRef, Currency, PaymentModeId, Timezone};

use crate::ports::PaymentMode;

/// One configured payment mode
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentModeSetting {
    /// Mode identifier
    pub id: PaymentModeId,
    /// Display name
    pub name: String,
    /// Asset account debited on posting; omit to leave payments unposted
    pub asset_account: Option<AccountRef>,
}

/// Fee ledger configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeeLedgerSettings {
    /// Ledger currency for the tenant
    pub currency: Currency,
    /// Tenant timezone; drives due-date comparisons
    pub timezone: Timezone,
    /// Receipt number prefix
    pub receipt_prefix: String,
    /// Invoice number prefix
    pub invoice_prefix: String,
    /// Account credited when fee payments post
    pub receivable_account: AccountRef,
    /// Payment mode used for mobile money confirmations
    pub mobile_money_mode: Option<PaymentModeId>,
    /// Configured payment modes
    pub payment_modes: Vec<PaymentModeSetting>,
}

impl Default for FeeLedgerSettings {
    fn default() -> Self {
        Self {
            currency: Currency::KES,
            timezone: Timezone::default(),
            receipt_prefix: "RCP".to_string(),
            invoice_prefix: "INV".to_string(),
            receivable_account: AccountRef::new("1200-FEES-RECEIVABLE"),
            mobile_money_mode: None,
            payment_modes: Vec::new(),
        }
    }
}

impl FeeLedgerSettings {
    /// Loads configuration from environment
    ///
    /// Reads a `.env` file if present, then `FEES_` prefixed variables.
    /// Unset fields keep their defaults.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        config::Config::builder()
            .add_source(config::Environment::with_prefix("FEES"))
            .build()?
            .try_deserialize()
    }

    /// Returns the configured modes as port values
    pub fn payment_modes(&self) -> Vec<PaymentMode> {
        self.payment_modes
            .iter()
            .map(|setting| PaymentMode {
                id: setting.id,
                name: setting.name.clone(),
                asset_account: setting.asset_account.clone(),
            })
            .collect()
    }
}
