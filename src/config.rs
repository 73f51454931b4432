use crate::domain::account::UserId;
use crate::domain::catalog::Product;
use crate::error::{Result, StorefrontError};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where and to whom an external payment is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub name: String,
    pub number: String,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub admin_ids: Vec<UserId>,
    pub support_contact: String,
    pub payment_channel_id: i64,
    pub order_channel_id: i64,
    /// How long a payment waits for its screenshot.
    pub payment_window_secs: u64,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    pub balance_discount_percent: Decimal,
    pub currency: String,
    /// Keyed by the method key users pick, e.g. `sbp`.
    pub payment_methods: BTreeMap<String, PaymentDetails>,
    pub catalog: Vec<Product>,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut payment_methods = BTreeMap::new();
        payment_methods.insert(
            "sbp".to_string(),
            PaymentDetails {
                name: "SBP".to_string(),
                number: "+70000000000".to_string(),
                owner: "Store owner".to_string(),
            },
        );
        payment_methods.insert(
            "yoomoney".to_string(),
            PaymentDetails {
                name: "YooMoney".to_string(),
                number: "4100000000000000".to_string(),
                owner: "Store owner".to_string(),
            },
        );

        Self {
            admin_ids: Vec::new(),
            support_contact: "@support".to_string(),
            payment_channel_id: 0,
            order_channel_id: 0,
            payment_window_secs: 600,
            min_deposit: Decimal::from(100),
            max_deposit: Decimal::from(50_000),
            balance_discount_percent: Decimal::from(5),
            currency: "₽".to_string(),
            payment_methods,
            catalog: Vec::new(),
            snapshot_path: None,
        }
    }
}

impl Settings {
    /// Reads the optional TOML file, then `STOREFRONT__*` environment
    /// overrides (`STOREFRONT__ADMIN_IDS=1,2`, `STOREFRONT__MIN_DEPOSIT=200`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("STOREFRONT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("admin_ids")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_deposit <= Decimal::ZERO {
            return Err(StorefrontError::ValidationError(
                "min_deposit must be positive".to_string(),
            ));
        }
        if self.min_deposit > self.max_deposit {
            return Err(StorefrontError::ValidationError(
                "min_deposit must not exceed max_deposit".to_string(),
            ));
        }
        if self.balance_discount_percent < Decimal::ZERO
            || self.balance_discount_percent >= Decimal::ONE_HUNDRED
        {
            return Err(StorefrontError::ValidationError(
                "balance_discount_percent must be in [0, 100)".to_string(),
            ));
        }
        if self.payment_window_secs == 0 {
            return Err(StorefrontError::ValidationError(
                "payment_window_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn payment_window(&self) -> Duration {
        Duration::from_secs(self.payment_window_secs)
    }
}
