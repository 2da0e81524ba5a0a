use crate::constants::{DEFAULT_PNL_PRECISION, DEFAULT_TRADING_DAYS_PER_YEAR};
use crate::errors::{Error, Result};
use log::debug;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "PERFLEDGER";

/// Configuration shared by the performance services and block stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Decimal places the attribution pnl and market value pnl must agree to.
    pub pnl_precision: u32,
    /// Basis for annualising volatility.
    pub trading_days_per_year: u32,
    /// Root directory of the local block store.
    pub local_store_path: PathBuf,
    /// Field code to entity property holding its start date.
    pub extension_fields: HashMap<String, String>,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            pnl_precision: DEFAULT_PNL_PRECISION,
            trading_days_per_year: DEFAULT_TRADING_DAYS_PER_YEAR,
            local_store_path: PathBuf::from("blocks"),
            extension_fields: HashMap::new(),
        }
    }
}

impl PerformanceSettings {
    /// Reads settings from a JSON file, then applies `PERFLEDGER_*`
    /// environment overrides. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// As [`PerformanceSettings::load`], reading overrides from
    /// `<env_prefix>_<KEY>` variables such as `PERFLEDGER_PNL_PRECISION`.
    pub fn load_with_env_prefix(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        debug!(
            "Loading performance settings from {} with {}_* overrides",
            path.display(),
            env_prefix
        );
        let builder = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(config::Environment::with_prefix(env_prefix).try_parsing(true));
        Self::build(builder)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Json));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Self = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| Error::ConfigIO(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.trading_days_per_year == 0 {
            return Err(Error::InvalidConfigValue(
                "trading_days_per_year must be greater than zero".to_string(),
            ));
        }
        if self.pnl_precision > 28 {
            return Err(Error::InvalidConfigValue(format!(
                "pnl_precision {} exceeds decimal scale",
                self.pnl_precision
            )));
        }
        Ok(())
    }

    /// Square root of the trading-day basis, used to annualise daily volatility.
    pub fn annualisation_factor(&self) -> Decimal {
        Decimal::from(self.trading_days_per_year)
            .sqrt()
            .unwrap_or(Decimal::ONE)
    }
}
