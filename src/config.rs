use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::info;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_EVENT_BUFFER: usize = 256;
const CONFIG_DIR: &str = "config";

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_tax_rate() -> Decimal {
    dec!(0.08)
}

fn default_shipping_flat() -> Decimal {
    dec!(10.00)
}

fn default_true() -> bool {
    true
}

/// Order pricing constants. Totals are always recomputed from line items
/// using these, never trusted from the caller.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    #[serde(default = "default_shipping_flat")]
    pub shipping_flat: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            shipping_flat: default_shipping_flat(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub pricing: PricingConfig,

    /// Domain event channel capacity
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Seed the default category set when the categories collection is
    /// first observed empty
    #[serde(default = "default_true")]
    pub seed_default_categories: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            pricing: PricingConfig::default(),
            event_buffer: default_event_buffer(),
            seed_default_categories: true,
        }
    }
}

impl CoreConfig {
    /// Layered load: `config/default.toml`, then `config/{environment}.toml`,
    /// then `STOCKROOM_`-prefixed environment variables (`__` separates
    /// nested keys, e.g. `STOCKROOM_PRICING__TAX_RATE`).
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("STOCKROOM_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let config: CoreConfig = Config::builder()
            .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
            .add_source(File::with_name(&format!("{CONFIG_DIR}/{environment}")).required(false))
            .add_source(Environment::with_prefix("STOCKROOM").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        info!(environment = %config.environment, "Configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pricing.tax_rate < Decimal::ZERO || self.pricing.tax_rate >= Decimal::ONE {
            return Err(ConfigError::Message(format!(
                "tax_rate must be in [0, 1), got {}",
                self.pricing.tax_rate
            )));
        }
        if self.pricing.shipping_flat < Decimal::ZERO {
            return Err(ConfigError::Message(format!(
                "shipping_flat must be non-negative, got {}",
                self.pricing.shipping_flat
            )));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Message(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
