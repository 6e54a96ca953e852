use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::payments::{AggregatorConfig, HimKoshConfig, ManualUpiConfig, RetryPolicy};
use crate::workflows::registration::domain::Category;
use crate::workflows::registration::fees::{FeeSchedule, FeeScheduleError};
use crate::workflows::registration::policy::RegistrationPolicy;

const MIN_GATEWAY_TIMEOUT_SECS: u64 = 10;
const MAX_GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    /// Development tooling such as the data console stays off in production.
    pub fn allows_dev_tools(self) -> bool {
        self != Self::Production
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub registration: RegistrationConfig,
    pub gateways: GatewayConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            registration: RegistrationConfig::load()?,
            gateways: GatewayConfig::load()?,
        })
    }

    /// Workflow policy for this deployment.
    pub fn policy(&self) -> RegistrationPolicy {
        RegistrationPolicy {
            state_review_categories: self.registration.state_review_categories.clone(),
            gateway_timeout: self.registration.gateway_timeout,
            reconcile_retry: self.registration.reconcile_retry,
            payment_expiry: self.registration.payment_expiry,
            console_enabled: self.environment.allows_dev_tools(),
            ..RegistrationPolicy::default()
        }
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Fee schedule source and workflow timings.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub fee_schedule_path: Option<PathBuf>,
    pub state_review_categories: BTreeSet<Category>,
    pub gateway_timeout: Duration,
    pub reconcile_retry: RetryPolicy,
    pub payment_expiry: chrono::Duration,
    pub sweep_interval: Duration,
}

impl RegistrationConfig {
    fn load() -> Result<Self, ConfigError> {
        let state_review_categories = match optional("HOMESTAY_STATE_REVIEW_CATEGORIES") {
            Some(raw) => parse_categories(&raw)?,
            None => BTreeSet::from([Category::Diamond]),
        };

        let timeout_secs: u64 = number("HOMESTAY_GATEWAY_TIMEOUT_SECS", 20)?;
        if !(MIN_GATEWAY_TIMEOUT_SECS..=MAX_GATEWAY_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::OutOfRange {
                variable: "HOMESTAY_GATEWAY_TIMEOUT_SECS",
                min: MIN_GATEWAY_TIMEOUT_SECS,
                max: MAX_GATEWAY_TIMEOUT_SECS,
            });
        }

        let reconcile_retry = RetryPolicy {
            max_attempts: number("HOMESTAY_RECONCILE_RETRIES", 3)?,
            initial_backoff: Duration::from_millis(number("HOMESTAY_RECONCILE_BACKOFF_MS", 500)?),
            ..RetryPolicy::default()
        };
        let expiry_minutes: i64 = number("HOMESTAY_PAYMENT_EXPIRY_MINUTES", 30)?;
        if expiry_minutes <= 0 {
            return Err(ConfigError::OutOfRange {
                variable: "HOMESTAY_PAYMENT_EXPIRY_MINUTES",
                min: 1,
                max: u64::MAX,
            });
        }

        Ok(Self {
            fee_schedule_path: optional("HOMESTAY_FEE_SCHEDULE").map(PathBuf::from),
            state_review_categories,
            gateway_timeout: Duration::from_secs(timeout_secs),
            reconcile_retry,
            payment_expiry: chrono::Duration::minutes(expiry_minutes),
            sweep_interval: Duration::from_secs(
                number::<u64>("HOMESTAY_SWEEP_INTERVAL_SECS", 60)?.max(1),
            ),
        })
    }

    /// Configured schedule, or the built-in tariff when no file is set.
    pub fn fee_schedule(&self) -> Result<FeeSchedule, ConfigError> {
        match &self.fee_schedule_path {
            Some(path) => FeeSchedule::from_path(path).map_err(|source| ConfigError::FeeSchedule {
                path: path.clone(),
                source,
            }),
            None => Ok(FeeSchedule::standard()),
        }
    }
}

/// Gateway credentials. A gateway missing any mandatory setting stays `None`.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub himkosh: Option<HimKoshConfig>,
    pub aggregator: Option<AggregatorConfig>,
    pub manual_upi: Option<ManualUpiConfig>,
}

impl GatewayConfig {
    fn load() -> Result<Self, ConfigError> {
        let himkosh = match (
            optional("HIMKOSH_PORTAL_URL"),
            optional("HIMKOSH_VERIFY_URL"),
            optional("HIMKOSH_MERCHANT_CODE"),
            optional("HIMKOSH_DEPARTMENT_ID"),
            optional("HIMKOSH_SERVICE_CODE"),
            optional("HIMKOSH_RETURN_URL"),
            optional("HIMKOSH_CHECKSUM_KEY"),
        ) {
            (
                Some(portal_url),
                Some(verify_url),
                Some(merchant_code),
                Some(department_id),
                Some(service_code),
                Some(return_url),
                Some(checksum_key),
            ) => Some(HimKoshConfig {
                portal_url,
                verify_url,
                merchant_code,
                department_id,
                service_code,
                return_url,
                checksum_key,
            }),
            _ => None,
        };

        let aggregator = match (optional("AGGREGATOR_BASE_URL"), optional("AGGREGATOR_API_KEY")) {
            (Some(base_url), Some(api_key)) => {
                let return_url = optional("AGGREGATOR_RETURN_URL").unwrap_or_default();
                Some(
                    AggregatorConfig::new(&base_url, api_key, return_url).map_err(|source| {
                        ConfigError::InvalidUrl {
                            variable: "AGGREGATOR_BASE_URL",
                            source,
                        }
                    })?,
                )
            }
            _ => None,
        };

        let manual_upi = match (optional("MANUAL_UPI_VPA"), optional("MANUAL_UPI_PAYEE")) {
            (Some(vpa), Some(payee)) => Some(ManualUpiConfig { vpa, payee }),
            _ => None,
        };

        Ok(Self {
            himkosh,
            aggregator,
            manual_upi,
        })
    }
}

fn optional(variable: &str) -> Option<String> {
    env::var(variable)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn number<T: FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(variable) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable, value: raw }),
        None => Ok(default),
    }
}

fn parse_categories(raw: &str) -> Result<BTreeSet<Category>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value
                .parse::<Category>()
                .map_err(|message| ConfigError::InvalidCategory { message })
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidNumber {
        variable: &'static str,
        value: String,
    },
    OutOfRange {
        variable: &'static str,
        min: u64,
        max: u64,
    },
    InvalidCategory {
        message: String,
    },
    InvalidUrl {
        variable: &'static str,
        source: url::ParseError,
    },
    FeeSchedule {
        path: PathBuf,
        source: FeeScheduleError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{} must be a number, got '{}'", variable, value)
            }
            ConfigError::OutOfRange { variable, min, max } if *max == u64::MAX => {
                write!(f, "{} must be at least {}", variable, min)
            }
            ConfigError::OutOfRange { variable, min, max } => {
                write!(f, "{} must be between {} and {}", variable, min, max)
            }
            ConfigError::InvalidCategory { message } => {
                write!(f, "HOMESTAY_STATE_REVIEW_CATEGORIES: {}", message)
            }
            ConfigError::InvalidUrl { variable, .. } => {
                write!(f, "{} must be an absolute URL", variable)
            }
            ConfigError::FeeSchedule { path, source } => {
                write!(f, "fee schedule {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidUrl { source, .. } => Some(source),
            ConfigError::FeeSchedule { source, .. } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. }
            | ConfigError::InvalidCategory { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const VARIABLES: &[&str] = &[
        "APP_ENV",
        "APP_HOST",
        "APP_PORT",
        "APP_LOG_LEVEL",
        "HOMESTAY_FEE_SCHEDULE",
        "HOMESTAY_STATE_REVIEW_CATEGORIES",
        "HOMESTAY_GATEWAY_TIMEOUT_SECS",
        "HOMESTAY_RECONCILE_RETRIES",
        "HOMESTAY_RECONCILE_BACKOFF_MS",
        "HOMESTAY_PAYMENT_EXPIRY_MINUTES",
        "HOMESTAY_SWEEP_INTERVAL_SECS",
        "HIMKOSH_PORTAL_URL",
        "HIMKOSH_VERIFY_URL",
        "HIMKOSH_MERCHANT_CODE",
        "HIMKOSH_DEPARTMENT_ID",
        "HIMKOSH_SERVICE_CODE",
        "HIMKOSH_RETURN_URL",
        "HIMKOSH_CHECKSUM_KEY",
        "AGGREGATOR_BASE_URL",
        "AGGREGATOR_API_KEY",
        "AGGREGATOR_RETURN_URL",
        "MANUAL_UPI_VPA",
        "MANUAL_UPI_PAYEE",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for variable in VARIABLES {
            env::remove_var(variable);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.registration.gateway_timeout, Duration::from_secs(20));
        assert_eq!(
            config.registration.state_review_categories,
            BTreeSet::from([Category::Diamond])
        );
        assert!(config.gateways.himkosh.is_none());
        assert!(config.policy().console_enabled);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn rejects_gateway_timeout_outside_window() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HOMESTAY_GATEWAY_TIMEOUT_SECS", "45");
        let error = AppConfig::load().expect_err("timeout above 30s is refused");
        assert!(matches!(
            error,
            ConfigError::OutOfRange {
                variable: "HOMESTAY_GATEWAY_TIMEOUT_SECS",
                ..
            }
        ));
        reset_env();
    }

    #[test]
    fn gateways_with_partial_settings_stay_unregistered() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HIMKOSH_PORTAL_URL", "https://himkosh.example/pay");
        env::set_var("MANUAL_UPI_VPA", "tourism@upi");
        env::set_var("MANUAL_UPI_PAYEE", "Tourism Department");
        let config = AppConfig::load().expect("config loads");
        assert!(config.gateways.himkosh.is_none());
        assert_eq!(
            config.gateways.manual_upi,
            Some(ManualUpiConfig {
                vpa: "tourism@upi".to_string(),
                payee: "Tourism Department".to_string(),
            })
        );
        reset_env();
    }

    #[test]
    fn production_disables_console_and_parses_categories() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("HOMESTAY_STATE_REVIEW_CATEGORIES", "gold, Diamond");
        let config = AppConfig::load().expect("config loads");
        let policy = config.policy();
        assert!(!policy.console_enabled);
        assert_eq!(
            policy.state_review_categories,
            BTreeSet::from([Category::Diamond, Category::Gold])
        );
        reset_env();
    }

    #[test]
    fn rejects_unknown_review_category() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("HOMESTAY_STATE_REVIEW_CATEGORIES", "platinum");
        let error = AppConfig::load().expect_err("unknown category");
        assert!(matches!(error, ConfigError::InvalidCategory { .. }));
        reset_env();
    }
}
