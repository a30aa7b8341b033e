//! Configuration for the surety engine

use crate::types::{Address, Amount, IndexId, INDEXES_PER_ORACLE};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Genesis identities
    pub genesis: GenesisConfig,

    /// Airline admission rules
    pub governance: GovernanceConfig,

    /// Insurance escrow rules
    pub escrow: EscrowConfig,

    /// Oracle consensus rules
    pub oracle: OracleConfig,

    /// Storage backend
    pub storage: StorageConfig,

    /// Node runtime
    pub node: NodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            genesis: GenesisConfig::default(),
            governance: GovernanceConfig::default(),
            escrow: EscrowConfig::default(),
            oracle: OracleConfig::default(),
            storage: StorageConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

/// Genesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    /// Administrative identity (owns the operational flag)
    pub admin: Address,

    /// Seed airline, registered at genesis
    pub first_airline: Address,

    /// Seed airline name
    pub first_airline_name: String,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            admin: Address::from_low_u64(1),
            first_airline: Address::from_low_u64(2),
            first_airline_name: "Garuda Air".to_string(),
        }
    }
}

/// Governance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Registered airlines admitted without a vote below this count
    pub consensus_threshold: usize,

    /// Funding (ether) that unlocks governance rights
    pub min_funding: Decimal,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: 4,
            min_funding: Decimal::from(10),
        }
    }
}

/// Escrow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Largest premium (ether) accepted per purchase
    pub max_premium: Decimal,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            max_premium: Decimal::ONE,
        }
    }
}

/// Oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Oracle registration fee (ether)
    pub registration_fee: Decimal,

    /// Distinct matching responses that close a request
    pub min_responses: usize,

    /// Index slots are drawn from `0..index_space`
    pub index_space: IndexId,

    /// Age after which an authorized caller may push a default status
    pub request_timeout_secs: i64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            registration_fee: Decimal::ONE,
            min_responses: 3,
            index_space: 10,
            request_timeout_secs: 3600, // 1 hour
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process maps, lost on exit
    Memory,
    /// RocksDB column families
    Rocksdb,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend
    pub backend: StorageBackend,

    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB tuning
    pub rocksdb: RocksDBConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data/surety"),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

/// Node runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Engine actor mailbox size
    pub mailbox_capacity: usize,

    /// Event broadcast buffer
    pub event_capacity: usize,

    /// Oracles registered by the built-in responder fleet
    pub simulated_oracles: usize,

    /// Log format
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            event_capacity: 4096,
            simulated_oracles: 20,
            log_format: LogFormat::Pretty,
        }
    }
}

/// Resolved rule set, amounts in wei
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Direct admission below this many registered airlines
    pub consensus_threshold: usize,
    /// Funding that unlocks governance rights
    pub min_funding: Amount,
    /// Per-purchase premium cap
    pub max_premium: Amount,
    /// Oracle registration fee
    pub registration_fee: Amount,
    /// Quorum size
    pub min_responses: usize,
    /// Index space size
    pub index_space: IndexId,
    /// Default-status timeout
    pub request_timeout_secs: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            consensus_threshold: 4,
            min_funding: Amount::ether(10),
            max_premium: Amount::ether(1),
            registration_fee: Amount::ether(1),
            min_responses: 3,
            index_space: 10,
            request_timeout_secs: 3600,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(admin) = std::env::var("SURETY_ADMIN") {
            config.genesis.admin = Address::parse(&admin)?;
        }

        if let Ok(airline) = std::env::var("SURETY_FIRST_AIRLINE") {
            config.genesis.first_airline = Address::parse(&airline)?;
        }

        if let Ok(data_dir) = std::env::var("SURETY_DATA_DIR") {
            config.storage.data_dir = PathBuf::from(data_dir);
            config.storage.backend = StorageBackend::Rocksdb;
        }

        if let Ok(count) = std::env::var("SURETY_SIMULATED_ORACLES") {
            config.node.simulated_oracles = count
                .parse()
                .map_err(|e| Error::Config(format!("SURETY_SIMULATED_ORACLES: {}", e)))?;
        }

        if let Ok(format) = std::env::var("SURETY_LOG_FORMAT") {
            config.node.log_format = match format.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(Error::Config(format!("Unknown log format: {}", other)))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check rule sanity
    pub fn validate(&self) -> Result<()> {
        self.policy().map(|_| ())
    }

    /// Resolve the rule set into wei amounts
    pub fn policy(&self) -> Result<Policy> {
        if self.governance.consensus_threshold == 0 {
            return Err(Error::Config("consensus_threshold must be positive".to_string()));
        }

        if self.oracle.min_responses == 0 {
            return Err(Error::Config("min_responses must be positive".to_string()));
        }

        if (self.oracle.index_space as usize) < INDEXES_PER_ORACLE {
            return Err(Error::Config(format!(
                "index_space must be at least {}",
                INDEXES_PER_ORACLE
            )));
        }

        if self.oracle.request_timeout_secs < 0 {
            return Err(Error::Config("request_timeout_secs must not be negative".to_string()));
        }

        let ether = |name: &str, value: Decimal| {
            Amount::from_ether(value).map_err(|e| Error::Config(format!("{}: {}", name, e)))
        };

        Ok(Policy {
            consensus_threshold: self.governance.consensus_threshold,
            min_funding: ether("min_funding", self.governance.min_funding)?,
            max_premium: ether("max_premium", self.escrow.max_premium)?,
            registration_fee: ether("registration_fee", self.oracle.registration_fee)?,
            min_responses: self.oracle.min_responses,
            index_space: self.oracle.index_space,
            request_timeout_secs: self.oracle.request_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.governance.consensus_threshold, 4);
        assert_eq!(config.oracle.min_responses, 3);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.policy().unwrap(), Policy::default());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [genesis]
            admin = "0x00000000000000000000000000000000000000aa"

            [governance]
            min_funding = "2.5"

            [oracle]
            min_responses = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.genesis.admin, Address::from_low_u64(0xaa));
        assert_eq!(config.genesis.first_airline, Address::from_low_u64(2));

        let policy = config.policy().unwrap();
        assert_eq!(policy.min_funding.wei(), 2_500_000_000_000_000_000);
        assert_eq!(policy.min_responses, 5);
        assert_eq!(policy.index_space, 10);
    }

    #[test]
    fn test_rejects_small_index_space() {
        let mut config = Config::default();
        config.oracle.index_space = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_sub_wei_fee() {
        let mut config = Config::default();
        config.oracle.registration_fee = Decimal::new(1, 20);
        assert!(matches!(config.policy(), Err(Error::Config(_))));
    }
}
