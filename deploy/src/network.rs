//! Static network definitions and the credentials injected into them.

use std::collections::{BTreeMap, HashMap};

use ethers::signers::LocalWallet;

use crate::{errors::ConfigError, utils::parse_private_key};

/// First account of the standard development mnemonic, used by the in-memory network.
const DEV_PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const DEFAULT_NETWORK: &str = "hardhat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http(String),
    /// A development node spawned for the duration of a deployment.
    InMemory,
}

enum Accounts {
    Env(&'static str),
    DevAccount,
}

struct NetworkDefinition {
    name: &'static str,
    chain_id: u64,
    url: Option<&'static str>,
    accounts: Accounts,
}

const NETWORKS: &[NetworkDefinition] = &[
    NetworkDefinition {
        name: "adafel",
        chain_id: 3995596960668836,
        url: Some("https://testnet-rpc.adafel.com"),
        accounts: Accounts::Env("PRIVATE_KEY_ADAFEL"),
    },
    NetworkDefinition {
        name: "hardhat",
        chain_id: 1337,
        url: None,
        accounts: Accounts::DevAccount,
    },
    NetworkDefinition {
        name: "localhost",
        chain_id: 31337,
        url: Some("http://127.0.0.1:8545"),
        accounts: Accounts::Env("PRIVATE_KEY_LOCALHOST"),
    },
];

/// Private keys read from the designated environment variables, keyed by variable name.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<&'static str, String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|variable| std::env::var(variable).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let keys = NETWORKS
            .iter()
            .filter_map(|network| match network.accounts {
                Accounts::Env(variable) => lookup(variable)
                    .filter(|key| !key.trim().is_empty())
                    .map(|key| (variable, key)),
                Accounts::DevAccount => None,
            })
            .collect();
        Self { keys }
    }

    fn accounts(&self, variable: &'static str) -> Result<Vec<LocalWallet>, ConfigError> {
        self.keys
            .get(variable)
            .map(|key| parse_private_key(key))
            .transpose()
            .map(|wallet| wallet.into_iter().collect())
            .map_err(|source| ConfigError::InvalidKey { variable, source })
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub endpoint: Endpoint,
    pub accounts: Vec<LocalWallet>,
}

impl NetworkConfig {
    pub fn rpc_url(&self) -> Option<&str> {
        match &self.endpoint {
            Endpoint::Http(url) => Some(url),
            Endpoint::InMemory => None,
        }
    }

    pub fn default_signer(&self) -> Option<&LocalWallet> {
        self.accounts.first()
    }
}

#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkRegistry {
    pub fn new(credentials: &Credentials) -> Result<Self, ConfigError> {
        let mut networks = BTreeMap::new();
        for definition in NETWORKS {
            let accounts = match definition.accounts {
                Accounts::Env(variable) => credentials.accounts(variable)?,
                Accounts::DevAccount => vec![parse_private_key(DEV_PRIVATE_KEY).map_err(
                    |source| ConfigError::InvalidKey {
                        variable: "built-in development account",
                        source,
                    },
                )?],
            };
            let endpoint = match definition.url {
                Some(url) => Endpoint::Http(url.to_string()),
                None => Endpoint::InMemory,
            };
            let config = NetworkConfig {
                name: definition.name.to_string(),
                chain_id: definition.chain_id,
                endpoint,
                accounts,
            };
            log::debug!(
                "network {} chain id {} with {} account(s)",
                config.name,
                config.chain_id,
                config.accounts.len()
            );
            networks.insert(config.name.clone(), config);
        }
        Ok(Self { networks })
    }

    pub fn resolve(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }

    pub fn networks(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.values()
    }
}
