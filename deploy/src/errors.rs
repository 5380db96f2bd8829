//! Errors surfaced by the deploy tool. None of them are retried.

use std::time::Duration;

use ethers::types::H256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown network \"{0}\"")]
    UnknownNetwork(String),

    #[error("network \"{0}\" has no configured account to sign with")]
    NoSigner(String),

    #[error("invalid private key in {variable}")]
    InvalidKey {
        variable: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Raised while validating task arguments, always before any network interaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("unknown task \"{0}\"")]
    UnknownTask(String),

    #[error("unrecognized parameter --{0}")]
    Unrecognized(String),

    #[error("unexpected argument {0:?}, parameters are passed as --name value")]
    Unexpected(String),

    #[error("parameter --{0} has no value")]
    NoValue(String),

    #[error("parameter --{0} given more than once")]
    Repeated(String),

    #[error("missing required parameter --{0}")]
    Missing(String),

    #[error("invalid value {value:?} for parameter --{name}: expected an unsigned integer")]
    Invalid { name: String, value: String },
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to load artifact for contract {name}")]
    Artifact {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("constructor arguments do not match the constructor of {contract}")]
    Encoding {
        contract: String,
        #[source]
        source: ethers::abi::Error,
    },

    #[error("failed to connect to network \"{network}\"")]
    Connection {
        network: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to broadcast deployment transaction")]
    Broadcast(#[source] anyhow::Error),

    #[error("rpc error while waiting for transaction {tx_hash:?}")]
    Rpc {
        tx_hash: H256,
        #[source]
        source: anyhow::Error,
    },

    #[error("transaction {tx_hash:?} was not confirmed within {timeout:?}")]
    Timeout { tx_hash: H256, timeout: Duration },

    #[error("transaction {tx_hash:?} reverted: {reason}")]
    Reverted { tx_hash: H256, reason: String },

    #[error("transaction {tx_hash:?} succeeded but created no contract")]
    MissingAddress { tx_hash: H256 },
}

impl DeployError {
    /// Hash of the broadcast transaction, when the failure happened after broadcast.
    pub fn transaction_hash(&self) -> Option<H256> {
        match self {
            DeployError::Rpc { tx_hash, .. }
            | DeployError::Timeout { tx_hash, .. }
            | DeployError::Reverted { tx_hash, .. }
            | DeployError::MissingAddress { tx_hash } => Some(*tx_hash),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error("failed to write output")]
    Io(#[from] std::io::Error),
}
