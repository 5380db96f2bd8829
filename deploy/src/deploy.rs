use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use ethers::{
    abi::Token,
    types::{
        transaction::eip2718::TypedTransaction, Address, TransactionReceipt, TransactionRequest,
        H256, U64,
    },
};
use serde::Serialize;

use crate::{
    client::{ChainClient, ChainConnector},
    contracts::ArtifactSource,
    errors::{ConfigError, DeployError, Error},
    network::NetworkConfig,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub contract_name: String,
    /// Positional, in constructor order.
    pub constructor_args: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub transaction_hash: H256,
    pub contract_address: Address,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Pending,
    Included,
    Confirmed,
    Reverted,
    Failed,
}

/// How long, and how, to wait for a deployment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploySettings {
    /// Blocks required on top of the inclusion block.
    pub confirmations: u64,
    /// Bound on the whole wait, from broadcast to confirmation.
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            confirmations: 0,
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractDeployer: Send + Sync {
    async fn deploy(
        &self,
        request: DeploymentRequest,
        network: &NetworkConfig,
    ) -> Result<DeploymentResult, Error>;
}

pub struct DeploymentExecutor<A, C> {
    artifacts: A,
    connector: C,
    settings: DeploySettings,
    broadcasts: Mutex<Vec<H256>>,
}

impl<A: ArtifactSource, C: ChainConnector> DeploymentExecutor<A, C> {
    pub fn new(artifacts: A, connector: C, settings: DeploySettings) -> Self {
        Self {
            artifacts,
            connector,
            settings,
            broadcasts: Mutex::default(),
        }
    }

    /// Hashes of every transaction this executor has broadcast, oldest first.
    pub fn broadcast_hashes(&self) -> Vec<H256> {
        self.broadcasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn wait_for_confirmation(
        &self,
        client: &dyn ChainClient,
        tx_hash: H256,
    ) -> anyhow::Result<TransactionReceipt> {
        let mut receipt = self.wait_for_receipt(client, tx_hash).await?;
        transition(tx_hash, DeploymentState::Included);
        loop {
            let Some(included_block) = receipt.block_number else {
                return Ok(receipt);
            };
            let target = included_block + self.settings.confirmations;
            loop {
                let head = client.block_number().await?;
                log::debug!("transaction {:?} at block {}, head {}", tx_hash, included_block, head);
                if head >= target {
                    break;
                }
                tokio::time::sleep(self.settings.poll_interval).await;
            }

            // A reorg may move or drop the receipt; confirmations restart from its new block.
            receipt = match client.transaction_receipt(tx_hash).await? {
                Some(current) if current.block_number == Some(included_block) => {
                    return Ok(current)
                }
                Some(current) => {
                    log::warn!(
                        "transaction {:?} moved from block {} to {:?}",
                        tx_hash,
                        included_block,
                        current.block_number
                    );
                    current
                }
                None => {
                    log::warn!("transaction {:?} dropped from block {}", tx_hash, included_block);
                    self.wait_for_receipt(client, tx_hash).await?
                }
            };
        }
    }

    async fn wait_for_receipt(
        &self,
        client: &dyn ChainClient,
        tx_hash: H256,
    ) -> anyhow::Result<TransactionReceipt> {
        loop {
            if let Some(receipt) = client.transaction_receipt(tx_hash).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

fn transition(tx_hash: H256, state: DeploymentState) {
    log::info!("transaction {:?}: {:?}", tx_hash, state);
}

#[async_trait]
impl<A: ArtifactSource, C: ChainConnector> ContractDeployer for DeploymentExecutor<A, C> {
    async fn deploy(
        &self,
        request: DeploymentRequest,
        network: &NetworkConfig,
    ) -> Result<DeploymentResult, Error> {
        let signer = network
            .default_signer()
            .cloned()
            .ok_or_else(|| ConfigError::NoSigner(network.name.clone()))?;

        let artifact = self.artifacts.load(&request.contract_name)?;
        let code = artifact.creation_code(&request.constructor_args)?;

        let client = self
            .connector
            .connect(network, signer)
            .await
            .map_err(|source| DeployError::Connection {
                network: network.name.clone(),
                source,
            })?;

        let tx = TypedTransaction::Legacy(TransactionRequest::new().from(client.sender()).data(code));
        let tx_hash = match client.send_transaction(tx.clone()).await {
            Ok(tx_hash) => tx_hash,
            Err(source) => {
                log::warn!("{} deployment: {:?}", request.contract_name, DeploymentState::Failed);
                return Err(DeployError::Broadcast(source).into());
            }
        };
        self.broadcasts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx_hash);
        log::info!(
            "{} deployment transaction hash:{:?}",
            request.contract_name,
            tx_hash
        );
        transition(tx_hash, DeploymentState::Pending);

        let timeout = self.settings.timeout;
        let receipt = tokio::time::timeout(timeout, self.wait_for_confirmation(&*client, tx_hash))
            .await
            .map_err(|_| DeployError::Timeout { tx_hash, timeout })?
            .map_err(|source| DeployError::Rpc { tx_hash, source })?;

        if receipt.status != Some(U64::one()) {
            transition(tx_hash, DeploymentState::Reverted);
            let replay_block = receipt
                .block_number
                .unwrap_or_default()
                .saturating_sub(U64::one());
            let reason = tokio::time::timeout(timeout, client.revert_reason(&tx, replay_block))
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| "unknown reason".to_string());
            return Err(DeployError::Reverted { tx_hash, reason }.into());
        }

        let contract_address = receipt
            .contract_address
            .ok_or(DeployError::MissingAddress { tx_hash })?;
        transition(tx_hash, DeploymentState::Confirmed);

        Ok(DeploymentResult {
            transaction_hash: tx_hash,
            contract_address,
            confirmed: true,
        })
    }
}
