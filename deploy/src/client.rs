use std::{ffi::OsStr, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, MiddlewareError, Provider},
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, TransactionReceipt, H256, U64},
    utils::{hex, Anvil, AnvilInstance},
};

use crate::{
    network::{Endpoint, NetworkConfig},
    utils::decode_revert_reason,
};

/// A signer bound to one network endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn sender(&self) -> Address;

    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256>;

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;

    async fn block_number(&self) -> Result<U64>;

    /// Replays `tx` against the state at `block` and returns why it reverts, if it does.
    async fn revert_reason(&self, tx: &TypedTransaction, block: U64) -> Option<String>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(
        &self,
        network: &NetworkConfig,
        signer: LocalWallet,
    ) -> Result<Box<dyn ChainClient>>;
}

const ANVIL_BINARY: &str = if cfg!(windows) { "anvil.exe" } else { "anvil" };

fn binary_on_path(binary: &str, path: &OsStr) -> bool {
    std::env::split_paths(path).any(|dir| dir.join(binary).is_file())
}

/// Connects over JSON-RPC, spawning a development node for in-memory networks.
#[derive(Debug, Clone)]
pub struct RpcConnector {
    poll_interval: Duration,
}

impl RpcConnector {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

#[async_trait]
impl ChainConnector for RpcConnector {
    async fn connect(
        &self,
        network: &NetworkConfig,
        signer: LocalWallet,
    ) -> Result<Box<dyn ChainClient>> {
        let (url, node) = match &network.endpoint {
            Endpoint::Http(url) => (url.clone(), None),
            Endpoint::InMemory => {
                let path = std::env::var_os("PATH").unwrap_or_default();
                if !binary_on_path(ANVIL_BINARY, &path) {
                    bail!("{} not found on PATH, it is needed for in-memory networks", ANVIL_BINARY);
                }
                let chain_id = network.chain_id;
                // Startup failures past this point still panic inside the blocking task.
                let node =
                    tokio::task::spawn_blocking(move || Anvil::new().chain_id(chain_id).spawn())
                        .await
                        .map_err(|e| anyhow!("failed to start in-memory node: {e}"))?;
                log::info!("started in-memory node at {}", node.endpoint());
                (node.endpoint(), Some(node))
            }
        };

        let provider = Provider::<Http>::try_from(url.as_str())?.interval(self.poll_interval);
        let remote_chain_id = provider.get_chainid().await?.as_u64();
        if remote_chain_id != network.chain_id {
            bail!(
                "{} reports chain id {} but network \"{}\" is configured with {}",
                url,
                remote_chain_id,
                network.name,
                network.chain_id
            );
        }

        let client = Arc::new(SignerMiddleware::new(
            provider,
            signer.with_chain_id(network.chain_id),
        ));
        Ok(Box::new(RpcClient {
            client,
            _node: node,
        }))
    }
}

pub struct RpcClient {
    client: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
    // Killed on drop, so it lives exactly as long as the client.
    _node: Option<AnvilInstance>,
}

#[async_trait]
impl ChainClient for RpcClient {
    fn sender(&self) -> Address {
        self.client.address()
    }

    async fn send_transaction(&self, mut tx: TypedTransaction) -> Result<H256> {
        self.client.fill_transaction(&mut tx, None).await?;
        let transaction_hash = self.client.send_transaction(tx, None).await?.tx_hash();
        Ok(transaction_hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.client.get_transaction_receipt(tx_hash).await?)
    }

    async fn block_number(&self) -> Result<U64> {
        Ok(self.client.get_block_number().await?)
    }

    async fn revert_reason(&self, tx: &TypedTransaction, block: U64) -> Option<String> {
        let err = self.client.call(tx, Some(block.into())).await.err()?;
        let reason = match err.as_error_response() {
            Some(response) => response
                .data
                .as_ref()
                .and_then(|data| data.as_str())
                .and_then(|data| hex::decode(data.trim_start_matches("0x")).ok())
                .and_then(|data| decode_revert_reason(&data))
                .unwrap_or_else(|| response.message.clone()),
            None => err.to_string(),
        };
        Some(reason)
    }
}
