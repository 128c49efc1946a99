use alloy::{
    consensus::TxEnvelope,
    primitives::{Address, TxHash, U256},
    providers::{Provider, RootProvider},
    rpc::{client::ClientBuilder, types::TransactionRequest},
    transports::http::Http,
};

/// Receipt data the submitter cares about once a transaction is mined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inclusion {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// The handful of RPC calls a claim needs.
#[allow(async_fn_in_trait)]
pub trait ChainClient {
    async fn chain_id(&self) -> eyre::Result<u64>;

    async fn balance(&self, address: Address) -> eyre::Result<U256>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> eyre::Result<u64>;

    async fn nonce(&self, address: Address) -> eyre::Result<u64>;

    async fn send_raw(&self, envelope: TxEnvelope) -> eyre::Result<TxHash>;

    /// `None` while the transaction is still pending.
    async fn receipt(&self, tx_hash: TxHash) -> eyre::Result<Option<Inclusion>>;
}

pub struct RpcChain {
    provider: RootProvider<Http<reqwest::Client>>,
}

impl RpcChain {
    pub fn new(rpc_url: &str) -> eyre::Result<Self> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| eyre::eyre!("Invalid RPC url `{rpc_url}`: {e}"))?;

        let client = ClientBuilder::default().transport(Http::<reqwest::Client>::new(url), false);

        Ok(Self {
            provider: RootProvider::new(client),
        })
    }
}

impl ChainClient for RpcChain {
    async fn chain_id(&self) -> eyre::Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn balance(&self, address: Address) -> eyre::Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> eyre::Result<u64> {
        let gas = self.provider.estimate_gas(tx).await?;
        Ok(gas.try_into()?)
    }

    async fn nonce(&self, address: Address) -> eyre::Result<u64> {
        Ok(self.provider.get_transaction_count(address).await?)
    }

    async fn send_raw(&self, envelope: TxEnvelope) -> eyre::Result<TxHash> {
        let pending_tx = self.provider.send_tx_envelope(envelope).await?;
        Ok(*pending_tx.tx_hash())
    }

    async fn receipt(&self, tx_hash: TxHash) -> eyre::Result<Option<Inclusion>> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;

        Ok(receipt.map(|receipt| Inclusion {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
        }))
    }
}
