//! Alloy-backed chain gateway.
//!
//! Signs with a local private key over HTTP JSON-RPC. All transactions from
//! the signer go through `submit_lock`, held from gas estimation until the
//! receipt arrives, so nonces are assigned strictly one at a time even when
//! several markets resolve concurrently.

use crate::chain::abi::{IMarketFactory, IPredictionMarket, IResolutionOracle, MarketInfo};
use crate::chain::{ChainError, ChainGateway, PendingResolution};
use crate::config::ChainConfig;
use crate::market::{KindTag, Market, MarketId};
use crate::predicate::Outcome;

use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::{Address, B256};
use alloy::providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct AlloyChainGateway {
    provider: DynProvider,
    oracle: Address,
    factory: Address,
    gas_multiplier: f64,
    submit_lock: Mutex<()>,
}

fn rpc<E: std::fmt::Display>(e: E) -> ChainError {
    ChainError::Rpc(e.to_string())
}

impl AlloyChainGateway {
    pub fn connect(config: &ChainConfig) -> Result<Self, ChainError> {
        let signer = PrivateKeySigner::from_str(config.private_key.trim())
            .map_err(|e| ChainError::Config(format!("private key: {}", e)))?;
        let signer_address = signer.address();

        let oracle = Address::from_str(&config.oracle_address)
            .map_err(|e| ChainError::Config(format!("oracle address: {}", e)))?;
        let factory = Address::from_str(&config.factory_address)
            .map_err(|e| ChainError::Config(format!("factory address: {}", e)))?;

        let url = config
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Config(format!("rpc url: {}", e)))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        info!(
            signer = %signer_address,
            oracle = %oracle,
            factory = %factory,
            "chain gateway configured"
        );

        Ok(Self {
            provider,
            oracle,
            factory,
            gas_multiplier: config.gas_multiplier,
            submit_lock: Mutex::new(()),
        })
    }

    fn scale_gas(&self, estimate: u64) -> u64 {
        ((estimate as f64) * self.gas_multiplier).ceil() as u64
    }

    /// Wait for a sent transaction to be mined. If the wait itself fails the
    /// hash is looked up once more; a transaction still not found is reported
    /// as `Unconfirmed` so callers never re-send it blindly.
    async fn confirm(
        &self,
        market: MarketId,
        action: &'static str,
        pending: PendingTransactionBuilder<Ethereum>,
    ) -> Result<String, ChainError> {
        let tx_hash = *pending.tx_hash();
        let receipt = match pending.get_receipt().await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(market = %market, tx = %tx_hash, error = %e, "{} receipt wait failed", action);
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => receipt,
                    _ => {
                        return Err(ChainError::Unconfirmed {
                            tx: tx_hash.to_string(),
                        })
                    }
                }
            }
        };

        let tx = receipt.transaction_hash.to_string();
        if !receipt.status() {
            warn!(market = %market, tx = %tx, "{} reverted", action);
            return Err(ChainError::Reverted { tx });
        }
        Ok(tx)
    }
}

fn market_from_info(id: MarketId, info: MarketInfo) -> Result<Market, ChainError> {
    let threshold = i128::try_from(info.threshold)
        .map_err(|e| ChainError::Decode(format!("threshold {}: {}", info.threshold, e)))?;

    Ok(Market {
        id,
        subject_kind: KindTag::Code(info.subjectKind),
        window_kind: KindTag::Code(info.windowKind),
        predicate_op: KindTag::Code(info.predicateOp),
        subject_id: info.subjectId,
        threshold,
        value_decimals: u32::from(info.valueDecimals),
        window_start: info.windowStart,
        window_end: info.windowEnd,
        resolve_time: info.resolveTime,
        resolved: info.resolved,
        cancelled: info.cancelled,
        pool_yes: info.poolYes.saturating_to::<u128>(),
        pool_no: info.poolNo.saturating_to::<u128>(),
    })
}

#[async_trait]
impl ChainGateway for AlloyChainGateway {
    async fn market(&self, market: MarketId) -> Result<Market, ChainError> {
        let factory = IMarketFactory::new(self.factory, self.provider.clone());
        let registered = factory.isMarket(market).call().await.map_err(rpc)?;
        if !registered {
            return Err(ChainError::UnknownMarket(market));
        }

        let info = IPredictionMarket::new(market, self.provider.clone())
            .getMarketInfo()
            .call()
            .await
            .map_err(rpc)?;
        market_from_info(market, info)
    }

    async fn pending_resolution(
        &self,
        market: MarketId,
    ) -> Result<Option<PendingResolution>, ChainError> {
        let oracle = IResolutionOracle::new(self.oracle, self.provider.clone());
        let pending = oracle.pendingResolutions(market).call().await.map_err(rpc)?;

        if pending.commitTime.is_zero() {
            return Ok(None);
        }
        Ok(Some(PendingResolution {
            outcome: pending.outcome,
            data_hash: pending.dataHash,
            commit_time: pending.commitTime.saturating_to::<u64>(),
        }))
    }

    async fn dispute_window_seconds(&self) -> Result<u64, ChainError> {
        let oracle = IResolutionOracle::new(self.oracle, self.provider.clone());
        let window = oracle.DISPUTE_WINDOW().call().await.map_err(rpc)?;
        Ok(window.saturating_to::<u64>())
    }

    async fn commit(
        &self,
        market: MarketId,
        outcome: Outcome,
        data_hash: B256,
    ) -> Result<String, ChainError> {
        let _nonce_guard = self.submit_lock.lock().await;

        let oracle = IResolutionOracle::new(self.oracle, self.provider.clone());
        let call = oracle.commitResolution(market, outcome.as_u8(), data_hash);
        let gas = call.estimate_gas().await.map_err(rpc)?;
        debug!(market = %market, gas, "submitting commit");

        let pending = call
            .gas(self.scale_gas(gas))
            .send()
            .await
            .map_err(rpc)?;
        let tx = self.confirm(market, "commit", pending).await?;
        info!(market = %market, outcome = outcome.as_u8(), tx = %tx, "commit confirmed");
        Ok(tx)
    }

    async fn finalize(&self, market: MarketId) -> Result<String, ChainError> {
        let _nonce_guard = self.submit_lock.lock().await;

        let oracle = IResolutionOracle::new(self.oracle, self.provider.clone());
        let call = oracle.finalizeResolution(market);
        let gas = call.estimate_gas().await.map_err(rpc)?;
        debug!(market = %market, gas, "submitting finalize");

        let pending = call
            .gas(self.scale_gas(gas))
            .send()
            .await
            .map_err(rpc)?;
        let tx = self.confirm(market, "finalize", pending).await?;
        info!(market = %market, tx = %tx, "finalize confirmed");
        Ok(tx)
    }
}
