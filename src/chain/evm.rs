//! Alloy-backed chain implementations
//!
//! `EvmSourceChain` polls logs over HTTP (rotating through fallback URLs on
//! failure) and optionally subscribes over websocket. `EvmDestinationChain`
//! builds raw EIP-1559 transactions with an explicit nonce and fee bid; no
//! alloy fillers are used so the dispatcher stays in control of both.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolEvent};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use chrono::Utc;
use eyre::{eyre, Result, WrapErr};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::rpc::create_providers;
use super::{DestinationChain, SourceChain, StateRootOracle, TxRequest};
use crate::config::ChainProfile;
use crate::contracts::{MessageBridge, StateOracle};
use crate::types::{
    ChainId, EventKind, EventRecord, ExecutionCall, FeeBid, MessageKey, MessageStatus,
    RelayMessage,
};

/// Buffered subscription events before the listener applies backpressure
const SUBSCRIPTION_BUFFER: usize = 256;

/// Chunk size for historical log queries (to avoid RPC limits)
const DEFAULT_MAX_BLOCK_RANGE: u64 = 2_000;

fn u256_to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| eyre!("{} {} does not fit in u64", field, value))
}

/// Parse a bridge contract log into a typed record.
///
/// Returns `Ok(None)` for logs that are not relay events, and for logs
/// removed by a reorg.
pub fn parse_bridge_log(chain_id: ChainId, log: &Log) -> Result<Option<EventRecord>> {
    if log.removed {
        warn!(
            chain_id,
            block_number = ?log.block_number,
            tx_hash = ?log.transaction_hash,
            log_index = ?log.log_index,
            "Skipping log removed by chain reorganization"
        );
        return Ok(None);
    }

    let Some(topic0) = log.topics().first().copied() else {
        return Ok(None);
    };

    let kind = if topic0 == MessageBridge::MessageSent::SIGNATURE_HASH {
        let decoded = log
            .log_decode::<MessageBridge::MessageSent>()
            .map_err(|e| eyre!("Failed to decode MessageSent: {}", e))?;
        let event = decoded.inner.data;
        EventKind::MessageSent(RelayMessage::new(
            u256_to_u64(event.nonce, "nonce")?,
            chain_id,
            u256_to_u64(event.destChainId, "destChainId")?,
            event.sender,
            event.target,
            event.payload,
            u256_to_u64(event.gasLimit, "gasLimit")?,
            u256_to_u64(event.timestamp, "timestamp")?,
        ))
    } else if topic0 == MessageBridge::MessageExecuted::SIGNATURE_HASH {
        let decoded = log
            .log_decode::<MessageBridge::MessageExecuted>()
            .map_err(|e| eyre!("Failed to decode MessageExecuted: {}", e))?;
        let event = decoded.inner.data;
        EventKind::MessageExecuted {
            key: MessageKey::new(
                u256_to_u64(event.sourceChainId, "sourceChainId")?,
                u256_to_u64(event.nonce, "nonce")?,
            ),
            message_hash: event.messageHash,
        }
    } else if topic0 == MessageBridge::MessageFailed::SIGNATURE_HASH {
        let decoded = log
            .log_decode::<MessageBridge::MessageFailed>()
            .map_err(|e| eyre!("Failed to decode MessageFailed: {}", e))?;
        let event = decoded.inner.data;
        EventKind::MessageFailed {
            key: MessageKey::new(
                u256_to_u64(event.sourceChainId, "sourceChainId")?,
                u256_to_u64(event.nonce, "nonce")?,
            ),
            message_hash: event.messageHash,
        }
    } else {
        return Ok(None);
    };

    let block_number = log
        .block_number
        .ok_or_else(|| eyre!("Missing block number"))?;
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| eyre!("Missing transaction hash"))?;

    Ok(Some(EventRecord {
        kind,
        chain_id,
        block_number,
        tx_hash,
        log_index: log.log_index.unwrap_or_default(),
        observed_at: Utc::now(),
    }))
}

// ============================================================================
// Source
// ============================================================================

/// EVM source chain: HTTP log polling with fallback, optional ws push
pub struct EvmSourceChain {
    chain_id: ChainId,
    bridge_address: Address,
    providers: Vec<RootProvider<Http<Client>>>,
    active: AtomicUsize,
    ws_url: Option<String>,
    max_block_range: u64,
}

impl EvmSourceChain {
    pub fn new(profile: &ChainProfile, max_block_range: u64) -> Result<Self> {
        let bridge_address = Address::from_str(&profile.bridge_address)
            .wrap_err_with(|| format!("Invalid bridge address for chain {}", profile.name))?;
        let providers = create_providers(&profile.rpc_urls)?;

        info!(
            chain_id = profile.chain_id,
            chain_name = %profile.name,
            rpc_endpoints = providers.len(),
            websocket = profile.ws_url.is_some(),
            "Created EVM source chain"
        );

        Ok(Self {
            chain_id: profile.chain_id,
            bridge_address,
            providers,
            active: AtomicUsize::new(0),
            ws_url: profile.ws_url.clone(),
            max_block_range: if max_block_range == 0 {
                DEFAULT_MAX_BLOCK_RANGE
            } else {
                max_block_range
            },
        })
    }

    fn provider(&self) -> &RootProvider<Http<Client>> {
        &self.providers[self.active.load(Ordering::Relaxed) % self.providers.len()]
    }

    /// Move to the next fallback endpoint after a transport failure
    fn rotate_provider(&self) {
        if self.providers.len() > 1 {
            let next = (self.active.fetch_add(1, Ordering::Relaxed) + 1) % self.providers.len();
            warn!(
                chain_id = self.chain_id,
                endpoint_index = next,
                "Switching to fallback RPC endpoint"
            );
        }
    }
}

#[async_trait]
impl SourceChain for EvmSourceChain {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn block_number(&self) -> Result<u64> {
        match self.provider().get_block_number().await {
            Ok(block) => Ok(block),
            Err(e) => {
                self.rotate_provider();
                Err(eyre!("Failed to get block number: {}", e))
            }
        }
    }

    async fn events_in_range(&self, from_block: u64, to_block: u64) -> Result<Vec<EventRecord>> {
        let mut records = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            let current_to = (current_from + self.max_block_range - 1).min(to_block);
            let filter = Filter::new()
                .address(self.bridge_address)
                .from_block(current_from)
                .to_block(current_to);

            let logs = match self.provider().get_logs(&filter).await {
                Ok(logs) => logs,
                Err(e) => {
                    self.rotate_provider();
                    return Err(eyre!(
                        "Failed to get logs {}..{}: {}",
                        current_from,
                        current_to,
                        e
                    ));
                }
            };

            for log in &logs {
                match parse_bridge_log(self.chain_id, log) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) => warn!(
                        chain_id = self.chain_id,
                        tx_hash = ?log.transaction_hash,
                        log_index = ?log.log_index,
                        error = %e,
                        "Failed to parse bridge log"
                    ),
                }
            }

            debug!(
                chain_id = self.chain_id,
                from_block = current_from,
                to_block = current_to,
                logs = logs.len(),
                "Scanned block range"
            );
            current_from = current_to + 1;
        }

        Ok(records)
    }

    async fn subscribe(&self) -> Result<Option<mpsc::Receiver<EventRecord>>> {
        let Some(ws_url) = self.ws_url.clone() else {
            return Ok(None);
        };

        let provider = ProviderBuilder::new()
            .on_ws(WsConnect::new(ws_url))
            .await
            .map_err(|e| eyre!("Failed to connect websocket: {}", e))?;
        let filter = Filter::new().address(self.bridge_address);
        let subscription = provider
            .subscribe_logs(&filter)
            .await
            .map_err(|e| eyre!("Failed to subscribe to logs: {}", e))?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let chain_id = self.chain_id;
        tokio::spawn(async move {
            // The provider owns the websocket; keep it alive with the stream.
            let _provider = provider;
            let mut stream = subscription.into_stream();
            while let Some(log) = stream.next().await {
                match parse_bridge_log(chain_id, &log) {
                    Ok(Some(record)) => {
                        if tx.send(record).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(chain_id, error = %e, "Failed to parse subscribed log"),
                }
            }
            debug!(chain_id, "Log subscription stream ended");
        });

        info!(chain_id, "Subscribed to bridge events");
        Ok(Some(rx))
    }
}

// ============================================================================
// Destination
// ============================================================================

type WalletProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    RootProvider<Http<Client>>,
    Http<Client>,
    Ethereum,
>;

fn to_sol_message(message: &RelayMessage) -> MessageBridge::Message {
    MessageBridge::Message {
        nonce: U256::from(message.nonce),
        sourceChainId: U256::from(message.source_chain_id),
        destChainId: U256::from(message.dest_chain_id),
        sender: message.sender,
        target: message.target,
        payload: message.payload.clone(),
        gasLimit: U256::from(message.gas_limit),
        timestamp: U256::from(message.timestamp),
    }
}

/// EVM destination chain bound to the relayer's signing key
pub struct EvmDestinationChain {
    chain_id: ChainId,
    bridge_address: Address,
    signer_address: Address,
    provider: WalletProvider,
}

impl EvmDestinationChain {
    pub fn new(profile: &ChainProfile, private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| eyre!("Invalid private key: {}", e))?;
        let signer_address = signer.address();
        let bridge_address = Address::from_str(&profile.bridge_address)
            .wrap_err_with(|| format!("Invalid bridge address for chain {}", profile.name))?;
        let rpc_url = profile
            .rpc_urls
            .first()
            .ok_or_else(|| eyre!("No RPC URL for chain {}", profile.name))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .on_http(rpc_url.parse().wrap_err("Invalid RPC URL")?);

        info!(
            chain_id = profile.chain_id,
            chain_name = %profile.name,
            relayer_address = %signer_address,
            bridge_address = %bridge_address,
            "Created EVM destination chain"
        );

        Ok(Self {
            chain_id: profile.chain_id,
            bridge_address,
            signer_address,
            provider,
        })
    }

    fn encode_call(&self, call: &ExecutionCall) -> (Address, Vec<u8>) {
        match call {
            ExecutionCall::WithProof {
                message,
                proof,
                anchor_block,
            } => (
                self.bridge_address,
                MessageBridge::executeMessageCall {
                    message: to_sol_message(message),
                    proof: proof.clone(),
                    anchorBlock: U256::from(*anchor_block),
                }
                .abi_encode(),
            ),
            ExecutionCall::Trusted { message } => (
                self.bridge_address,
                MessageBridge::executeMessageTrustedCall {
                    message: to_sol_message(message),
                }
                .abi_encode(),
            ),
            ExecutionCall::Cancel => (self.signer_address, Vec::new()),
        }
    }
}

#[async_trait]
impl DestinationChain for EvmDestinationChain {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn signer_address(&self) -> Address {
        self.signer_address
    }

    async fn message_status(&self, key: MessageKey) -> Result<MessageStatus> {
        let contract = MessageBridge::new(self.bridge_address, &self.provider);
        let status = contract
            .messageStatus(U256::from(key.source_chain_id), U256::from(key.nonce))
            .call()
            .await
            .map_err(|e| eyre!("Failed to query message status: {}", e))?;
        Ok(MessageStatus::from_u8(status._0))
    }

    async fn transaction_count(&self) -> Result<u64> {
        let nonce = self
            .provider
            .get_transaction_count(self.signer_address)
            .pending()
            .await
            .wrap_err("Failed to get transaction count")?;
        Ok(nonce)
    }

    async fn fee_estimate(&self) -> Result<FeeBid> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .wrap_err("Failed to get gas price")?;
        let priority = self
            .provider
            .get_max_priority_fee_per_gas()
            .await
            .wrap_err("Failed to get max priority fee")?;
        Ok(FeeBid {
            max_fee_per_gas: gas_price,
            max_priority_fee_per_gas: priority.min(gas_price),
        })
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256> {
        let (to, input) = self.encode_call(&request.call);
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(input)
            .with_value(U256::ZERO)
            .with_chain_id(self.chain_id)
            .with_nonce(request.nonce)
            .with_gas_limit(request.gas_limit)
            .with_max_fee_per_gas(request.fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(request.fees.max_priority_fee_per_gas);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| eyre!("Failed to send transaction: {}", e))?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: B256, timeout: Duration) -> Result<Option<bool>> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(500);

        while start.elapsed() < timeout {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| eyre!("Failed to get receipt: {}", e))?;
            if let Some(receipt) = receipt {
                return Ok(Some(receipt.status()));
            }
            tokio::time::sleep(poll_interval).await;
        }

        Ok(None)
    }

    async fn balance(&self) -> Result<U256> {
        let balance = self
            .provider
            .get_balance(self.signer_address)
            .await
            .wrap_err("Failed to get balance")?;
        Ok(balance)
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// Oracle contract on a destination chain holding source-chain roots
pub struct EvmStateOracle {
    provider: RootProvider<Http<Client>>,
    oracle_address: Address,
}

impl EvmStateOracle {
    pub fn new(profile: &ChainProfile, oracle_address: &str) -> Result<Self> {
        let oracle_address =
            Address::from_str(oracle_address).wrap_err("Invalid oracle address")?;
        let provider = create_providers(&profile.rpc_urls)?
            .into_iter()
            .next()
            .ok_or_else(|| eyre!("No RPC URL for chain {}", profile.name))?;
        Ok(Self {
            provider,
            oracle_address,
        })
    }
}

#[async_trait]
impl StateRootOracle for EvmStateOracle {
    async fn is_finalized(&self, chain_id: ChainId, block_number: u64) -> Result<bool> {
        let oracle = StateOracle::new(self.oracle_address, &self.provider);
        let finalized = oracle
            .isFinalized(U256::from(chain_id), U256::from(block_number))
            .call()
            .await
            .map_err(|e| eyre!("Failed to query oracle: {}", e))?;
        Ok(finalized._0)
    }

    async fn state_root(&self, chain_id: ChainId, block_number: u64) -> Result<Option<B256>> {
        let oracle = StateOracle::new(self.oracle_address, &self.provider);
        let root = oracle
            .stateRoot(U256::from(chain_id), U256::from(block_number))
            .call()
            .await
            .map_err(|e| eyre!("Failed to query oracle root: {}", e))?
            ._0;
        Ok((root != B256::ZERO).then_some(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, LogData};

    fn rpc_log(data: LogData, block: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: Address::repeat_byte(0x42),
                data,
            },
            block_hash: Some(B256::repeat_byte(0x01)),
            block_number: Some(block),
            block_timestamp: None,
            transaction_hash: Some(B256::repeat_byte(0x02)),
            transaction_index: Some(0),
            log_index: Some(3),
            removed: false,
        }
    }

    #[test]
    fn test_parse_message_sent_log() {
        let event = MessageBridge::MessageSent {
            nonce: U256::from(1),
            destChainId: U256::from(2),
            sender: Address::repeat_byte(0xaa),
            target: Address::repeat_byte(0xbb),
            payload: Bytes::new(),
            gasLimit: U256::from(200_000),
            timestamp: U256::from(1_700_000_000u64),
        };
        let log = rpc_log(event.encode_log_data(), 100);

        let record = parse_bridge_log(1, &log).unwrap().unwrap();
        assert_eq!(record.block_number, 100);
        assert_eq!(record.log_index, 3);
        match record.kind {
            EventKind::MessageSent(message) => {
                assert_eq!(message.key(), MessageKey::new(1, 1));
                assert_eq!(message.dest_chain_id, 2);
                assert_eq!(message.gas_limit, 200_000);
                assert!(message.verify_hash());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_removed_log_is_skipped() {
        let event = MessageBridge::MessageSent {
            nonce: U256::from(4),
            destChainId: U256::from(2),
            sender: Address::repeat_byte(0xaa),
            target: Address::repeat_byte(0xbb),
            payload: Bytes::new(),
            gasLimit: U256::from(200_000),
            timestamp: U256::from(1_700_000_000u64),
        };
        let mut log = rpc_log(event.encode_log_data(), 100);
        assert!(parse_bridge_log(1, &log).unwrap().is_some());

        log.removed = true;
        assert!(parse_bridge_log(1, &log).unwrap().is_none());
    }

    #[test]
    fn test_parse_message_executed_log() {
        let event = MessageBridge::MessageExecuted {
            sourceChainId: U256::from(1),
            nonce: U256::from(9),
            messageHash: B256::repeat_byte(0x33),
        };
        let log = rpc_log(event.encode_log_data(), 55);
        let record = parse_bridge_log(2, &log).unwrap().unwrap();
        assert_eq!(
            record.kind,
            EventKind::MessageExecuted {
                key: MessageKey::new(1, 9),
                message_hash: B256::repeat_byte(0x33),
            }
        );
    }

    #[test]
    fn test_parse_ignores_foreign_logs() {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0x99)], Bytes::new());
        assert!(parse_bridge_log(1, &rpc_log(data, 1)).unwrap().is_none());
        let empty = LogData::new_unchecked(vec![], Bytes::new());
        assert!(parse_bridge_log(1, &rpc_log(empty, 1)).unwrap().is_none());
    }

    #[test]
    fn test_nonce_overflow_rejected() {
        let event = MessageBridge::MessageSent {
            nonce: U256::MAX,
            destChainId: U256::from(2),
            sender: Address::ZERO,
            target: Address::ZERO,
            payload: Bytes::new(),
            gasLimit: U256::from(1),
            timestamp: U256::from(1),
        };
        let log = rpc_log(event.encode_log_data(), 1);
        assert!(parse_bridge_log(1, &log).is_err());
    }
}
