//! MultiSend Decoder
//!
//! Decodes the packed transaction list carried by a `multiSend(bytes)` call
//! and resolves where each inner transaction actually sends value.
//!
//! Packed layout per inner transaction:
//! `operation (1) | to (20) | value (32) | data length (32) | data (length)`

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use thiserror::Error;
use tracing::debug;

use crate::cursor::{BinaryCursor, CursorError};
use crate::selector::{extract_method_id, AbiValue, SelectorRegistry, MULTI_SEND_SELECTOR};

sol! {
    /// Safe MultiSend / MultiSendCallOnly entry point
    function multiSend(bytes transactions);
}

/// Bytes before the data payload of one packed transaction
pub const PACKED_HEADER_LEN: usize = 1 + 20 + 32 + 32;

/// Errors that can occur while preparing decoder input
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid hex input: {0}")]
    InvalidHex(String),
}

/// Call type of a batched sub-transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Call,
    DelegateCall,
}

impl Operation {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Operation::Call),
            1 => Some(Operation::DelegateCall),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

/// One sub-transaction read from a packed multiSend buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedTransaction {
    pub operation: Operation,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// Best-effort view of where a sub-transaction sends value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDestination {
    /// Decoded recipient argument, or the sub-transaction's own `to`
    pub address: Address,
    /// Share of the outer transaction's gas attributed to this call
    pub gas_hint: u64,
    /// Decoded amount argument, or the sub-transaction's own value
    pub value_hint: U256,
    pub operation: Operation,
    /// Name of the matched function, if the selector is known
    pub method: Option<&'static str>,
}

impl ResolvedDestination {
    fn from_packed(tx: &PackedTransaction) -> Self {
        Self {
            address: tx.to,
            gas_hint: 0,
            value_hint: tx.value,
            operation: tx.operation,
            method: None,
        }
    }
}

/// Decoder for `multiSend(bytes)` calldata
#[derive(Debug, Clone)]
pub struct MultiSendDecoder {
    registry: SelectorRegistry,
}

impl MultiSendDecoder {
    pub fn new(registry: SelectorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SelectorRegistry {
        &self.registry
    }

    /// Decode and resolve every sub-transaction of a multiSend call
    ///
    /// Calldata for any other function yields an empty vector. Malformed
    /// trailing data ends decoding after the last complete sub-transaction.
    pub fn decode_batch(&self, call_data: &[u8]) -> Vec<ResolvedDestination> {
        let Some(payload) = self.packed_payload(call_data) else {
            return Vec::new();
        };

        decode_packed(&payload)
            .iter()
            .map(|tx| self.resolve(tx))
            .collect()
    }

    /// Like [`decode_batch`](Self::decode_batch), spreading `outer_gas` over the results
    pub fn decode_batch_with_gas(&self, call_data: &[u8], outer_gas: u64) -> Vec<ResolvedDestination> {
        let mut destinations = self.decode_batch(call_data);
        let shares = split_gas(outer_gas, destinations.len());
        for (dest, gas) in destinations.iter_mut().zip(shares) {
            dest.gas_hint = gas;
        }
        destinations
    }

    /// Extract the packed `bytes` argument of a multiSend call
    pub fn packed_payload(&self, call_data: &[u8]) -> Option<Bytes> {
        if extract_method_id(call_data)? != MULTI_SEND_SELECTOR {
            return None;
        }
        match multiSendCall::abi_decode(call_data, false) {
            Ok(call) => Some(call.transactions),
            Err(e) => {
                debug!("Malformed multiSend argument: {}", e);
                None
            }
        }
    }

    /// Resolve the destination of one sub-transaction
    ///
    /// Falls back to the sub-transaction's own `to` and value when the inner
    /// selector is unknown or its arguments do not decode.
    pub fn resolve(&self, tx: &PackedTransaction) -> ResolvedDestination {
        let fallback = ResolvedDestination::from_packed(tx);
        let Some(schema) = self.registry.lookup(&tx.data) else {
            return fallback;
        };

        let values = match schema.decode_arguments(&tx.data[4..]) {
            Ok(values) => values,
            Err(e) => {
                debug!("Failed to decode {} arguments for {:#x}: {}", schema.name(), tx.to, e);
                return ResolvedDestination {
                    method: Some(schema.name()),
                    ..fallback
                };
            }
        };

        let mut resolved = ResolvedDestination {
            method: Some(schema.name()),
            ..fallback
        };
        if let Some(address) = schema
            .recipient_index()
            .and_then(|i| values.get(i))
            .and_then(AbiValue::as_address)
        {
            resolved.address = address;
        }
        if let Some(amount) = schema
            .amount_index()
            .and_then(|i| values.get(i))
            .and_then(AbiValue::as_uint)
        {
            resolved.value_hint = amount;
        }
        resolved
    }
}

impl Default for MultiSendDecoder {
    fn default() -> Self {
        Self::new(SelectorRegistry::standard())
    }
}

/// Decode all complete sub-transactions from a packed buffer
pub fn decode_packed(buf: &[u8]) -> Vec<PackedTransaction> {
    let mut cursor = BinaryCursor::new(buf);
    let mut transactions = Vec::new();

    while !cursor.is_empty() {
        match read_packed(&mut cursor) {
            Ok(Some(tx)) => transactions.push(tx),
            Ok(None) => break,
            Err(e) => {
                debug!(
                    "Packed buffer ended early after {} transactions: {}",
                    transactions.len(),
                    e
                );
                break;
            }
        }
    }

    transactions
}

/// Read the next sub-transaction; `None` marks unusable trailing data
fn read_packed(cursor: &mut BinaryCursor<'_>) -> Result<Option<PackedTransaction>, CursorError> {
    let op_byte = cursor.read_uint(1)? as u8;
    let Some(operation) = Operation::from_byte(op_byte) else {
        debug!("Unknown operation byte {:#04x} at offset {}", op_byte, cursor.position() - 1);
        return Ok(None);
    };

    let to = Address::from_slice(cursor.read_bytes(20)?);
    let value = cursor.read_big_uint(32)?;
    let declared_len = cursor.read_big_uint(32)?;
    if declared_len > U256::from(cursor.remaining()) {
        debug!(
            "Declared data length {} exceeds remaining {} bytes",
            declared_len,
            cursor.remaining()
        );
        return Ok(None);
    }
    let data = Bytes::copy_from_slice(cursor.read_bytes(declared_len.to::<usize>())?);

    Ok(Some(PackedTransaction {
        operation,
        to,
        value,
        data,
    }))
}

/// Encode sub-transactions into the packed multiSend layout
pub fn encode_packed(transactions: &[PackedTransaction]) -> Vec<u8> {
    let capacity = transactions
        .iter()
        .map(|tx| PACKED_HEADER_LEN + tx.data.len())
        .sum();
    let mut out = Vec::with_capacity(capacity);
    for tx in transactions {
        out.push(tx.operation.as_byte());
        out.extend_from_slice(tx.to.as_slice());
        out.extend_from_slice(&tx.value.to_be_bytes::<32>());
        out.extend_from_slice(&U256::from(tx.data.len()).to_be_bytes::<32>());
        out.extend_from_slice(&tx.data);
    }
    out
}

/// Build complete `multiSend(bytes)` calldata for the given sub-transactions
pub fn encode_multi_send(transactions: &[PackedTransaction]) -> Vec<u8> {
    multiSendCall {
        transactions: Bytes::from(encode_packed(transactions)),
    }
    .abi_encode()
}

/// Split `total` gas over `parts` calls; the remainder goes to the first call
pub fn split_gas(total: u64, parts: usize) -> Vec<u64> {
    if parts == 0 {
        return Vec::new();
    }
    let n = parts as u64;
    let mut shares = vec![total / n; parts];
    shares[0] += total % n;
    shares
}

/// Parse a hex string to bytes (with or without 0x prefix)
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, DecodeError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}
