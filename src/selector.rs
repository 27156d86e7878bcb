//! Function Selector Registry
//!
//! Maps 4-byte selectors to a minimal argument schema and decodes ABI-encoded
//! arguments positionally through alloy's dynamic ABI types. Only a fixed set
//! of well-known functions is registered; anything else is reported as
//! unknown.

use std::collections::HashMap;
use std::fmt;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{keccak256, Address, Bytes, U256};
use thiserror::Error;

/// `multiSend(bytes)` - 0x8d80ff0a
pub const MULTI_SEND_SELECTOR: [u8; 4] = [0x8d, 0x80, 0xff, 0x0a];

/// Argument names treated as the recipient of a call
pub const RECIPIENT_PARAM_NAMES: &[&str] = &["to", "recipient", "dst"];

/// Argument names treated as the amount moved by a call
pub const AMOUNT_PARAM_NAMES: &[&str] = &["amount", "value", "wad"];

/// Errors that can occur while decoding ABI arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Calldata too short for a selector")]
    MissingSelector,

    #[error("ABI decoding failed: {0}")]
    Decode(String),

    #[error("Decoded value does not fit the schema: {0}")]
    Unexpected(String),
}

impl From<alloy::dyn_abi::Error> for AbiError {
    fn from(e: alloy::dyn_abi::Error) -> Self {
        AbiError::Decode(e.to_string())
    }
}

/// Semantic argument type understood by the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    Uint,
    Address,
    Bool,
    Bytes,
    String,
    Array(Box<AbiType>),
}

impl AbiType {
    /// Equivalent alloy dynamic type
    pub fn sol_type(&self) -> DynSolType {
        match self {
            AbiType::Uint => DynSolType::Uint(256),
            AbiType::Address => DynSolType::Address,
            AbiType::Bool => DynSolType::Bool,
            AbiType::Bytes => DynSolType::Bytes,
            AbiType::String => DynSolType::String,
            AbiType::Array(inner) => DynSolType::Array(Box::new(inner.sol_type())),
        }
    }

    /// Canonical type name as it appears in a function signature
    pub fn canonical(&self) -> String {
        self.sol_type().sol_type_name().into_owned()
    }

    /// Dynamic types are stored behind an offset in the head
    pub fn is_dynamic(&self) -> bool {
        matches!(self, AbiType::Bytes | AbiType::String | AbiType::Array(_))
    }
}

/// Decoded argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(U256),
    Address(Address),
    Bool(bool),
    Bytes(Bytes),
    String(String),
    Array(Vec<AbiValue>),
}

impl AbiValue {
    pub fn as_address(&self) -> Option<Address> {
        match self {
            AbiValue::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            AbiValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            AbiValue::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl TryFrom<DynSolValue> for AbiValue {
    type Error = AbiError;

    fn try_from(value: DynSolValue) -> Result<Self, Self::Error> {
        match value {
            DynSolValue::Uint(v, _) => Ok(AbiValue::Uint(v)),
            DynSolValue::Address(a) => Ok(AbiValue::Address(a)),
            DynSolValue::Bool(b) => Ok(AbiValue::Bool(b)),
            DynSolValue::Bytes(b) => Ok(AbiValue::Bytes(Bytes::from(b))),
            DynSolValue::String(s) => Ok(AbiValue::String(s)),
            DynSolValue::Array(items) => items
                .into_iter()
                .map(AbiValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(AbiValue::Array),
            other => Err(AbiError::Unexpected(format!("{:?}", other))),
        }
    }
}

/// A named positional argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: AbiType,
}

impl Param {
    pub fn new(name: &'static str, kind: AbiType) -> Self {
        Self { name, kind }
    }
}

/// Minimal schema for one known function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSchema {
    name: &'static str,
    params: Vec<Param>,
    signature: String,
    selector: [u8; 4],
}

impl FunctionSchema {
    /// Build a schema; the selector is derived from the canonical signature
    pub fn new(name: &'static str, params: Vec<Param>) -> Self {
        let types: Vec<String> = params.iter().map(|p| p.kind.canonical()).collect();
        let signature = format!("{}({})", name, types.join(","));
        let hash = keccak256(signature.as_bytes());
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&hash[..4]);
        Self {
            name,
            params,
            signature,
            selector,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    /// Returns the selector hex-encoded with 0x prefix
    pub fn hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector))
    }

    /// Position of the first address argument named like a recipient
    pub fn recipient_index(&self) -> Option<usize> {
        self.params
            .iter()
            .position(|p| p.kind == AbiType::Address && RECIPIENT_PARAM_NAMES.contains(&p.name))
    }

    /// Position of the first integer argument named like an amount
    pub fn amount_index(&self) -> Option<usize> {
        self.params
            .iter()
            .position(|p| p.kind == AbiType::Uint && AMOUNT_PARAM_NAMES.contains(&p.name))
    }

    /// Alloy tuple type of the full argument list
    pub fn sol_type(&self) -> DynSolType {
        DynSolType::Tuple(self.params.iter().map(|p| p.kind.sol_type()).collect())
    }

    /// Decode the argument block that follows the selector
    pub fn decode_arguments(&self, args: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        if self.params.is_empty() {
            return Ok(Vec::new());
        }
        match self.sol_type().abi_decode_sequence(args)? {
            DynSolValue::Tuple(values) => values.into_iter().map(AbiValue::try_from).collect(),
            other => Err(AbiError::Unexpected(format!("{:?}", other))),
        }
    }

    /// Decode full calldata, checking that the selector matches
    pub fn decode_call(&self, calldata: &[u8]) -> Result<Option<Vec<AbiValue>>, AbiError> {
        let method_id = extract_method_id(calldata).ok_or(AbiError::MissingSelector)?;
        if method_id != self.selector {
            return Ok(None);
        }
        self.decode_arguments(&calldata[4..]).map(Some)
    }
}

impl fmt::Display for FunctionSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.signature, self.hex())
    }
}

/// Read-only selector lookup table
#[derive(Debug, Clone, Default)]
pub struct SelectorRegistry {
    entries: HashMap<[u8; 4], FunctionSchema>,
}

impl SelectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the token and batching functions we resolve
    pub fn standard() -> Self {
        use AbiType::{Address, Array, Bytes, Uint};

        let mut registry = Self::new();
        registry.register(FunctionSchema::new(
            "multiSend",
            vec![Param::new("transactions", Bytes)],
        ));
        registry.register(FunctionSchema::new(
            "transfer",
            vec![Param::new("to", Address), Param::new("amount", Uint)],
        ));
        registry.register(FunctionSchema::new(
            "transferFrom",
            vec![
                Param::new("from", Address),
                Param::new("to", Address),
                Param::new("amount", Uint),
            ],
        ));
        registry.register(FunctionSchema::new(
            "approve",
            // Allowance is not a transfer, so it never becomes a value hint
            vec![Param::new("spender", Address), Param::new("allowance", Uint)],
        ));
        // ERC-721
        registry.register(FunctionSchema::new(
            "safeTransferFrom",
            vec![
                Param::new("from", Address),
                Param::new("to", Address),
                Param::new("tokenId", Uint),
            ],
        ));
        // ERC-1155
        registry.register(FunctionSchema::new(
            "safeTransferFrom",
            vec![
                Param::new("from", Address),
                Param::new("to", Address),
                Param::new("id", Uint),
                Param::new("amount", Uint),
                Param::new("data", Bytes),
            ],
        ));
        registry.register(FunctionSchema::new(
            "safeBatchTransferFrom",
            vec![
                Param::new("from", Address),
                Param::new("to", Address),
                Param::new("ids", Array(Box::new(Uint))),
                Param::new("amounts", Array(Box::new(Uint))),
                Param::new("data", Bytes),
            ],
        ));
        // WETH
        registry.register(FunctionSchema::new("withdraw", vec![Param::new("wad", Uint)]));
        registry.register(FunctionSchema::new("deposit", vec![]));
        registry
    }

    /// Add a schema, replacing any entry with the same selector
    pub fn register(&mut self, schema: FunctionSchema) {
        self.entries.insert(schema.selector(), schema);
    }

    pub fn get(&self, method_id: &[u8; 4]) -> Option<&FunctionSchema> {
        self.entries.get(method_id)
    }

    /// Look up the schema for a piece of calldata by its leading selector
    pub fn lookup(&self, calldata: &[u8]) -> Option<&FunctionSchema> {
        extract_method_id(calldata).and_then(|id| self.get(&id))
    }

    /// Human-readable name for a selector, if known
    pub fn method_name(&self, method_id: &[u8; 4]) -> Option<&'static str> {
        self.get(method_id).map(FunctionSchema::name)
    }

    pub fn contains(&self, method_id: &[u8; 4]) -> bool {
        self.entries.contains_key(method_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract method ID from transaction input data
///
/// # Returns
/// `Some([u8; 4])` if input has at least 4 bytes, `None` otherwise
pub fn extract_method_id(input: &[u8]) -> Option<[u8; 4]> {
    if input.len() < 4 {
        return None;
    }
    let mut method_id = [0u8; 4];
    method_id.copy_from_slice(&input[..4]);
    Some(method_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn word(v: u64) -> [u8; 32] {
        U256::from(v).to_be_bytes::<32>()
    }

    fn address_word(a: Address) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[12..].copy_from_slice(a.as_slice());
        w
    }

    // ==================== selector derivation tests ====================

    #[test]
    fn test_standard_selectors_match_known_values() {
        let registry = SelectorRegistry::standard();
        let known = [
            ("0x8d80ff0a", "multiSend(bytes)"),
            ("0xa9059cbb", "transfer(address,uint256)"),
            ("0x23b872dd", "transferFrom(address,address,uint256)"),
            ("0x095ea7b3", "approve(address,uint256)"),
            ("0x42842e0e", "safeTransferFrom(address,address,uint256)"),
            ("0xf242432a", "safeTransferFrom(address,address,uint256,uint256,bytes)"),
            (
                "0x2eb2c2d6",
                "safeBatchTransferFrom(address,address,uint256[],uint256[],bytes)",
            ),
            ("0x2e1a7d4d", "withdraw(uint256)"),
            ("0xd0e30db0", "deposit()"),
        ];

        for (hex_selector, signature) in known {
            let bytes = hex::decode(&hex_selector[2..]).unwrap();
            let id: [u8; 4] = bytes.try_into().unwrap();
            let schema = registry.get(&id).unwrap_or_else(|| panic!("{signature} missing"));
            assert_eq!(schema.signature(), signature);
            assert_eq!(schema.hex(), hex_selector);
        }
        assert_eq!(registry.len(), known.len());
    }

    #[test]
    fn test_multi_send_constant_matches_schema() {
        let schema = FunctionSchema::new("multiSend", vec![Param::new("transactions", AbiType::Bytes)]);
        assert_eq!(schema.selector(), MULTI_SEND_SELECTOR);
    }

    #[test]
    fn test_unknown_selector_returns_none() {
        let registry = SelectorRegistry::standard();
        assert!(registry.get(&[0x12, 0x34, 0x56, 0x78]).is_none());
        assert_eq!(registry.method_name(&[0x00, 0x00, 0x00, 0x00]), None);
    }

    #[test]
    fn test_lookup_short_input() {
        let registry = SelectorRegistry::standard();
        assert!(registry.lookup(&[0xa9, 0x05, 0x9c]).is_none());
        assert_eq!(registry.method_name(&[0xa9, 0x05, 0x9c, 0xbb]), Some("transfer"));
    }

    #[test]
    fn test_empty_registry() {
        let registry = SelectorRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains(&MULTI_SEND_SELECTOR));
    }

    #[test]
    fn test_recipient_and_amount_indices() {
        let registry = SelectorRegistry::standard();
        let transfer_from = registry.get(&[0x23, 0xb8, 0x72, 0xdd]).unwrap();
        assert_eq!(transfer_from.recipient_index(), Some(1));
        assert_eq!(transfer_from.amount_index(), Some(2));

        let approve = registry.get(&[0x09, 0x5e, 0xa7, 0xb3]).unwrap();
        assert_eq!(approve.recipient_index(), None);
        assert_eq!(approve.amount_index(), None);

        let withdraw = registry.get(&[0x2e, 0x1a, 0x7d, 0x4d]).unwrap();
        assert_eq!(withdraw.recipient_index(), None);
        assert_eq!(withdraw.amount_index(), Some(0));

        let nft = registry.get(&[0x42, 0x84, 0x2e, 0x0e]).unwrap();
        assert_eq!(nft.amount_index(), None);
    }

    // ==================== argument decoding tests ====================

    #[test]
    fn test_decode_transfer_arguments() {
        let recipient = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let mut calldata = vec![0xa9, 0x05, 0x9c, 0xbb];
        calldata.extend_from_slice(&address_word(recipient));
        calldata.extend_from_slice(&word(500));

        let registry = SelectorRegistry::standard();
        let schema = registry.lookup(&calldata).unwrap();
        let values = schema.decode_call(&calldata).unwrap().unwrap();
        assert_eq!(values, vec![AbiValue::Address(recipient), AbiValue::Uint(U256::from(500u64))]);
    }

    #[test]
    fn test_decode_call_with_other_selector() {
        let schema = FunctionSchema::new("withdraw", vec![Param::new("wad", AbiType::Uint)]);
        let calldata = [0xd0, 0xe3, 0x0d, 0xb0];
        assert_eq!(schema.decode_call(&calldata), Ok(None));
        assert_eq!(schema.decode_call(&[0x01]), Err(AbiError::MissingSelector));
    }

    #[test]
    fn test_decode_bool() {
        let schema = FunctionSchema::new("setFlag", vec![Param::new("flag", AbiType::Bool)]);
        assert_eq!(schema.decode_arguments(&word(1)).unwrap(), vec![AbiValue::Bool(true)]);
        assert_eq!(schema.decode_arguments(&word(0)).unwrap(), vec![AbiValue::Bool(false)]);
    }

    #[test]
    fn test_decode_no_arguments() {
        let schema = FunctionSchema::new("deposit", vec![]);
        assert!(schema.decode_arguments(&[]).unwrap().is_empty());
        assert_eq!(schema.sol_type(), DynSolType::Tuple(vec![]));
    }

    #[test]
    fn test_decode_truncated_arguments() {
        let schema = FunctionSchema::new(
            "transfer",
            vec![Param::new("to", AbiType::Address), Param::new("amount", AbiType::Uint)],
        );
        let args = address_word(Address::ZERO);
        assert!(matches!(
            schema.decode_arguments(&args),
            Err(AbiError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_dynamic_bytes_and_string() {
        let schema = FunctionSchema::new(
            "log",
            vec![Param::new("payload", AbiType::Bytes), Param::new("note", AbiType::String)],
        );
        let mut args = Vec::new();
        args.extend_from_slice(&word(0x40));
        args.extend_from_slice(&word(0x80));
        args.extend_from_slice(&word(3));
        let mut padded = [0u8; 32];
        padded[..3].copy_from_slice(&[0xde, 0xad, 0xbe]);
        args.extend_from_slice(&padded);
        args.extend_from_slice(&word(2));
        let mut text = [0u8; 32];
        text[..2].copy_from_slice(b"hi");
        args.extend_from_slice(&text);

        let values = schema.decode_arguments(&args).unwrap();
        assert_eq!(values[0], AbiValue::Bytes(Bytes::from(vec![0xde, 0xad, 0xbe])));
        assert_eq!(values[1], AbiValue::String("hi".to_string()));
    }

    #[test]
    fn test_decode_uint_array() {
        let schema = FunctionSchema::new(
            "batch",
            vec![Param::new("ids", AbiType::Array(Box::new(AbiType::Uint)))],
        );
        let mut args = Vec::new();
        args.extend_from_slice(&word(0x20));
        args.extend_from_slice(&word(2));
        args.extend_from_slice(&word(7));
        args.extend_from_slice(&word(9));

        let values = schema.decode_arguments(&args).unwrap();
        assert_eq!(
            values,
            vec![AbiValue::Array(vec![
                AbiValue::Uint(U256::from(7u64)),
                AbiValue::Uint(U256::from(9u64))
            ])]
        );
    }

    #[test]
    fn test_decode_array_of_strings() {
        let schema = FunctionSchema::new(
            "names",
            vec![Param::new("list", AbiType::Array(Box::new(AbiType::String)))],
        );
        let mut args = Vec::new();
        args.extend_from_slice(&word(0x20)); // offset of array
        args.extend_from_slice(&word(1)); // array length
        args.extend_from_slice(&word(0x20)); // element offset, relative to element heads
        args.extend_from_slice(&word(1));
        let mut text = [0u8; 32];
        text[0] = b'a';
        args.extend_from_slice(&text);

        let values = schema.decode_arguments(&args).unwrap();
        assert_eq!(values, vec![AbiValue::Array(vec![AbiValue::String("a".to_string())])]);
    }

    #[test]
    fn test_decode_oversized_length_fails() {
        let schema = FunctionSchema::new("blob", vec![Param::new("data", AbiType::Bytes)]);
        let mut args = Vec::new();
        args.extend_from_slice(&word(0x20));
        args.extend_from_slice(&[0xffu8; 32]);
        assert!(matches!(schema.decode_arguments(&args), Err(AbiError::Decode(_))));
    }

    #[test]
    fn test_decode_offset_past_end_fails() {
        let schema = FunctionSchema::new("blob", vec![Param::new("data", AbiType::Bytes)]);
        let args = word(0x1000);
        assert!(schema.decode_arguments(&args).is_err());
    }

    #[test]
    fn test_abi_type_canonical_names() {
        assert_eq!(AbiType::Array(Box::new(AbiType::Address)).canonical(), "address[]");
        assert_eq!(AbiType::Uint.canonical(), "uint256");
        assert_eq!(
            AbiType::Array(Box::new(AbiType::Uint)).sol_type(),
            DynSolType::Array(Box::new(DynSolType::Uint(256)))
        );
        assert!(AbiType::String.is_dynamic());
        assert!(!AbiType::Bool.is_dynamic());
    }

    #[test]
    fn test_value_conversion_rejects_unsupported_types() {
        let value = DynSolValue::Tuple(vec![DynSolValue::Bool(true)]);
        assert!(matches!(AbiValue::try_from(value), Err(AbiError::Unexpected(_))));

        let nested = DynSolValue::Array(vec![DynSolValue::Uint(U256::from(3u8), 256)]);
        assert_eq!(
            AbiValue::try_from(nested).unwrap(),
            AbiValue::Array(vec![AbiValue::Uint(U256::from(3u8))])
        );
    }

    #[test]
    fn test_extract_method_id() {
        assert_eq!(extract_method_id(&[0x38, 0xed, 0x17, 0x39, 0x00]), Some([0x38, 0xed, 0x17, 0x39]));
        assert_eq!(extract_method_id(&[0x38, 0xed]), None);
        assert_eq!(extract_method_id(&[]), None);
    }
}
