use crate::codec::{self, EncodedBody};
use crate::error::{BlockError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// SHA-256 hash as lowercase hex string.
pub type BlockHash = String;

/// Payload carried by every genesis block.
pub const GENESIS_DATA: &str = "Genesis Block";

/// Compute the SHA-256 hex digest of some data.
pub fn compute_hash(data: &[u8]) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Every field of a block except its hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct Header {
    height: u64,
    body: EncodedBody,
    time: i64,
    previous_block_hash: Option<BlockHash>,
}

impl Header {
    /// Canonical text the block hash is taken over. The hash slot is always null.
    fn hash_input(&self) -> String {
        codec::render(&json!({
            "hash": Value::Null,
            "height": self.height,
            "body": self.body.as_str(),
            "time": self.time,
            "previousBlockHash": self.previous_block_hash.as_deref(),
        }))
    }

    fn compute_hash(&self) -> BlockHash {
        compute_hash(self.hash_input().as_bytes())
    }
}

/// A block whose body is fixed but whose position has not been sealed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBlock {
    header: Header,
}

impl PendingBlock {
    /// Encode `data` into a new block body at height 0 with no timestamp or parent.
    pub fn new<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        Ok(Self::with_body(EncodedBody::encode(data)?))
    }

    /// Like [`PendingBlock::new`] for data that is already a JSON value.
    pub fn from_value(data: &Value) -> Self {
        Self::with_body(EncodedBody::from_value(data))
    }

    /// The first block of a sequence, carrying [`GENESIS_DATA`].
    pub fn genesis() -> Self {
        Self::from_value(&Value::from(GENESIS_DATA))
    }

    fn with_body(body: EncodedBody) -> Self {
        Self {
            header: Header {
                height: 0,
                body,
                time: 0,
                previous_block_hash: None,
            },
        }
    }

    pub fn at_height(mut self, height: u64) -> Self {
        self.header.height = height;
        self
    }

    pub fn with_previous_hash(mut self, hash: BlockHash) -> Self {
        self.header.previous_block_hash = Some(hash);
        self
    }

    /// Set the creation time in Unix seconds.
    pub fn with_time(mut self, time: i64) -> Self {
        self.header.time = time;
        self
    }

    /// Stamp the block with the current wall-clock second.
    pub fn created_now(self) -> Self {
        self.with_time(Utc::now().timestamp())
    }

    pub fn body(&self) -> &EncodedBody {
        &self.header.body
    }

    /// Compute the integrity hash and freeze the block.
    pub fn seal(self) -> Block {
        let hash = self.header.compute_hash();
        debug!(height = self.header.height, hash = %hash, "sealed block");
        Block {
            hash,
            header: self.header,
        }
    }
}

/// A sealed block. Fields are read-only; a block loaded from elsewhere may
/// still have been tampered with, which [`Block::validate`] detects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    hash: BlockHash,
    #[serde(flatten)]
    header: Header,
}

impl Block {
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn body(&self) -> &EncodedBody {
        &self.header.body
    }

    /// Creation time in Unix seconds.
    pub fn time(&self) -> i64 {
        self.header.time
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.header.time, 0)
    }

    pub fn previous_block_hash(&self) -> Option<&str> {
        self.header.previous_block_hash.as_deref()
    }

    pub fn is_genesis(&self) -> bool {
        self.header.height == 0
    }

    /// Recompute the hash over the current fields and compare it with the
    /// stored one. `false` means the block was altered after sealing.
    pub fn validate(&self) -> bool {
        let recomputed = self.header.compute_hash();
        if recomputed == self.hash {
            return true;
        }
        warn!(
            height = self.header.height,
            stored = %self.hash,
            recomputed = %recomputed,
            "block hash mismatch"
        );
        false
    }

    /// Decode the payload. Refused for the genesis block.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        if self.is_genesis() {
            debug!(hash = %self.hash, "refusing payload access on genesis block");
            return Err(BlockError::GenesisAccess);
        }
        self.header.body.decode()
    }

    /// Decode the payload as an untyped JSON value.
    pub fn data_value(&self) -> Result<Value> {
        self.data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Transfer {
        amount: u64,
        sender: String,
        receiver: String,
    }

    fn transfer() -> Transfer {
        Transfer {
            amount: 10,
            sender: "A".into(),
            receiver: "B".into(),
        }
    }

    fn sealed_transfer() -> Block {
        PendingBlock::new(&transfer())
            .unwrap()
            .at_height(1)
            .with_previous_hash("abc123".into())
            .with_time(1_700_000_000)
            .seal()
    }

    /// Replace the first hex digit of the body with a different one.
    fn flip_first_digit(body: &EncodedBody) -> EncodedBody {
        let s = body.as_str();
        let first = if s.starts_with('7') { '6' } else { '7' };
        EncodedBody::from_hex(format!("{}{}", first, &s[1..]))
    }

    #[test]
    fn new_block_defaults() {
        let pending = PendingBlock::new(&transfer()).unwrap();
        let block = pending.seal();
        assert_eq!(block.height(), 0);
        assert_eq!(block.time(), 0);
        assert_eq!(block.previous_block_hash(), None);
        assert_eq!(block.hash().len(), 64);
    }

    #[test]
    fn sealed_block_validates() {
        let block = sealed_transfer();
        assert!(block.validate());
        assert_eq!(block.data::<Transfer>().unwrap(), transfer());
    }

    #[test]
    fn validate_is_idempotent() {
        let block = sealed_transfer();
        let before = block.clone();
        for _ in 0..3 {
            assert!(block.validate());
        }
        assert_eq!(block, before);
    }

    #[test]
    fn hash_is_deterministic() {
        let a = sealed_transfer();
        let b = sealed_transfer();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.header.compute_hash(), a.header.compute_hash());
    }

    #[test]
    fn genesis_hash_vector() {
        let genesis = PendingBlock::genesis().seal();
        assert_eq!(genesis.body().as_str(), "2247656e6573697320426c6f636b22");
        assert_eq!(
            genesis.hash(),
            "4741e7c46deced0557ac15668df85f86c56a57e47eea1f4e262ef71ff594c962"
        );
        assert!(genesis.validate());
    }

    #[test]
    fn hash_input_holds_hash_slot_null() {
        let block = sealed_transfer();
        let input: Value = serde_json::from_str(&block.header.hash_input()).unwrap();
        assert_eq!(input["hash"], Value::Null);
        assert_eq!(input["height"], 1);
        assert_eq!(input["previousBlockHash"], "abc123");
    }

    #[test]
    fn hash_input_fields_are_in_sorted_order() {
        let block = sealed_transfer();
        let expected = format!(
            r#"{{"body":"{}","hash":null,"height":1,"previousBlockHash":"abc123","time":1700000000}}"#,
            block.body()
        );
        assert_eq!(block.header.hash_input(), expected);
    }

    #[test]
    fn flipped_body_digit_is_detected() {
        let mut block = sealed_transfer();
        block.header.body = flip_first_digit(&block.header.body);
        assert!(!block.validate());
        assert!(matches!(
            block.data::<Transfer>(),
            Err(BlockError::CorruptPayload(_))
        ));
    }

    #[test]
    fn changed_height_is_detected() {
        let mut block = sealed_transfer();
        block.header.height = 2;
        assert!(!block.validate());
    }

    #[test]
    fn changed_time_is_detected() {
        let mut block = sealed_transfer();
        block.header.time += 1;
        assert!(!block.validate());
    }

    #[test]
    fn changed_previous_hash_is_detected() {
        let mut block = sealed_transfer();
        block.header.previous_block_hash = None;
        assert!(!block.validate());
    }

    #[test]
    fn replaced_hash_is_detected() {
        let mut block = sealed_transfer();
        block.hash = compute_hash(b"forged");
        assert!(!block.validate());
    }

    #[test]
    fn genesis_payload_is_refused() {
        let genesis = PendingBlock::genesis().created_now().seal();
        assert!(genesis.is_genesis());
        assert!(matches!(
            genesis.data_value(),
            Err(BlockError::GenesisAccess)
        ));
    }

    #[test]
    fn genesis_is_decided_by_height_not_content() {
        let block = PendingBlock::genesis().at_height(5).seal();
        assert!(!block.is_genesis());
        assert_eq!(block.data::<String>().unwrap(), GENESIS_DATA);

        let app = PendingBlock::new(&transfer()).unwrap().seal();
        assert!(matches!(
            app.data::<Transfer>(),
            Err(BlockError::GenesisAccess)
        ));
    }

    #[test]
    fn wire_form_uses_camel_case() {
        let block = sealed_transfer();
        let v = serde_json::to_value(&block).unwrap();
        assert_eq!(v["hash"], block.hash());
        assert_eq!(v["height"], 1);
        assert_eq!(v["time"], 1_700_000_000);
        assert_eq!(v["previousBlockHash"], "abc123");
        assert_eq!(v["body"], block.body().as_str());

        let back: Block = serde_json::from_value(v).unwrap();
        assert_eq!(back, block);
        assert!(back.validate());
    }

    #[test]
    fn tampered_document_loads_but_fails_validation() {
        let block = sealed_transfer();
        let mut v = serde_json::to_value(&block).unwrap();
        let forged = EncodedBody::encode(&Transfer {
            amount: 1_000,
            ..transfer()
        })
        .unwrap();
        v["body"] = Value::from(forged.as_str());

        let loaded: Block = serde_json::from_value(v).unwrap();
        assert!(!loaded.validate());
        assert_eq!(loaded.data::<Transfer>().unwrap().amount, 1_000);
    }

    #[test]
    fn created_at_matches_time() {
        let block = sealed_transfer();
        assert_eq!(block.created_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn concurrent_reads_agree() {
        let block = sealed_transfer();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| (block.validate(), block.data::<Transfer>().unwrap())))
                .collect();
            for h in handles {
                let (valid, data) = h.join().unwrap();
                assert!(valid);
                assert_eq!(data, transfer());
            }
        });
    }
}
