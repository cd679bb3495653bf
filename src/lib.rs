//! Self-verifying ledger blocks.
//!
//! A [`Block`](block::Block) carries an application payload in canonical hex
//! encoded form together with its height, timestamp and the hash of its
//! predecessor, and seals all of it under a SHA-256 integrity hash.

pub mod block;
pub mod codec;
pub mod error;

pub use block::{compute_hash, Block, BlockHash, PendingBlock, GENESIS_DATA};
pub use codec::EncodedBody;
pub use error::{BlockError, Result};
