//! JSON records that leave the ledger: proof files and chain dumps.
//!
//! A proof record is all a verifier needs besides the block's published
//! merkle root. Proof files may come from anywhere, so verifying one never
//! fails loudly: malformed input verifies as `false`.

use crate::chain::{Chain, ChainError};
use certchain_core::{unix_now, Block, Certificate, Hash, MerkleProof, ProofStep};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors from encoding or decoding export records.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("malformed proof record: {0}")]
    MalformedProof(#[source] serde_json::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Portable inclusion proof for one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub block_index: u64,
    pub tx_index: usize,
    pub leaf_value: Hash,
    pub leaf_index: usize,
    pub path: Vec<ProofStep>,
    pub root: Hash,
    /// The proven certificate, so a verifier can check it hashes to
    /// `leaf_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl ProofRecord {
    /// Bundle a merkle proof with its location.
    pub fn new(block_index: u64, tx_index: usize, proof: MerkleProof) -> Self {
        Self {
            block_index,
            tx_index,
            leaf_value: proof.leaf_value,
            leaf_index: proof.leaf_index,
            path: proof.path,
            root: proof.root,
            certificate: None,
        }
    }

    /// Attach the certificate being proven.
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Build the record for transaction `tx_index` of block `block_index`,
    /// including the certificate itself.
    pub fn from_chain(
        chain: &Chain,
        block_index: u64,
        tx_index: usize,
    ) -> std::result::Result<Self, ChainError> {
        let proof = chain.proof_for(block_index, tx_index)?;
        let mut record = Self::new(block_index, tx_index, proof);
        record.certificate = chain
            .get(block_index)
            .and_then(|b| b.transactions.get(tx_index))
            .cloned();
        Ok(record)
    }

    /// The bare merkle proof.
    pub fn proof(&self) -> MerkleProof {
        MerkleProof {
            leaf_value: self.leaf_value,
            leaf_index: self.leaf_index,
            path: self.path.clone(),
            root: self.root,
        }
    }

    /// Verify against the independently published root of the block.
    ///
    /// An attached certificate must hash to `leaf_value`, and `tx_index`
    /// must agree with `leaf_index`.
    pub fn verify(&self, published_root: &Hash) -> bool {
        if self.tx_index != self.leaf_index {
            return false;
        }
        if let Some(cert) = &self.certificate {
            if cert.hash() != self.leaf_value {
                return false;
            }
        }
        self.proof().verify(published_root)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(ExportError::MalformedProof)
    }

    /// Default file name, `merkle_proof_b{block}_t{tx}.json`.
    pub fn file_name(&self) -> String {
        format!("merkle_proof_b{}_t{}.json", self.block_index, self.tx_index)
    }
}

/// Parse and verify a proof record in one step. Unparseable input is a
/// verification failure.
pub fn verify_record_json(json: &str, published_root: &Hash) -> bool {
    match ProofRecord::from_json(json) {
        Ok(record) => record.verify(published_root),
        Err(e) => {
            debug!(error = %e, "rejecting unparseable proof record");
            false
        }
    }
}

/// One block in a chain dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Certificate>,
    pub merkle_root: Hash,
    pub previous_hash: Hash,
    pub nonce: u64,
    pub hash: Hash,
    pub difficulty: u32,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        Self {
            index: block.header.index,
            timestamp: block.header.timestamp,
            transactions: block.transactions.clone(),
            merkle_root: block.header.merkle_root,
            previous_hash: block.header.previous_hash,
            nonce: block.header.nonce,
            hash: block.hash,
            difficulty: block.header.difficulty,
        }
    }
}

/// Read-only dump of the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainExport {
    pub exported_at: u64,
    pub length: usize,
    pub blocks: Vec<BlockRecord>,
}

impl ChainExport {
    pub fn from_chain(chain: &Chain) -> Self {
        Self {
            exported_at: unix_now(),
            length: chain.len(),
            blocks: chain.iter().map(BlockRecord::from).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certchain_core::{MiningControl, UnsealedBlock};

    fn chain_with(certs: Vec<Certificate>) -> Chain {
        let mut chain = Chain::new();
        let block = UnsealedBlock::genesis(certs, 1)
            .mine(&MiningControl::new())
            .unwrap();
        chain.append(block).unwrap();
        chain
    }

    fn certs() -> Vec<Certificate> {
        vec![
            Certificate::new("1", "Ann", "Law", "A", 10),
            Certificate::new("2", "Ben", "Law", "B", 11),
            Certificate::new("3", "Cat", "Law", "C", 12),
        ]
    }

    #[test]
    fn test_record_json_roundtrip_verifies() {
        let chain = chain_with(certs());
        let root = chain.merkle_root_of(0).unwrap();
        let record = ProofRecord::from_chain(&chain, 0, 1).unwrap();
        assert_eq!(record.file_name(), "merkle_proof_b0_t1.json");

        let json = record.to_json().unwrap();
        assert!(verify_record_json(&json, &root));
        assert_eq!(ProofRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_record_json_shape() {
        let chain = chain_with(certs());
        let json = ProofRecord::from_chain(&chain, 0, 2).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        for key in ["block_index", "tx_index", "leaf_value", "leaf_index", "path", "root"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["path"][0]["sibling_hash"].is_string());
        assert_eq!(value["path"][0]["side"], "right");
        assert_eq!(value["certificate"]["student_id"], "3");
    }

    #[test]
    fn test_record_without_certificate() {
        let chain = chain_with(certs());
        let root = chain.merkle_root_of(0).unwrap();
        let proof = chain.proof_for(0, 0).unwrap();
        let record = ProofRecord::new(0, 0, proof);

        let json = record.to_json().unwrap();
        assert!(!json.contains("certificate"));
        assert!(verify_record_json(&json, &root));
    }

    #[test]
    fn test_mismatched_certificate_fails() {
        let chain = chain_with(certs());
        let root = chain.merkle_root_of(0).unwrap();
        let mut record = ProofRecord::from_chain(&chain, 0, 1).unwrap();
        if let Some(cert) = record.certificate.as_mut() {
            cert.grade = "A".into();
        }
        assert!(!record.verify(&root));
    }

    #[test]
    fn test_mismatched_tx_index_fails() {
        let chain = chain_with(certs());
        let root = chain.merkle_root_of(0).unwrap();
        let mut record = ProofRecord::from_chain(&chain, 0, 1).unwrap();
        record.tx_index = 2;
        assert!(!record.verify(&root));
    }

    #[test]
    fn test_malformed_json_is_false() {
        let root = Hash::ZERO;
        for input in [
            "",
            "not json",
            "{}",
            r#"{"block_index": 0}"#,
            r#"{"block_index":0,"tx_index":0,"leaf_value":"zz","leaf_index":0,"path":[],"root":"00"}"#,
            r#"{"block_index":0,"tx_index":0,"leaf_value":"00","leaf_index":0,"path":[{"sibling_hash":"00","side":"up"}],"root":"00"}"#,
        ] {
            assert!(!verify_record_json(input, &root), "{input}");
        }
        assert!(matches!(
            ProofRecord::from_json("[1, 2]"),
            Err(ExportError::MalformedProof(_))
        ));
    }

    #[test]
    fn test_chain_export() {
        let chain = chain_with(certs());
        let export = ChainExport::from_chain(&chain);
        assert_eq!(export.length, 1);
        assert_eq!(export.blocks[0].hash, chain.tip_hash());
        assert_eq!(export.blocks[0].transactions.len(), 3);

        let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        let block = &value["blocks"][0];
        for key in [
            "index",
            "timestamp",
            "transactions",
            "merkle_root",
            "previous_hash",
            "nonce",
            "hash",
            "difficulty",
        ] {
            assert!(block.get(key).is_some(), "missing {key}");
        }
        assert_eq!(block["previous_hash"], Hash::ZERO.to_hex());
    }
}
