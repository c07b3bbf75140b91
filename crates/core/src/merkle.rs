//! Merkle tree and inclusion proofs over a block's certificates.
//!
//! Odd-sized levels duplicate their last node before pairing. Construction,
//! [`MerkleTree::proof_for`] and [`verify`] all apply that rule, so a proof
//! reproduces the root only if the three agree.

use crate::certificate::Certificate;
use crate::hash::{hash_concat, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest path a proof may carry (one step per level of a 2^64-leaf tree).
pub const MAX_PROOF_DEPTH: usize = 64;

/// Errors from tree queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("leaf index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: usize, len: usize },
}

fn combine(left: &Hash, right: &Hash) -> Hash {
    hash_concat(&[left.as_ref(), right.as_ref()])
}

fn next_level(current: &[Hash]) -> Vec<Hash> {
    let mut next = Vec::with_capacity(current.len().div_ceil(2));
    for chunk in current.chunks(2) {
        let combined = if chunk.len() == 2 {
            combine(&chunk[0], &chunk[1])
        } else {
            // Odd number of elements: hash the last one with itself
            combine(&chunk[0], &chunk[0])
        };
        next.push(combined);
    }
    next
}

/// Compute the merkle root of a list of hashes.
///
/// Returns the zero hash if the list is empty.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return Hash::ZERO;
    }

    let mut current_level: Vec<Hash> = hashes.to_vec();
    while current_level.len() > 1 {
        current_level = next_level(&current_level);
    }
    current_level[0]
}

/// Merkle root of a certificate list.
pub fn certificates_root(certificates: &[Certificate]) -> Hash {
    let leaves: Vec<Hash> = certificates.iter().map(Certificate::hash).collect();
    merkle_root(&leaves)
}

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One level of an authentication path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling_hash: Hash,
    pub side: Side,
}

/// A merkle inclusion proof for a single leaf.
///
/// Self-contained: it does not reference the tree that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Hash of the proven certificate.
    pub leaf_value: Hash,
    /// Position of the certificate in the block.
    pub leaf_index: usize,
    /// Sibling hashes from leaf to root.
    pub path: Vec<ProofStep>,
    /// The root this proof claims to reproduce.
    pub root: Hash,
}

impl MerkleProof {
    /// Recompute the root implied by the leaf and its path.
    pub fn computed_root(&self) -> Hash {
        self.path.iter().fold(self.leaf_value, |current, step| match step.side {
            Side::Right => combine(&current, &step.sibling_hash),
            Side::Left => combine(&step.sibling_hash, &current),
        })
    }

    /// Verify this proof against a published root. See [`verify`].
    pub fn verify(&self, expected_root: &Hash) -> bool {
        verify(self, expected_root)
    }

    /// Sides must agree with the bits of `leaf_index`, and the index must
    /// not carry bits above the path length.
    fn path_matches_index(&self) -> bool {
        if self.path.len() > MAX_PROOF_DEPTH {
            return false;
        }
        let mut idx = self.leaf_index;
        for step in &self.path {
            let expected = if idx % 2 == 0 { Side::Right } else { Side::Left };
            if step.side != expected {
                return false;
            }
            idx /= 2;
        }
        idx == 0
    }
}

/// A merkle tree for efficient proofs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// All nodes in the tree, level by level (leaves first).
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build a merkle tree from a list of leaf hashes.
    pub fn new(leaves: &[Hash]) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }

        let mut levels = vec![leaves.to_vec()];
        loop {
            let current = &levels[levels.len() - 1];
            if current.len() <= 1 {
                break;
            }
            let next = next_level(current);
            levels.push(next);
        }

        Self { levels }
    }

    /// Build a merkle tree over certificates, one leaf per certificate.
    pub fn build(certificates: &[Certificate]) -> Self {
        let leaves: Vec<Hash> = certificates.iter().map(Certificate::hash).collect();
        Self::new(&leaves)
    }

    /// Get the root of the merkle tree. The empty tree's root is [`Hash::ZERO`].
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or(Hash::ZERO)
    }

    /// Get the number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map(|l| l.len()).unwrap_or(0)
    }

    /// Generate a proof for the leaf at the given index.
    pub fn proof_for(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let len = self.leaf_count();
        if index >= len {
            return Err(MerkleError::IndexOutOfRange { index, len });
        }

        let leaf_value = self.levels[0][index];
        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let step = if idx % 2 == 0 {
                // A trailing odd node pairs with itself.
                let sibling_hash = level.get(idx + 1).copied().unwrap_or(level[idx]);
                ProofStep {
                    sibling_hash,
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    sibling_hash: level[idx - 1],
                    side: Side::Left,
                }
            };
            path.push(step);
            idx /= 2;
        }

        Ok(MerkleProof {
            leaf_value,
            leaf_index: index,
            path,
            root: self.root(),
        })
    }

    /// Verify a merkle proof against this tree's root.
    pub fn verify_proof(&self, proof: &MerkleProof) -> bool {
        verify(proof, &self.root())
    }
}

/// Verify a merkle proof against a published root.
///
/// True only when the path folds the leaf into `proof.root` and
/// `proof.root` equals `expected_root`. Structurally inconsistent proofs
/// (over-long paths, sides that contradict `leaf_index`) are rejected
/// rather than panicking.
pub fn verify(proof: &MerkleProof, expected_root: &Hash) -> bool {
    if !proof.path_matches_index() {
        return false;
    }
    proof.computed_root() == proof.root && proof.root == *expected_root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash;

    fn make_hashes(n: usize) -> Vec<Hash> {
        (0..n).map(|i| hash(&[i as u8])).collect()
    }

    fn make_certificates(n: usize) -> Vec<Certificate> {
        (0..n)
            .map(|i| {
                Certificate::new(
                    format!("S-{i:03}"),
                    format!("Student {i}"),
                    "Distributed Systems",
                    "A",
                    1_700_000_000 + i as u64,
                )
            })
            .collect()
    }

    fn flip_byte(h: &Hash, pos: usize) -> Hash {
        let mut bytes = h.0;
        bytes[pos] ^= 0x01;
        Hash(bytes)
    }

    #[test]
    fn test_merkle_root_empty() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);
        assert_eq!(MerkleTree::new(&[]).root(), Hash::ZERO);
        assert_eq!(MerkleTree::build(&[]).leaf_count(), 0);
    }

    #[test]
    fn test_merkle_root_single() {
        let hashes = make_hashes(1);
        assert_eq!(merkle_root(&hashes), hashes[0]);

        let tree = MerkleTree::new(&hashes);
        let proof = tree.proof_for(0).unwrap();
        assert!(proof.path.is_empty());
        assert!(verify(&proof, &hashes[0]));
    }

    #[test]
    fn test_merkle_root_two() {
        let hashes = make_hashes(2);
        let expected = hash_concat(&[hashes[0].as_ref(), hashes[1].as_ref()]);
        assert_eq!(merkle_root(&hashes), expected);
    }

    #[test]
    fn test_merkle_root_deterministic() {
        let certs = make_certificates(10);
        let t1 = MerkleTree::build(&certs);
        let t2 = MerkleTree::build(&certs);
        assert_eq!(t1.root(), t2.root());
        for i in 0..certs.len() {
            assert_eq!(t1.proof_for(i).unwrap(), t2.proof_for(i).unwrap());
        }
    }

    #[test]
    fn test_merkle_root_order_matters() {
        let certs = make_certificates(4);
        let mut swapped = certs.clone();
        swapped.swap(1, 2);
        assert_ne!(certificates_root(&certs), certificates_root(&swapped));
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let certs = make_certificates(3);
        let mut padded = certs.clone();
        padded.push(certs[2].clone());
        assert_eq!(certificates_root(&certs), certificates_root(&padded));
    }

    #[test]
    fn test_tree_root_matches_free_function() {
        for n in 1..=17 {
            let hashes = make_hashes(n);
            assert_eq!(MerkleTree::new(&hashes).root(), merkle_root(&hashes), "n = {n}");
        }
    }

    #[test]
    fn test_merkle_proof_valid_for_every_index() {
        for n in 1..=17 {
            let certs = make_certificates(n);
            let tree = MerkleTree::build(&certs);
            for i in 0..n {
                let proof = tree.proof_for(i).unwrap();
                assert_eq!(proof.leaf_value, certs[i].hash());
                assert_eq!(proof.leaf_index, i);
                assert!(tree.verify_proof(&proof), "n = {n}, i = {i}");
            }
        }
    }

    #[test]
    fn test_merkle_proof_invalid_index() {
        let tree = MerkleTree::new(&make_hashes(4));
        assert_eq!(
            tree.proof_for(4),
            Err(MerkleError::IndexOutOfRange { index: 4, len: 4 })
        );
        assert!(MerkleTree::new(&[]).proof_for(0).is_err());
    }

    #[test]
    fn test_merkle_proof_wrong_root() {
        let tree = MerkleTree::new(&make_hashes(4));
        let proof = tree.proof_for(0).unwrap();
        assert!(!verify(&proof, &hash(b"wrong")));
    }

    #[test]
    fn test_tampered_leaf_fails() {
        let tree = MerkleTree::build(&make_certificates(5));
        let root = tree.root();
        for i in 0..5 {
            for pos in 0..32 {
                let mut proof = tree.proof_for(i).unwrap();
                proof.leaf_value = flip_byte(&proof.leaf_value, pos);
                assert!(!verify(&proof, &root));
            }
        }
    }

    #[test]
    fn test_tampered_sibling_fails() {
        let tree = MerkleTree::build(&make_certificates(6));
        let root = tree.root();
        for i in 0..6 {
            let proof = tree.proof_for(i).unwrap();
            for level in 0..proof.path.len() {
                let mut bad = proof.clone();
                bad.path[level].sibling_hash = flip_byte(&bad.path[level].sibling_hash, level);
                assert!(!verify(&bad, &root));
            }
        }
    }

    #[test]
    fn test_tampered_root_fails() {
        let tree = MerkleTree::build(&make_certificates(3));
        let root = tree.root();
        let mut proof = tree.proof_for(2).unwrap();
        proof.root = flip_byte(&proof.root, 31);
        assert!(!verify(&proof, &root));
        // Consistent with itself, but not with the published root.
        let claimed = proof.root;
        assert!(!verify(&proof, &claimed));
    }

    #[test]
    fn test_flipped_side_fails() {
        let tree = MerkleTree::build(&make_certificates(4));
        let mut proof = tree.proof_for(1).unwrap();
        proof.path[0].side = Side::Right;
        assert!(!verify(&proof, &tree.root()));
    }

    #[test]
    fn test_wrong_leaf_index_fails() {
        let tree = MerkleTree::build(&make_certificates(4));
        let mut proof = tree.proof_for(1).unwrap();
        proof.leaf_index = 0;
        assert!(!verify(&proof, &tree.root()));

        let mut proof = tree.proof_for(1).unwrap();
        proof.leaf_index = 1 + 4;
        assert!(!verify(&proof, &tree.root()));
    }

    #[test]
    fn test_truncated_and_extended_paths_fail() {
        let tree = MerkleTree::build(&make_certificates(8));
        let proof = tree.proof_for(3).unwrap();

        let mut truncated = proof.clone();
        truncated.path.pop();
        assert!(!verify(&truncated, &tree.root()));

        let mut extended = proof.clone();
        extended.path.push(ProofStep {
            sibling_hash: Hash::ZERO,
            side: Side::Right,
        });
        assert!(!verify(&extended, &tree.root()));

        let mut oversized = proof;
        oversized.path = vec![
            ProofStep {
                sibling_hash: Hash::ZERO,
                side: Side::Right,
            };
            MAX_PROOF_DEPTH + 1
        ];
        assert!(!verify(&oversized, &tree.root()));
    }

    #[test]
    fn test_proof_json_shape() {
        let tree = MerkleTree::build(&make_certificates(2));
        let proof = tree.proof_for(1).unwrap();
        let value = serde_json::to_value(&proof).unwrap();

        assert_eq!(value["leaf_index"], 1);
        assert_eq!(value["path"][0]["side"], "left");
        assert_eq!(value["root"], tree.root().to_hex());

        let back: MerkleProof = serde_json::from_value(value).unwrap();
        assert!(verify(&back, &tree.root()));
    }
}
