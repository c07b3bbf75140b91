use certchain_core::{certificates_root, verify, Certificate, Hash, MerkleTree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_certificates(rng: &mut StdRng, n: usize) -> Vec<Certificate> {
    (0..n)
        .map(|i| {
            Certificate::new(
                format!("S-{}", rng.gen_range(0..100_000)),
                format!("Student {i}"),
                ["Algebra", "Biology", "Chemistry"][rng.gen_range(0..3)],
                ["A", "B", "C", "D"][rng.gen_range(0..4)],
                rng.gen_range(1_600_000_000..1_800_000_000),
            )
        })
        .collect()
}

fn flip_bit(h: &Hash, rng: &mut StdRng) -> Hash {
    let mut bytes = h.0;
    let byte = rng.gen_range(0..32);
    let bit = rng.gen_range(0..8);
    bytes[byte] ^= 1 << bit;
    Hash(bytes)
}

#[test]
fn proofs_verify_for_random_trees() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let n = rng.gen_range(1..40);
        let certs = random_certificates(&mut rng, n);
        let tree = MerkleTree::build(&certs);
        let root = certificates_root(&certs);
        assert_eq!(tree.root(), root);

        for i in 0..n {
            assert!(verify(&tree.proof_for(i).unwrap(), &root));
        }
    }
}

#[test]
fn random_single_bit_tampering_is_detected() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..200 {
        let n = rng.gen_range(2..25);
        let certs = random_certificates(&mut rng, n);
        let tree = MerkleTree::build(&certs);
        let root = tree.root();
        let mut proof = tree.proof_for(rng.gen_range(0..n)).unwrap();

        match rng.gen_range(0..3) {
            0 => proof.leaf_value = flip_bit(&proof.leaf_value, &mut rng),
            1 => {
                let level = rng.gen_range(0..proof.path.len());
                proof.path[level].sibling_hash =
                    flip_bit(&proof.path[level].sibling_hash, &mut rng);
            }
            _ => proof.root = flip_bit(&proof.root, &mut rng),
        }

        assert!(!verify(&proof, &root));
    }
}

#[test]
fn swapping_distinct_certificates_changes_root() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..50 {
        let n = rng.gen_range(2..20);
        let certs = random_certificates(&mut rng, n);
        let a = rng.gen_range(0..n);
        let b = (a + rng.gen_range(1..n)) % n;
        if certs[a] == certs[b] {
            continue;
        }
        let mut swapped = certs.clone();
        swapped.swap(a, b);
        assert_ne!(certificates_root(&certs), certificates_root(&swapped));
    }
}

#[test]
fn odd_tree_equals_tree_with_last_leaf_repeated() {
    let mut rng = StdRng::seed_from_u64(3);
    for n in [1usize, 3, 5, 7, 9, 11] {
        let certs = random_certificates(&mut rng, n);
        let mut padded = certs.clone();
        padded.push(certs[n - 1].clone());
        // A single leaf is its own root; pairing it with itself is not.
        if n == 1 {
            assert_ne!(certificates_root(&certs), certificates_root(&padded));
        } else {
            assert_eq!(certificates_root(&certs), certificates_root(&padded));
        }
    }
}
