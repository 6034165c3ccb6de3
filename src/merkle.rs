//! Merkle tree over transaction ids.
//!
//! Bitcoin's construction: pair adjacent hashes bottom-up with double
//! SHA-256, duplicating the last node whenever a level has an odd count.
//! The duplication applies at every level, not only at the leaves. All
//! hashes here are in natural (internal) byte order.

use crate::hashes::double_sha256;
use crate::types::Hash256;

/// Which side a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// A sibling path from a leaf to the root.
pub type MerkleProof = Vec<(Side, Hash256)>;

fn parent(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left.as_bytes());
    combined[32..].copy_from_slice(right.as_bytes());
    Hash256::from_bytes(double_sha256(&combined))
}

/// Compute the merkle root of an ordered list of txids.
///
/// An empty list yields the zero hash; a single leaf is its own root.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(*level.last().expect("level is non-empty"));
        }
        level = level
            .chunks(2)
            .map(|pair| parent(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Build the sibling path proving inclusion of `leaves[index]`.
///
/// Returns `None` when the index is out of range. The proof for a
/// single-leaf tree is empty.
pub fn merkle_proof(leaves: &[Hash256], index: usize) -> Option<MerkleProof> {
    if index >= leaves.len() {
        return None;
    }

    let mut proof = Vec::new();
    let mut level: Vec<Hash256> = leaves.to_vec();
    let mut pos = index;

    while level.len() > 1 {
        if level.len() % 2 != 0 {
            level.push(*level.last().expect("level is non-empty"));
        }
        let (side, sibling_pos) = if pos % 2 == 0 {
            (Side::Right, pos + 1)
        } else {
            (Side::Left, pos - 1)
        };
        proof.push((side, level[sibling_pos]));

        level = level
            .chunks(2)
            .map(|pair| parent(&pair[0], &pair[1]))
            .collect();
        pos /= 2;
    }

    Some(proof)
}

/// Recompute the root from a leaf and its sibling path.
pub fn verify_proof(leaf: &Hash256, proof: &MerkleProof, root: &Hash256) -> bool {
    let mut current = *leaf;
    for (side, sibling) in proof {
        current = match side {
            Side::Left => parent(sibling, &current),
            Side::Right => parent(&current, sibling),
        };
    }
    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Hash256 {
        Hash256::from_bytes([n; 32])
    }

    #[test]
    fn empty_list_yields_zero_root() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        assert_eq!(merkle_root(&[leaf(1)]), leaf(1));
    }

    #[test]
    fn two_leaves_hash_together() {
        let root = merkle_root(&[leaf(1), leaf(2)]);
        assert_eq!(root, parent(&leaf(1), &leaf(2)));
    }

    #[test]
    fn odd_count_duplicates_last_leaf() {
        // Three leaves: [a, b, c] must equal [a, b, c, c].
        let three = merkle_root(&[leaf(1), leaf(2), leaf(3)]);
        let four = merkle_root(&[leaf(1), leaf(2), leaf(3), leaf(3)]);
        assert_eq!(three, four);
    }

    #[test]
    fn interior_odd_level_also_duplicates() {
        // Six leaves build a 3-node interior level, which must behave like
        // the same level with its last node duplicated.
        let leaves: Vec<Hash256> = (1..=6).map(leaf).collect();
        let root = merkle_root(&leaves);

        let l01 = parent(&leaf(1), &leaf(2));
        let l23 = parent(&leaf(3), &leaf(4));
        let l45 = parent(&leaf(5), &leaf(6));
        let expected = parent(&parent(&l01, &l23), &parent(&l45, &l45));
        assert_eq!(root, expected);
    }

    #[test]
    fn root_changes_with_any_leaf() {
        let base = merkle_root(&[leaf(1), leaf(2), leaf(3)]);
        let modified = merkle_root(&[leaf(1), leaf(9), leaf(3)]);
        assert_ne!(base, modified);
    }

    #[test]
    fn proofs_verify_for_every_position() {
        for count in 1..=7usize {
            let leaves: Vec<Hash256> = (0..count).map(|i| leaf(i as u8 + 1)).collect();
            let root = merkle_root(&leaves);
            for (i, l) in leaves.iter().enumerate() {
                let proof = merkle_proof(&leaves, i).unwrap();
                assert!(verify_proof(l, &proof, &root), "count={count} index={i}");
            }
        }
    }

    #[test]
    fn proof_fails_for_wrong_leaf() {
        let leaves: Vec<Hash256> = (1..=4).map(leaf).collect();
        let root = merkle_root(&leaves);
        let proof = merkle_proof(&leaves, 0).unwrap();
        assert!(!verify_proof(&leaf(9), &proof, &root));
    }

    #[test]
    fn proof_index_out_of_range() {
        assert!(merkle_proof(&[leaf(1)], 1).is_none());
    }
}
