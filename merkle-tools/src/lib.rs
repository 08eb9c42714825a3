pub use btc_types::hash::{double_sha256, H256};

/// Recomputes the merkle root a block commits to from a transaction hash,
/// its position in the block, and the bottom-up sibling path. All hashes are
/// in raw sha256d order.
///
/// Returns `None` for proofs Bitcoin itself rejects: a right sibling equal
/// to the running hash at an odd position (the duplicated-node mutation of
/// CVE-2012-2459), and paths too short to reach the root.
pub fn compute_root_from_merkle_proof(
    transaction_hash: &H256,
    transaction_position: u64,
    merkle_proof: &[H256],
) -> Option<H256> {
    let mut current_hash = *transaction_hash;
    let mut current_position = transaction_position;

    for proof_hash in merkle_proof {
        if current_position % 2 == 0 {
            current_hash = combine_hashes(&current_hash, proof_hash);
        } else {
            // A left sibling identical to the running hash means the prover
            // duplicated the last element of an odd row.
            if *proof_hash == current_hash {
                return None;
            }
            current_hash = combine_hashes(proof_hash, &current_hash);
        }
        current_position /= 2;
    }

    // A leftover position means the walk never reached the root row.
    if current_position != 0 {
        return None;
    }

    Some(current_hash)
}

/// Builds the sibling path for the transaction at `transaction_position`
/// out of the block's full transaction hash list.
pub fn merkle_proof_calculator(tx_hashes: Vec<H256>, transaction_position: usize) -> Vec<H256> {
    let mut transaction_position = transaction_position;
    let mut merkle_proof = Vec::new();
    let mut current_hashes = tx_hashes;

    while current_hashes.len() > 1 {
        if current_hashes.len() % 2 == 1 {
            current_hashes.push(current_hashes[current_hashes.len() - 1]);
        }

        if transaction_position % 2 == 1 {
            merkle_proof.push(current_hashes[transaction_position - 1]);
        } else {
            merkle_proof.push(current_hashes[transaction_position + 1]);
        }

        let mut new_hashes = Vec::new();

        for i in (0..current_hashes.len() - 1).step_by(2) {
            new_hashes.push(combine_hashes(&current_hashes[i], &current_hashes[i + 1]));
        }

        current_hashes = new_hashes;
        transaction_position /= 2;
    }

    merkle_proof
}

fn combine_hashes(first_hash: &H256, second_hash: &H256) -> H256 {
    let mut concat_inputs = Vec::with_capacity(64);
    concat_inputs.extend(first_hash.0);
    concat_inputs.extend(second_hash.0);

    double_sha256(&concat_inputs)
}
