//! Single-process ground truth: Σ A_r ⊗ B_r computed with no communication
//! at all. Used only by the harness's `-c` validation path, never by a
//! schedule.

use dsop_core::{Matrix, Vector};

/// Sequentially accumulates `result += a_all[r] ⊗ b_all[r]` for every r.
/// `result` must already be the correct N×M shape and zero-filled; this
/// matches the contract every `Schedule::compute` is held to.
pub fn compute(a_all: &[Vector], b_all: &[Vector], result: &mut Matrix) {
    assert_eq!(a_all.len(), b_all.len(), "oracle needs one B vector per A vector");
    for (a, b) in a_all.iter().zip(b_all.iter()) {
        result.add_outer(a, b);
    }
}
