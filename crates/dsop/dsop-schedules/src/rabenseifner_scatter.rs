//! Rabenseifner variant that partitions the result into a 2-D grid of
//! `V x H` sub-blocks (`V * H = P`, both powers of two) instead of
//! `rabenseifner_gather`'s 1-D row bands. Rank `r` owns grid cell
//! `(r / H, r % H)`.
//!
//! Phase A is a recursive-doubling exchange of self-describing,
//! variable-length `{is_a, origin, len, payload}` records (length-prefixed,
//! since `Comm::recv_into` requires an exact-size buffer and per-round
//! record counts vary): every rank starts knowing only its own full `A`
//! and `B` vectors, and after `log2(P)` rounds of standard hypercube
//! doubling every rank knows every origin's full vectors. Each rank then
//! computes its own grid cell locally. An incremental axis-narrowing
//! scheme that tracks only the axis split each round would save
//! bandwidth but drop origins it needs to keep on the other axis; Phase A
//! trades that bandwidth saving for a version that is provably complete:
//! doubling is the same topology `allgather_async` and `bruck_async`
//! already use, just applied to a growing map instead of a flat buffer.
//!
//! Phase B then replicates every rank's grid cell everywhere with a second
//! recursive-doubling exchange, this time of whole `{row range, col range,
//! payload}` rectangles, merged into `result` via `Matrix::set_submatrix`.
//!
//! Power-of-two process counts only.

use std::collections::HashMap;

use dsop_core::{Comm, DsopError, Matrix, ProcessContext, Vector};
use dsop_timing::MpiTimer;

use crate::tags::RABENSEIFNER_SCATTER;
use crate::{n_rounds, Schedule};

pub struct RabenseifnerScatter;

/// `V x H` grid dimensions for `num_procs`: even round counts split evenly
/// between the axes, odd round counts give the extra factor of two to the
/// vertical (row) axis.
fn grid_dims(rounds: u32) -> (i32, i32) {
    if rounds % 2 == 0 {
        let side = 1i32 << (rounds / 2);
        (side, side)
    } else {
        (1i32 << (rounds / 2 + 1), 1i32 << (rounds / 2))
    }
}

/// Partition boundaries `0, chunk, 2*chunk, ..., total` splitting `total`
/// into `parts` nearly-equal pieces, last piece absorbing the remainder.
fn partition_table(total: usize, parts: usize) -> Vec<usize> {
    let mut table = vec![0usize; parts + 1];
    let chunk = total / parts;
    for (i, slot) in table.iter_mut().enumerate().take(parts).skip(1) {
        *slot = i * chunk;
    }
    table[parts] = total;
    table
}

fn encode_vectors(known_a: &HashMap<i32, Vec<f64>>, known_b: &HashMap<i32, Vec<f64>>) -> Vec<f64> {
    let mut out = Vec::new();
    for (&origin, data) in known_a {
        out.push(1.0);
        out.push(origin as f64);
        out.push(data.len() as f64);
        out.extend_from_slice(data);
    }
    for (&origin, data) in known_b {
        out.push(0.0);
        out.push(origin as f64);
        out.push(data.len() as f64);
        out.extend_from_slice(data);
    }
    out
}

fn decode_vectors(buf: &[f64], known_a: &mut HashMap<i32, Vec<f64>>, known_b: &mut HashMap<i32, Vec<f64>>) {
    let mut idx = 0;
    while idx < buf.len() {
        let is_a = buf[idx] != 0.0;
        let origin = buf[idx + 1] as i32;
        let len = buf[idx + 2] as usize;
        idx += 3;
        let data = buf[idx..idx + len].to_vec();
        idx += len;
        let dst = if is_a { &mut *known_a } else { &mut *known_b };
        dst.entry(origin).or_insert(data);
    }
}

fn encode_rects(rects: &[(usize, usize, usize, usize, Vec<f64>)]) -> Vec<f64> {
    let mut out = Vec::new();
    for (r0, r1, c0, c1, data) in rects {
        out.push(*r0 as f64);
        out.push(*r1 as f64);
        out.push(*c0 as f64);
        out.push(*c1 as f64);
        out.extend_from_slice(data);
    }
    out
}

fn decode_rects(buf: &[f64]) -> Vec<(usize, usize, usize, usize, Vec<f64>)> {
    let mut rects = Vec::new();
    let mut idx = 0;
    while idx < buf.len() {
        let r0 = buf[idx] as usize;
        let r1 = buf[idx + 1] as usize;
        let c0 = buf[idx + 2] as usize;
        let c1 = buf[idx + 3] as usize;
        idx += 4;
        let len = (r1 - r0) * (c1 - c0);
        let data = buf[idx..idx + len].to_vec();
        idx += len;
        rects.push((r0, r1, c0, c1, data));
    }
    rects
}

/// Length-prefixed exchange: trade buffer lengths first, then the payload
/// itself, since `recv_into` requires the receiver's buffer to match the
/// sender's length exactly and per-round sizes vary here.
fn exchange(comm: &dyn Comm, peer: i32, tag: i32, send: &[f64]) -> Vec<f64> {
    let mut len_buf = [0.0f64];
    comm.sendrecv_into(peer, tag, &[send.len() as f64], peer, tag, &mut len_buf);
    let mut recv = vec![0.0; len_buf[0] as usize];
    comm.sendrecv_into(peer, tag, send, peer, tag, &mut recv);
    recv
}

impl Schedule for RabenseifnerScatter {
    fn name(&self) -> &'static str {
        "rabenseifner_scatter"
    }

    fn compute(
        &self,
        comm: &dyn Comm,
        ctx: &ProcessContext,
        a_all: &[Vector],
        b_all: &[Vector],
        result: &mut Matrix,
        timer: &mut MpiTimer,
    ) -> Result<(), DsopError> {
        if !ctx.is_power_of_two() {
            return Err(DsopError::UnsupportedConfiguration(format!(
                "rabenseifner_scatter requires a power-of-two process count, got {}",
                ctx.num_procs
            )));
        }

        let rank = ctx.rank;
        let rounds = n_rounds(ctx.num_procs);

        if ctx.num_procs == 1 {
            timer.time(|| result.set_outer(&a_all[0], &b_all[0]));
            return Ok(());
        }

        let (v, h) = grid_dims(rounds);
        let row_table = partition_table(ctx.n, v as usize);
        let col_table = partition_table(ctx.m, h as usize);

        let mut known_a: HashMap<i32, Vec<f64>> = HashMap::new();
        let mut known_b: HashMap<i32, Vec<f64>> = HashMap::new();
        known_a.insert(rank, a_all[rank as usize].clone());
        known_b.insert(rank, b_all[rank as usize].clone());

        timer.time(|| {
            // [PHASE A] hypercube doubling until every rank knows every
            // origin's full A and B vectors.
            for round in 0..rounds {
                let peer = rank ^ (1 << round);
                let outgoing = encode_vectors(&known_a, &known_b);
                let incoming = exchange(comm, peer, RABENSEIFNER_SCATTER, &outgoing);
                decode_vectors(&incoming, &mut known_a, &mut known_b);
            }

            // [LOCAL COMPUTE] my grid cell, summed over all P origins.
            let my_row_group = (rank / h) as usize;
            let my_col_group = (rank % h) as usize;
            let (r0, r1) = (row_table[my_row_group], row_table[my_row_group + 1]);
            let (c0, c1) = (col_table[my_col_group], col_table[my_col_group + 1]);
            for origin in 0..ctx.num_procs {
                let a = &known_a[&origin][r0..r1];
                let b = &known_b[&origin][c0..c1];
                result.add_submatrix_outer(r0, c0, a, b);
            }

            // [PHASE B] hypercube doubling of whole grid-cell rectangles so
            // every rank ends up with the complete matrix. `result` is
            // row-major over the full N x M matrix, so the sub-block is
            // pulled out row by row rather than as one contiguous slice.
            let my_block: Vec<f64> =
                (r0..r1).flat_map(|i| result.as_slice()[i * ctx.m + c0..i * ctx.m + c1].iter().copied()).collect();
            let mut rects = vec![(r0, r1, c0, c1, my_block)];

            for round in 0..rounds {
                let peer = rank ^ (1 << round);
                let outgoing = encode_rects(&rects);
                let incoming = exchange(comm, peer, RABENSEIFNER_SCATTER, &outgoing);
                let received = decode_rects(&incoming);
                for rect in received {
                    if !rects.iter().any(|(a, b, c, d, _)| (*a, *b, *c, *d) == (rect.0, rect.1, rect.2, rect.3)) {
                        rects.push(rect);
                    }
                }
            }

            for (rr0, rr1, rc0, rc1, data) in &rects {
                result.set_submatrix(*rr0, *rc0, rr1 - rr0, rc1 - rc0, data);
            }
        });
        Ok(())
    }
}
