//! IVF-PQ training for large embedding tables.
//!
//! Small documents are searched exactly (flat scan); once a table reaches the
//! configured row threshold an IVF-PQ index with cosine distance is trained so
//! query latency stays flat as documents grow.
use anyhow::Result;
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::info;

use crate::schema::VECTOR_COLUMN;

/// PQ needs 2^nbits rows per sub-quantizer codebook.
const MIN_TRAINING_ROWS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
	pub nlist: usize,
	pub m: usize,
	pub nbits: usize,
}

/// Partition count grows with sqrt(rows), capped and kept below the row
/// count; sub-vector count is the largest candidate dividing `dim`.
pub fn compute_ivfpq_params(rows: usize, dim: usize) -> IvfPqParams {
	let sqrt_n = (rows as f64).sqrt() as usize;
	let mut nlist = sqrt_n.clamp(1, 4096);
	if rows > 1 { nlist = nlist.min(rows - 1); } else { nlist = 1; }
	let preferred: &[usize] = if dim >= 1024 { &[32, 16, 8, 4, 2, 1] } else { &[16, 8, 4, 2, 1] };
	let m = preferred.iter().copied().find(|m| dim % m == 0).unwrap_or(1);
	IvfPqParams { nlist, m, nbits: 8 }
}

pub fn should_build_ann(rows: usize, ann_min_rows: usize) -> bool {
	rows >= ann_min_rows.max(MIN_TRAINING_ROWS)
}

pub async fn build_ivfpq_index(table: &Table, params: &IvfPqParams) -> Result<()> {
	info!(nlist = params.nlist, m = params.m, "training IVF-PQ index");
	table
		.create_index(
			&[VECTOR_COLUMN],
			Index::IvfPq(
				IvfPqIndexBuilder::default()
					.distance_type(DistanceType::Cosine)
					.num_partitions(u32::try_from(params.nlist)?)
					.num_sub_vectors(u32::try_from(params.m)?),
			),
		)
		.execute()
		.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn params_fit_the_table() {
		let p = compute_ivfpq_params(10_000, 384);
		assert_eq!(p, IvfPqParams { nlist: 100, m: 16, nbits: 8 });
		assert_eq!(compute_ivfpq_params(1, 1024).nlist, 1);
		assert_eq!(compute_ivfpq_params(50_000, 1024).m, 32);
		assert_eq!(compute_ivfpq_params(5000, 100).m, 4);
	}

	#[test]
	fn ann_threshold_respects_training_minimum() {
		assert!(!should_build_ann(100, 10));
		assert!(should_build_ann(300, 10));
		assert!(!should_build_ann(4095, 4096));
		assert!(should_build_ann(4096, 4096));
	}
}
