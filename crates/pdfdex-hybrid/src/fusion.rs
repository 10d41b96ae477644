//! Rank fusion of dense and sparse candidate lists.
//!
//! Both inputs arrive best-first. Each source contributes `weight * norm(hit)`
//! per chunk id; ids missing from a source get no contribution from it. The
//! output is sorted by fused score descending, ties broken by the lower id.

use std::collections::BTreeMap;

use pdfdex_core::config::{FusionMethod, FusionSettings};
use pdfdex_core::types::{ChunkId, SearchHit};

/// One fused result with its provenance. Ranks are 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedHit {
    pub id: ChunkId,
    pub score: f32,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
}

impl FusedHit {
    fn new(id: ChunkId) -> Self {
        Self { id, score: 0.0, dense_rank: None, sparse_rank: None }
    }
}

pub fn fuse(dense: &[SearchHit], sparse: &[SearchHit], settings: &FusionSettings, k: usize) -> Vec<FusedHit> {
    if k == 0 {
        return Vec::new();
    }
    // Dense scores are distances; negate so larger is better for both sources.
    let dense_norm = normalize(dense, settings, |h| -h.score);
    let sparse_norm = normalize(sparse, settings, |h| h.score);

    let mut by_id: BTreeMap<ChunkId, FusedHit> = BTreeMap::new();
    for (rank, (hit, norm)) in dense.iter().zip(dense_norm).enumerate() {
        let entry = by_id.entry(hit.id).or_insert_with(|| FusedHit::new(hit.id));
        if entry.dense_rank.is_none() {
            entry.dense_rank = Some(rank + 1);
            entry.score += settings.dense_weight * norm;
        }
    }
    for (rank, (hit, norm)) in sparse.iter().zip(sparse_norm).enumerate() {
        let entry = by_id.entry(hit.id).or_insert_with(|| FusedHit::new(hit.id));
        if entry.sparse_rank.is_none() {
            entry.sparse_rank = Some(rank + 1);
            entry.score += settings.sparse_weight * norm;
        }
    }

    let mut fused: Vec<FusedHit> = by_id.into_values().collect();
    fused.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    fused.truncate(k);
    fused
}

/// Per-position normalized contribution of one ranked list.
fn normalize(hits: &[SearchHit], settings: &FusionSettings, value: impl Fn(&SearchHit) -> f32) -> Vec<f32> {
    match settings.method {
        FusionMethod::Rrf => {
            let k = settings.rrf_k as f32;
            (1..=hits.len()).map(|rank| 1.0 / (k + rank as f32)).collect()
        }
        FusionMethod::MinMax => {
            let values: Vec<f32> = hits.iter().map(value).collect();
            let finite = values.iter().copied().filter(|v| v.is_finite());
            let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            values
                .into_iter()
                .map(|v| {
                    if !v.is_finite() {
                        0.0
                    } else if max > min {
                        (v - min) / (max - min)
                    } else {
                        1.0
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdfdex_core::types::SourceKind;

    fn dense(ids_dists: &[(ChunkId, f32)]) -> Vec<SearchHit> {
        ids_dists.iter().map(|&(id, score)| SearchHit { id, score, source: SourceKind::Dense }).collect()
    }

    fn sparse(ids_scores: &[(ChunkId, f32)]) -> Vec<SearchHit> {
        ids_scores.iter().map(|&(id, score)| SearchHit { id, score, source: SourceKind::Sparse }).collect()
    }

    fn ids(hits: &[FusedHit]) -> Vec<ChunkId> {
        hits.iter().map(|h| h.id).collect()
    }

    #[test]
    fn rrf_prefers_ids_found_by_both_sources() {
        let d = dense(&[(1, 0.1), (2, 0.2), (3, 0.3)]);
        let s = sparse(&[(3, 10.0), (1, 8.0), (4, 5.0)]);
        let fused = fuse(&d, &s, &FusionSettings::default(), 10);
        assert_eq!(ids(&fused[..2]), vec![1, 3]);
        assert_eq!(fused.len(), 4);
        assert_eq!(fused[0].dense_rank, Some(1));
        assert_eq!(fused[0].sparse_rank, Some(2));
        let only_sparse = fused.iter().find(|h| h.id == 4).expect("id 4");
        assert_eq!(only_sparse.dense_rank, None);
    }

    #[test]
    fn ties_break_on_lower_id() {
        let d = dense(&[(7, 0.1)]);
        let s = sparse(&[(3, 4.0)]);
        let fused = fuse(&d, &s, &FusionSettings::default(), 2);
        assert_eq!(ids(&fused), vec![3, 7]);
        assert!((fused[0].score - fused[1].score).abs() < f32::EPSILON);
    }

    #[test]
    fn min_max_inverts_distances() {
        let settings = FusionSettings { method: FusionMethod::MinMax, ..FusionSettings::default() };
        let d = dense(&[(0, 0.05), (1, 0.5), (2, 0.9)]);
        let fused = fuse(&d, &[], &settings, 3);
        assert_eq!(ids(&fused), vec![0, 1, 2]);
        assert!((fused[0].score - 0.5).abs() < 1e-6);
        assert!(fused[2].score.abs() < 1e-6);
    }

    #[test]
    fn weights_shift_the_winner() {
        let d = dense(&[(0, 0.1), (1, 0.2)]);
        let s = sparse(&[(1, 9.0), (0, 1.0)]);
        let dense_heavy = FusionSettings { dense_weight: 0.9, sparse_weight: 0.1, ..FusionSettings::default() };
        let sparse_heavy = FusionSettings { dense_weight: 0.1, sparse_weight: 0.9, ..FusionSettings::default() };
        assert_eq!(fuse(&d, &s, &dense_heavy, 1)[0].id, 0);
        assert_eq!(fuse(&d, &s, &sparse_heavy, 1)[0].id, 1);
    }

    #[test]
    fn k_zero_and_empty_inputs() {
        let d = dense(&[(0, 0.1)]);
        assert!(fuse(&d, &d, &FusionSettings::default(), 0).is_empty());
        assert!(fuse(&[], &[], &FusionSettings::default(), 5).is_empty());
    }

    #[test]
    fn fusion_is_deterministic() {
        let d = dense(&[(5, 0.3), (2, 0.3), (9, f32::NAN)]);
        let s = sparse(&[(2, 1.0), (8, 1.0)]);
        let first = fuse(&d, &s, &FusionSettings::default(), 4);
        for _ in 0..10 {
            assert_eq!(fuse(&d, &s, &FusionSettings::default(), 4), first);
        }
    }
}
