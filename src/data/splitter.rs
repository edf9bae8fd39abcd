// ============================================================
// Layer 4 — Stratified K-Fold Partitioner
// ============================================================
// Splits a labelled dataset into k train/validation folds that
// each preserve the class proportions of the full dataset.
//
// Algorithm:
//   1. Group sample indices by class label
//   2. Shuffle each class's indices with a ChaCha8 RNG seeded
//      from `seed` (same seed → same folds, on any platform)
//   3. Deal the indices round-robin into k buckets. The dealing
//      position carries over from one class to the next so the
//      "extra" samples of uneven classes do not all pile into
//      bucket 0.
//   4. Fold i validates on bucket i and trains on the rest.
//
// Every index lands in exactly one bucket, so across the k folds
// each sample is validated exactly once.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

use crate::domain::error::CoreError;
use crate::domain::fold::Fold;

#[derive(Debug, Clone, Copy)]
pub struct FoldPartitioner {
    k:    usize,
    seed: u64,
}

impl FoldPartitioner {
    pub fn new(k: usize, seed: u64) -> Self {
        Self { k, seed }
    }

    /// Produce exactly `k` stratified folds over `labels`
    /// (one label per dataset index).
    pub fn split(&self, labels: &[usize]) -> Result<Vec<Fold>, CoreError> {
        if self.k < 2 {
            return Err(CoreError::InvalidFoldCount(self.k));
        }
        if labels.is_empty() {
            return Err(CoreError::EmptyDataset("fold partitioning input".to_string()));
        }

        // BTreeMap keeps class iteration order stable across runs
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(index);
        }

        // Fail fast before any shuffling if a class cannot be stratified
        if let Some((&class, members)) = by_class.iter().find(|(_, m)| m.len() < self.k) {
            return Err(CoreError::InsufficientSamples {
                class,
                count: members.len(),
                folds: self.k,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.k];
        let mut position = 0usize;

        for members in by_class.values_mut() {
            members.shuffle(&mut rng);
            for &index in members.iter() {
                buckets[position % self.k].push(index);
                position += 1;
            }
        }

        for bucket in &mut buckets {
            bucket.sort_unstable();
        }

        let folds: Vec<Fold> = (0..self.k)
            .map(|i| {
                let mut train: Vec<usize> = buckets
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .flat_map(|(_, b)| b.iter().copied())
                    .collect();
                train.sort_unstable();
                Fold::new(i, train, buckets[i].clone())
            })
            .collect();

        tracing::debug!(
            "Partitioned {} samples ({} classes) into {} folds: val sizes {:?}",
            labels.len(),
            by_class.len(),
            self.k,
            folds.iter().map(|f| f.val_indices.len()).collect::<Vec<_>>(),
        );

        Ok(folds)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn balanced(n_per_class: usize, classes: usize) -> Vec<usize> {
        (0..classes).flat_map(|c| std::iter::repeat(c).take(n_per_class)).collect()
    }

    #[test]
    fn test_balanced_five_fold_sizes() {
        let labels = balanced(50, 2);
        let folds  = FoldPartitioner::new(5, 42).split(&labels).unwrap();

        assert_eq!(folds.len(), 5);
        for fold in &folds {
            assert_eq!(fold.val_indices.len(), 20);
            assert_eq!(fold.train_indices.len(), 80);
            let zeros = fold.val_indices.iter().filter(|&&i| labels[i] == 0).count();
            assert_eq!(zeros, 10);
            assert!(fold.is_disjoint());
        }
    }

    #[test]
    fn test_validation_sets_cover_every_index_once() {
        // Uneven class sizes: 7, 12, 5
        let labels: Vec<usize> = [vec![0; 7], vec![1; 12], vec![2; 5]].concat();
        for k in 2..=5 {
            let folds = FoldPartitioner::new(k, 7).split(&labels).unwrap();
            assert_eq!(folds.len(), k);

            let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.val_indices.clone()).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..labels.len()).collect::<Vec<_>>());

            for fold in &folds {
                assert_eq!(fold.train_indices.len() + fold.val_indices.len(), labels.len());
                assert!(fold.is_disjoint());
            }
        }
    }

    #[test]
    fn test_class_counts_preserved_across_validation_sets() {
        let labels: Vec<usize> = [vec![0; 9], vec![1; 4], vec![2; 13]].concat();
        let folds = FoldPartitioner::new(4, 3).split(&labels).unwrap();
        for class in 0..3 {
            let original = labels.iter().filter(|&&l| l == class).count();
            let across: usize = folds
                .iter()
                .map(|f| f.val_indices.iter().filter(|&&i| labels[i] == class).count())
                .sum();
            assert_eq!(across, original);

            // stratified: each fold holds floor or ceil of count / k
            for f in &folds {
                let c = f.val_indices.iter().filter(|&&i| labels[i] == class).count();
                assert!(c == original / 4 || c == original / 4 + 1);
            }
        }
    }

    #[test]
    fn test_same_seed_same_folds() {
        let labels = balanced(10, 3);
        let a = FoldPartitioner::new(3, 11).split(&labels).unwrap();
        let b = FoldPartitioner::new(3, 11).split(&labels).unwrap();
        let c = FoldPartitioner::new(3, 12).split(&labels).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_insufficient_class_fails_fast() {
        let labels = vec![0, 0, 0, 1, 1, 0];
        let err = FoldPartitioner::new(3, 0).split(&labels).unwrap_err();
        assert_eq!(err, CoreError::InsufficientSamples { class: 1, count: 2, folds: 3 });
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(
            FoldPartitioner::new(1, 0).split(&[0, 1]).unwrap_err(),
            CoreError::InvalidFoldCount(1)
        );
        assert!(matches!(
            FoldPartitioner::new(2, 0).split(&[]).unwrap_err(),
            CoreError::EmptyDataset(_)
        ));
    }
}
