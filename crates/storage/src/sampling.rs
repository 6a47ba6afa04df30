//! Sampling strategies used by trainers to build a labeled training set from
//! the sample store.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::StoreError;
use crate::record::SampleRecord;
use crate::store::SampleStore;

/// Which strategy a profile's `sample_loading` configuration selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    BalancedUndersample,
    LatestFull,
    RandomFull,
}

impl SampleStore {
    /// `min(count_0, count_1, max/2)` of each class, randomly selected;
    /// rejects if either class is empty.
    pub fn load_balanced_undersample(&self, max: usize, seed: u64) -> Result<Vec<SampleRecord>, StoreError> {
        let records = self.scan()?;
        let (mut pass, mut violation): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| r.label == 0);

        if pass.is_empty() || violation.is_empty() {
            return Err(StoreError::EmptyClass { pass: pass.len() as u64, violation: violation.len() as u64 });
        }

        let per_class = (max / 2).min(pass.len()).min(violation.len());
        let mut rng = StdRng::seed_from_u64(seed);
        pass.shuffle(&mut rng);
        violation.shuffle(&mut rng);

        let mut out: Vec<SampleRecord> = pass.into_iter().take(per_class).chain(violation.into_iter().take(per_class)).collect();
        out.shuffle(&mut rng);
        Ok(out)
    }

    /// `min(class_count, max/2)` newest-first per class.
    pub fn load_latest_full(&self, max: usize, seed: u64) -> Result<Vec<SampleRecord>, StoreError> {
        let records = self.scan()?;
        let (mut pass, mut violation): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| r.label == 0);
        pass.sort_by(|a, b| b.id.cmp(&a.id));
        violation.sort_by(|a, b| b.id.cmp(&a.id));

        let per_class = max / 2;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut out: Vec<SampleRecord> =
            pass.into_iter().take(per_class).chain(violation.into_iter().take(per_class)).collect();
        out.shuffle(&mut rng);
        Ok(out)
    }

    /// `min(class_count, max/2)` uniformly at random per class.
    pub fn load_random_full(&self, max: usize, seed: u64) -> Result<Vec<SampleRecord>, StoreError> {
        let records = self.scan()?;
        let (mut pass, mut violation): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| r.label == 0);

        let mut rng = StdRng::seed_from_u64(seed);
        pass.shuffle(&mut rng);
        violation.shuffle(&mut rng);

        let per_class = max / 2;
        let mut out: Vec<SampleRecord> =
            pass.into_iter().take(per_class).chain(violation.into_iter().take(per_class)).collect();
        out.shuffle(&mut rng);
        Ok(out)
    }

    /// Dispatch to the named strategy.
    pub fn load_samples(&self, strategy: Strategy, max: usize, seed: u64) -> Result<Vec<SampleRecord>, StoreError> {
        match strategy {
            Strategy::BalancedUndersample => self.load_balanced_undersample(max, seed),
            Strategy::LatestFull => self.load_latest_full(max, seed),
            Strategy::RandomFull => self.load_random_full(max, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> (tempfile::TempDir, SampleStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(&dir.path().join("history.rocks")).unwrap();
        for i in 0..20 {
            store.insert(&format!("pass-{i}"), 0, None, format!("t{i}")).unwrap();
        }
        for i in 0..6 {
            store.insert(&format!("violation-{i}"), 1, None, format!("t{i}")).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn balanced_undersample_caps_at_smaller_class() {
        let (_dir, store) = seeded_store();
        let sample = store.load_balanced_undersample(100, 1).unwrap();
        let violations = sample.iter().filter(|r| r.label == 1).count();
        let passes = sample.iter().filter(|r| r.label == 0).count();
        assert_eq!(violations, 6);
        assert_eq!(passes, 6);
    }

    #[test]
    fn balanced_undersample_rejects_empty_class() {
        let dir = tempfile::tempdir().unwrap();
        let store = SampleStore::open(&dir.path().join("history.rocks")).unwrap();
        store.insert("only-pass", 0, None, "t".to_string()).unwrap();
        assert!(matches!(store.load_balanced_undersample(10, 1), Err(StoreError::EmptyClass { .. })));
    }

    #[test]
    fn strategies_are_deterministic_given_a_seed() {
        let (_dir, store) = seeded_store();
        let a: Vec<i64> = store.load_balanced_undersample(100, 99).unwrap().iter().map(|r| r.id).collect();
        let b: Vec<i64> = store.load_balanced_undersample(100, 99).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn latest_full_prefers_highest_ids() {
        let (_dir, store) = seeded_store();
        let sample = store.load_latest_full(4, 1).unwrap();
        let pass_ids: Vec<i64> = sample.iter().filter(|r| r.label == 0).map(|r| r.id).collect();
        assert!(pass_ids.iter().all(|&id| id >= 18));
    }
}
