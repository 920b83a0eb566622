use std::sync::Arc;

use super::store::TrajectoryStore;
use super::types::{PassMaster, VariantKind, VariantTrack};

const KEYHOLE_PREFERENCE: [VariantKind; 3] = [
    VariantKind::KeyholeOptimizedFinalTransformed,
    VariantKind::KeyholeFinalTransformed,
    VariantKind::FinalTransformed,
];

/// Picks the variant the antenna should actually fly for a pass.
#[derive(Debug, Clone)]
pub struct VariantSelector {
    store: Arc<TrajectoryStore>,
}

impl VariantSelector {
    pub fn new(store: Arc<TrajectoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<TrajectoryStore> {
        &self.store
    }

    /// `None` means the pass does not exist.
    pub fn select_operational(&self, pass_id: u64) -> Option<(VariantKind, PassMaster)> {
        self.select_track(pass_id)
            .map(|track| (track.master.variant, track.master))
    }

    /// Operational variant together with its points.
    pub fn select_track(&self, pass_id: u64) -> Option<VariantTrack> {
        let record = self.store.record(pass_id)?;
        let reference = record.variant(VariantKind::FinalTransformed)?;

        if !reference.master.is_keyhole {
            return Some(reference.clone());
        }

        for (rank, kind) in KEYHOLE_PREFERENCE.iter().enumerate() {
            if let Some(track) = record.variant(*kind) {
                if rank > 0 {
                    log::warn!(
                        "Pass {} is flagged keyhole but {} is missing, falling back to {}",
                        pass_id,
                        KEYHOLE_PREFERENCE[0],
                        kind
                    );
                }
                return Some(track.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::fixtures::{overhead_pass, raw_pass, samples_with_rate};
    use crate::trajectory::materialize::materialize;
    use crate::trajectory::test_analyzer;

    fn selector_with(records: Vec<crate::trajectory::PassRecord>) -> VariantSelector {
        let store = Arc::new(TrajectoryStore::new());
        store.publish_all(records).unwrap();
        VariantSelector::new(store)
    }

    #[test]
    fn non_keyhole_pass_flies_final_transformed() {
        let record = materialize(1, &raw_pass(samples_with_rate(200, 2.0)), &test_analyzer(5.0)).unwrap();
        let selector = selector_with(vec![record]);
        let (kind, master) = selector.select_operational(1).unwrap();
        assert_eq!(kind, VariantKind::FinalTransformed);
        assert!(!master.is_keyhole);
    }

    #[test]
    fn keyhole_pass_prefers_optimized() {
        let record = materialize(2, &raw_pass(overhead_pass(0.02, 300)), &test_analyzer(5.0)).unwrap();
        let selector = selector_with(vec![record]);
        let (kind, master) = selector.select_operational(2).unwrap();
        assert_eq!(kind, VariantKind::KeyholeOptimizedFinalTransformed);
        assert!(master.is_keyhole);
    }

    #[test]
    fn keyhole_pass_falls_back_in_order() {
        let mut record = materialize(3, &raw_pass(overhead_pass(0.02, 300)), &test_analyzer(5.0)).unwrap();
        record.variants.remove(&VariantKind::KeyholeOptimizedFinalTransformed);
        let selector = selector_with(vec![record.clone()]);
        assert_eq!(
            selector.select_operational(3).unwrap().0,
            VariantKind::KeyholeFinalTransformed
        );

        record.variants.remove(&VariantKind::KeyholeFinalTransformed);
        let selector = selector_with(vec![record]);
        assert_eq!(
            selector.select_operational(3).unwrap().0,
            VariantKind::FinalTransformed
        );
    }

    #[test]
    fn unknown_pass_is_none() {
        let selector = selector_with(Vec::new());
        assert!(selector.select_operational(42).is_none());
        assert!(selector.select_track(42).is_none());
    }
}
