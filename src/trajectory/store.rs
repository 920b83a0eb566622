use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::error::TrajectoryError;
use super::types::{PassMaster, PassRecord, TrackingPoint, VariantKind, VariantTrack};

/// Published pass records keyed by global pass id.
///
/// Records are immutable once published; a whole record is swapped at once
/// so readers never see a partial variant set.
#[derive(Debug, Default)]
pub struct TrajectoryStore {
    passes: RwLock<BTreeMap<u64, Arc<PassRecord>>>,
}

impl TrajectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish one record, replacing any earlier record with the same id.
    pub fn publish(&self, record: PassRecord) -> Result<(), TrajectoryError> {
        self.publish_all(vec![record])
    }

    /// Validate every record first, then publish them under a single write lock.
    pub fn publish_all(&self, records: Vec<PassRecord>) -> Result<(), TrajectoryError> {
        for record in &records {
            validate(record)?;
        }
        let mut passes = self.passes.write().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            passes.insert(record.pass_id, Arc::new(record));
        }
        Ok(())
    }

    pub fn record(&self, pass_id: u64) -> Option<Arc<PassRecord>> {
        self.passes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pass_id)
            .cloned()
    }

    pub fn track(&self, pass_id: u64, variant: VariantKind) -> Option<VariantTrack> {
        self.record(pass_id)?.variant(variant).cloned()
    }

    pub fn master(&self, pass_id: u64, variant: VariantKind) -> Option<PassMaster> {
        self.record(pass_id)?
            .variant(variant)
            .map(|track| track.master.clone())
    }

    pub fn point(&self, pass_id: u64, variant: VariantKind, index: usize) -> Option<TrackingPoint> {
        self.record(pass_id)?
            .variant(variant)
            .and_then(|track| track.points.get(index).copied())
    }

    pub fn pass_ids(&self) -> Vec<u64> {
        self.passes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Masters of one variant for every pass that has it, ordered by start time.
    pub fn masters(&self, variant: VariantKind) -> Vec<PassMaster> {
        let passes = self.passes.read().unwrap_or_else(PoisonError::into_inner);
        let mut masters: Vec<PassMaster> = passes
            .values()
            .filter_map(|record| record.variant(variant).map(|t| t.master.clone()))
            .collect();
        masters.sort_by_key(|m| (m.start, m.pass_id));
        masters
    }

    pub fn clear(&self) {
        self.passes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.passes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(record: &PassRecord) -> Result<(), TrajectoryError> {
    let inconsistent = |reason: String| TrajectoryError::InconsistentVariants {
        pass_id: record.pass_id,
        reason,
    };

    let reference =
        record
            .variant(VariantKind::FinalTransformed)
            .ok_or(TrajectoryError::MissingVariant {
                pass_id: record.pass_id,
                variant: VariantKind::FinalTransformed,
            })?;

    for (kind, track) in &record.variants {
        if track.master.variant != *kind {
            return Err(inconsistent(format!(
                "{} row stored under {}",
                track.master.variant, kind
            )));
        }
        if track.master.pass_id != record.pass_id || track.master.detail_index != record.detail_index {
            return Err(inconsistent(format!("{kind} row carries a foreign key")));
        }
        if track.points.len() != reference.points.len() || track.master.point_count != track.points.len() {
            return Err(inconsistent(format!(
                "{kind} has {} points, expected {}",
                track.points.len(),
                reference.points.len()
            )));
        }
        let same_timestamps = track
            .points
            .iter()
            .zip(reference.points.iter())
            .all(|(a, b)| a.timestamp == b.timestamp);
        if !same_timestamps {
            return Err(inconsistent(format!("{kind} timestamps differ")));
        }
        if track.master.is_keyhole != reference.master.is_keyhole {
            return Err(inconsistent(format!("{kind} disagrees on keyhole flag")));
        }
    }

    Ok(())
}
