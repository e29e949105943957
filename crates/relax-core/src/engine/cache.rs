use crate::core::frame_order::FrameOrderError;
use crate::core::frame_order::model::FrameOrderModel;
use crate::core::frame_order::sampling::SobolPoints;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SobolKey {
    model: FrameOrderModel,
    total: usize,
    skip: u64,
}

/// A single-slot store for the most recently generated Sobol' point set.
///
/// Generating the points for a three-angle model is far more expensive than evaluating a target,
/// so every target built for the same model and budget shares one immutable set. A request for a
/// different model or budget regenerates the set and replaces the slot.
#[derive(Debug, Default)]
pub struct SobolCache {
    slot: Mutex<Option<(SobolKey, Arc<SobolPoints>)>>,
}

impl SobolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_generate(
        &self,
        model: FrameOrderModel,
        total: usize,
        skip: u64,
    ) -> Result<Arc<SobolPoints>, FrameOrderError> {
        let key = SobolKey { model, total, skip };
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached, points)) = slot.as_ref() {
            if *cached == key {
                return Ok(Arc::clone(points));
            }
        }

        debug!(model = model.name(), total, "Generating Sobol' points");
        let points = Arc::new(SobolPoints::generate(model, total, skip)?);
        *slot = Some((key, Arc::clone(&points)));
        Ok(points)
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_requests_share_the_same_points() {
        let cache = SobolCache::new();
        let a = cache.get_or_generate(FrameOrderModel::Rotor, 50, 1000).unwrap();
        let b = cache.get_or_generate(FrameOrderModel::Rotor, 50, 1000).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 50);
    }

    #[test]
    fn a_new_budget_or_model_replaces_the_slot() {
        let cache = SobolCache::new();
        let a = cache.get_or_generate(FrameOrderModel::Rotor, 50, 1000).unwrap();
        let b = cache.get_or_generate(FrameOrderModel::Rotor, 60, 1000).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        let c = cache.get_or_generate(FrameOrderModel::IsoCone, 60, 1000).unwrap();
        assert_eq!(c.model, FrameOrderModel::IsoCone);
        let d = cache.get_or_generate(FrameOrderModel::IsoCone, 60, 1000).unwrap();
        assert!(Arc::ptr_eq(&c, &d));
    }

    #[test]
    fn clearing_forces_regeneration_with_identical_content() {
        let cache = SobolCache::new();
        let a = cache.get_or_generate(FrameOrderModel::DoubleRotor, 20, 1000).unwrap();
        cache.clear();
        let b = cache.get_or_generate(FrameOrderModel::DoubleRotor, 20, 1000).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
    }
}
