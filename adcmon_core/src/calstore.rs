//! Single-owner cache over the persistent calibration record.
//!
//! The cache is cold until the first successful `ensure_loaded`; writes are
//! rejected while cold so a zero-initialized record can never clobber the
//! stored one. The in-memory record only changes after the backing store
//! accepted the new one, so a failed write leaves both untouched.

use adcmon_traits::{AdcDevice, CalRecord, CalStore, NUM_CORES, Zdok};

use crate::error::{AdcError, Report, Result};
use crate::estimator::{NoiseEstimate, estimate_from_noise};
use crate::snapshot::Capturer;

pub struct CalCache<S: CalStore> {
    store: S,
    record: CalRecord,
    warm: bool,
}

impl<S: CalStore> CalCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            record: CalRecord::default(),
            warm: false,
        }
    }

    pub fn is_warm(&self) -> bool {
        self.warm
    }

    /// Load the record from the store unless already loaded.
    pub fn ensure_loaded(&mut self) -> Result<&CalRecord> {
        if !self.warm {
            self.record = self
                .store
                .load()
                .map_err(|e| Report::new(AdcError::PersistenceRead(e.to_string())))?;
            self.warm = true;
            tracing::debug!("calibration record loaded");
        }
        Ok(&self.record)
    }

    /// The cached record, if it has been loaded.
    pub fn record(&self) -> Option<&CalRecord> {
        self.warm.then_some(&self.record)
    }

    /// Persist `record` and adopt it as the cached copy.
    ///
    /// Rejected with `NotWarm` before the first successful load.
    pub fn commit(&mut self, record: CalRecord) -> Result<()> {
        if !self.warm {
            return Err(Report::new(AdcError::NotWarm));
        }
        self.store
            .store(&record)
            .map_err(|e| Report::new(AdcError::PersistenceWrite(e.to_string())))?;
        self.record = record;
        Ok(())
    }

    /// Measure one zdok from `repeat` noise snapshots and persist the result.
    ///
    /// Loads the record first if cold, so the untouched line always carries
    /// its stored values. Float fields are averaged over the repeats;
    /// overload counts are summed. Any failure leaves the cached record
    /// unchanged.
    pub fn measure_and_update<D: AdcDevice>(
        &mut self,
        capturer: &Capturer<D>,
        zdok: Zdok,
        repeat: u32,
    ) -> Result<NoiseEstimate> {
        self.ensure_loaded()?;

        let mut acc = NoiseEstimate::default();
        let mut overload = [0u32; NUM_CORES];
        for _ in 0..repeat {
            let snap = capturer.capture(zdok)?;
            let est = estimate_from_noise(snap.samples());
            for core in 0..NUM_CORES {
                acc.offs[core] += est.offs[core];
                acc.gains[core] += est.gains[core];
                overload[core] += est.overload[core];
            }
            acc.avz += est.avz;
            acc.avamp += est.avamp;
        }
        let n = repeat.max(1) as f32;
        for core in 0..NUM_CORES {
            acc.offs[core] /= n;
            acc.gains[core] /= n;
            acc.overload[core] = overload[core];
        }
        acc.avz /= n;
        acc.avamp /= n;

        let z = zdok.index();
        let mut next = self.record.clone();
        next.offs[z] = acc.offs;
        next.gains[z] = acc.gains;
        for core in 0..NUM_CORES {
            next.overload[z][core] = overload[core] as i32;
        }
        next.avz[z] = acc.avz;
        next.avamp[z] = acc.avamp;

        self.store
            .store(&next)
            .map_err(|e| Report::new(AdcError::PersistenceWrite(e.to_string())))?;
        self.record = next;
        tracing::info!(%zdok, repeat, avz = acc.avz, avamp = acc.avamp, "calibration line updated");
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MemStore;

    #[test]
    fn commit_while_cold_is_rejected() {
        let mut cache = CalCache::new(MemStore::default());
        let err = cache.commit(CalRecord::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AdcError>(),
            Some(AdcError::NotWarm)
        ));
    }

    #[test]
    fn ensure_loaded_is_idempotent() {
        let mut store = MemStore::default();
        let mut rec = CalRecord::default();
        rec.avamp[0] = 17.5;
        store.seed(rec);
        let mut cache = CalCache::new(store);
        assert_eq!(cache.ensure_loaded().unwrap().avamp[0], 17.5);
        assert_eq!(cache.ensure_loaded().unwrap().avamp[0], 17.5);
        assert!(cache.is_warm());
    }

    #[test]
    fn failed_load_keeps_cache_cold() {
        let mut store = MemStore::default();
        store.fail_load = true;
        let mut cache = CalCache::new(store);
        assert!(cache.ensure_loaded().is_err());
        assert!(!cache.is_warm());
        assert!(cache.record().is_none());
    }

    #[test]
    fn failed_store_leaves_record_unchanged() {
        let mut store = MemStore::default();
        let mut rec = CalRecord::default();
        rec.avz[1] = -3.0;
        store.seed(rec);
        store.fail_store = true;
        let mut cache = CalCache::new(store);
        cache.ensure_loaded().unwrap();

        let mut next = CalRecord::default();
        next.avz[1] = 99.0;
        assert!(cache.commit(next).is_err());
        assert_eq!(cache.record().unwrap().avz[1], -3.0);
    }
}
