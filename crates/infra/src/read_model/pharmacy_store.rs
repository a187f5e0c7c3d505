use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use pharma_core::PharmacyId;
use std::sync::Arc;

/// Pharmacy-isolated key/value store abstraction for disposable read models.
pub trait PharmacyStore<K, V>: Send + Sync {
    fn get(&self, pharmacy_id: PharmacyId, key: &K) -> Option<V>;
    fn upsert(&self, pharmacy_id: PharmacyId, key: K, value: V);
    fn list(&self, pharmacy_id: PharmacyId) -> Vec<V>;
    /// Clear all read-model records for a pharmacy (rebuild support).
    fn clear_pharmacy(&self, pharmacy_id: PharmacyId);
}

impl<K, V, S> PharmacyStore<K, V> for Arc<S>
where
    S: PharmacyStore<K, V> + ?Sized,
{
    fn get(&self, pharmacy_id: PharmacyId, key: &K) -> Option<V> {
        (**self).get(pharmacy_id, key)
    }

    fn upsert(&self, pharmacy_id: PharmacyId, key: K, value: V) {
        (**self).upsert(pharmacy_id, key, value)
    }

    fn list(&self, pharmacy_id: PharmacyId) -> Vec<V> {
        (**self).list(pharmacy_id)
    }

    fn clear_pharmacy(&self, pharmacy_id: PharmacyId) {
        (**self).clear_pharmacy(pharmacy_id)
    }
}

/// In-memory pharmacy-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryPharmacyStore<K, V> {
    inner: RwLock<HashMap<(PharmacyId, K), V>>,
}

impl<K, V> InMemoryPharmacyStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryPharmacyStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PharmacyStore<K, V> for InMemoryPharmacyStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, pharmacy_id: PharmacyId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(pharmacy_id, key.clone())).cloned()
    }

    fn upsert(&self, pharmacy_id: PharmacyId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((pharmacy_id, key), value);
        }
    }

    fn list(&self, pharmacy_id: PharmacyId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((p, _k), v)| if *p == pharmacy_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_pharmacy(&self, pharmacy_id: PharmacyId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(p, _k), _v| *p != pharmacy_id);
        }
    }
}
