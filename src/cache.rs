use std::collections::HashMap;

use log::debug;

use crate::error::Result;
use crate::models::{AttendanceRecord, DateScope};
use crate::source::AttendanceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub class_id: i64,
    pub scope: DateScope,
}

#[derive(Debug)]
struct Slot {
    key: CacheKey,
    records: Vec<AttendanceRecord>,
}

/// Read-through cache of fetched records keyed by (class, date scope).
///
/// Slots live in an arena and the index maps keys to slot positions; freed
/// slots are reused. Entries only leave through explicit invalidation.
#[derive(Debug, Default)]
pub struct RecordCache {
    slots: Vec<Option<Slot>>,
    index: HashMap<CacheKey, usize>,
    free: Vec<usize>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&[AttendanceRecord]> {
        let slot = *self.index.get(key)?;
        self.slots[slot].as_ref().map(|slot| slot.records.as_slice())
    }

    pub fn insert(&mut self, key: CacheKey, records: Vec<AttendanceRecord>) -> &[AttendanceRecord] {
        let position = match self.index.get(&key) {
            Some(existing) => *existing,
            None => {
                let position = match self.free.pop() {
                    Some(reused) => reused,
                    None => {
                        self.slots.push(None);
                        self.slots.len() - 1
                    }
                };
                self.index.insert(key, position);
                position
            }
        };
        let slot = self.slots[position].insert(Slot { key, records });
        slot.records.as_slice()
    }

    /// Returns cached records for the key, fetching and storing them on a miss.
    pub async fn read_through<S: AttendanceSource>(
        &mut self,
        source: &S,
        class_id: i64,
        scope: DateScope,
    ) -> Result<&[AttendanceRecord]> {
        let key = CacheKey { class_id, scope };
        if !self.index.contains_key(&key) {
            debug!("cache miss for class {} {:?}", class_id, scope);
            let records = source.fetch_records(class_id, &scope).await?;
            return Ok(self.insert(key, records));
        }
        Ok(self.get(&key).unwrap_or_default())
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        match self.index.remove(key) {
            Some(position) => {
                self.slots[position] = None;
                self.free.push(position);
                true
            }
            None => false,
        }
    }

    /// Drops every entry for a class, e.g. after a commit to any of its days.
    pub fn invalidate_class(&mut self, class_id: i64) -> usize {
        let keys: Vec<CacheKey> = self
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.key.class_id == class_id)
            .map(|slot| slot.key)
            .collect();
        keys.iter().filter(|key| self.invalidate(key)).count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use crate::source::MemoryStore;
    use crate::status::AttendanceStatus;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn key(class_id: i64, d: u32) -> CacheKey {
        CacheKey {
            class_id,
            scope: DateScope::Day(date(d)),
        }
    }

    #[test]
    fn invalidated_slots_are_reused() {
        let mut cache = RecordCache::new();
        cache.insert(key(1, 1), vec![]);
        cache.insert(key(1, 2), vec![]);
        assert!(cache.invalidate(&key(1, 1)));
        assert!(!cache.invalidate(&key(1, 1)));
        cache.insert(key(2, 1), vec![]);
        assert_eq!(cache.slots.len(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_class_only_touches_that_class() {
        let mut cache = RecordCache::new();
        cache.insert(key(1, 1), vec![]);
        cache.insert(key(1, 2), vec![]);
        cache.insert(key(2, 1), vec![]);
        assert_eq!(cache.invalidate_class(1), 2);
        assert!(cache.get(&key(2, 1)).is_some());
        assert!(cache.get(&key(1, 2)).is_none());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn read_through_serves_cached_until_invalidated() {
        let store = MemoryStore::new();
        store.add_record(AttendanceRecord::new(1, date(1), AttendanceStatus::Present, 5));
        let scope = DateScope::Range(DateRange::new(date(1), date(7)).unwrap());

        let mut cache = RecordCache::new();
        assert_eq!(cache.read_through(&store, 5, scope).await.unwrap().len(), 1);

        store.add_record(AttendanceRecord::new(2, date(2), AttendanceStatus::Absent, 5));
        assert_eq!(cache.read_through(&store, 5, scope).await.unwrap().len(), 1);

        cache.invalidate_class(5);
        assert_eq!(cache.read_through(&store, 5, scope).await.unwrap().len(), 2);
    }
}
