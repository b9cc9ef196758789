//! The address-keyed tracking table.
//!
//! The tracker only needs a small map contract: create, get, set, delete,
//! enumerate. [`EntryMap`] states that contract and `HashMap` provides it.
//! Growth goes through `try_reserve` so a table that cannot grow reports
//! failure instead of aborting the process.

use std::collections::{HashMap, TryReserveError};

/// Map contract consumed by the tracker.
pub trait EntryMap<V: Clone>: Sized {
    /// Create an empty map with room for `capacity` entries.
    fn try_create(capacity: usize) -> Result<Self, TryReserveError>;

    /// Look up the value stored for `address`.
    fn get(&self, address: usize) -> Option<&V>;

    /// Mutable lookup.
    fn get_mut(&mut self, address: usize) -> Option<&mut V>;

    /// Insert or overwrite the value for `address`.
    ///
    /// Fails without modifying the map if room for the insertion cannot be
    /// reserved.
    fn set(&mut self, address: usize, value: V) -> Result<(), TryReserveError>;

    /// Remove and return the value for `address`.
    fn delete(&mut self, address: usize) -> Option<V>;

    /// Point-in-time copy of every value, in unspecified order.
    fn enumerate(&self) -> Vec<V>;

    /// Number of stored values.
    fn len(&self) -> usize;

    /// Whether the map is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> EntryMap<V> for HashMap<usize, V> {
    fn try_create(capacity: usize) -> Result<Self, TryReserveError> {
        let mut map = HashMap::new();
        map.try_reserve(capacity)?;
        Ok(map)
    }

    #[inline]
    fn get(&self, address: usize) -> Option<&V> {
        HashMap::get(self, &address)
    }

    #[inline]
    fn get_mut(&mut self, address: usize) -> Option<&mut V> {
        HashMap::get_mut(self, &address)
    }

    fn set(&mut self, address: usize, value: V) -> Result<(), TryReserveError> {
        if !self.contains_key(&address) {
            self.try_reserve(1)?;
        }
        self.insert(address, value);
        Ok(())
    }

    #[inline]
    fn delete(&mut self, address: usize) -> Option<V> {
        self.remove(&address)
    }

    fn enumerate(&self) -> Vec<V> {
        self.values().cloned().collect()
    }

    #[inline]
    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

/// Create a table, retrying up to `attempts` times.
///
/// At least one attempt is always made.
pub fn create_with_retries<T, V>(capacity: usize, attempts: usize) -> Result<T, TryReserveError>
where
    T: EntryMap<V>,
    V: Clone,
{
    let mut last = T::try_create(capacity);
    for _ in 1..attempts {
        if last.is_ok() {
            break;
        }
        last = T::try_create(capacity);
    }
    last
}
