//! Deterministic iteration helpers.
//!
//! Every `HashMap`/`HashSet` built while scheduling is walked through one of
//! these helpers rather than iterated directly, so that non-determinism
//! can't creep back in one call site at a time.

use std::collections::HashMap;
use std::hash::Hash;

/// Returns the map's keys, cloned and sorted ascending.
pub fn sorted_keys<K, V>(map: &HashMap<K, V>) -> Vec<K>
where
    K: Ord + Clone + Eq + Hash,
{
    let mut keys: Vec<K> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sorted() {
        let mut map = HashMap::new();
        map.insert("b", 2);
        map.insert("a", 1);
        map.insert("c", 3);
        assert_eq!(sorted_keys(&map), vec!["a", "b", "c"]);
    }
}
