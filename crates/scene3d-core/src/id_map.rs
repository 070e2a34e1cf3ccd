//! Global pick ID assignment.
//!
//! Every instance of every collection gets a dense integer ID. ID 0 is
//! reserved for "nothing", so the first pickable instance is ID 1. Collections
//! receive contiguous ranges in list order.

/// Largest ID representable in the 24-bit pick color.
pub const MAX_PICK_ID: u32 = 0xFF_FFFF;

/// A resolved pick: which collection, which instance inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PickTarget {
    /// Index into the collection list.
    pub collection_index: usize,
    /// Index of the instance inside that collection.
    pub instance_index: usize,
}

/// The ID range owned by one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    /// Index into the collection list.
    pub collection_index: usize,
    /// First ID of the range.
    pub base_id: u32,
    /// Number of IDs in the range.
    pub count: u32,
}

impl IdRange {
    /// One past the last ID.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.base_id + self.count
    }

    fn contains(&self, id: u32) -> bool {
        id >= self.base_id && id < self.end()
    }
}

/// Maps global pick IDs to `(collection, instance)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    ranges: Vec<IdRange>,
    base_ids: Vec<Option<u32>>,
    next_id: u32,
}

impl IdMapping {
    /// Builds the mapping from per-collection instance counts in list order.
    ///
    /// Collections with zero instances get no range and do not advance the
    /// running ID. A collection whose range would run past [`MAX_PICK_ID`]
    /// is left unpickable.
    #[must_use]
    pub fn build(counts: &[usize]) -> Self {
        let mut ranges = Vec::new();
        let mut base_ids = Vec::with_capacity(counts.len());
        let mut next_id: u32 = 1;

        for (collection_index, &count) in counts.iter().enumerate() {
            if count == 0 {
                base_ids.push(None);
                continue;
            }
            let fits = u32::try_from(count)
                .ok()
                .filter(|&c| u64::from(next_id) + u64::from(c) - 1 <= u64::from(MAX_PICK_ID));
            let Some(count) = fits else {
                log::warn!(
                    "collection {collection_index}: {count} instances exceed the pick ID space, not pickable"
                );
                base_ids.push(None);
                continue;
            };
            ranges.push(IdRange {
                collection_index,
                base_id: next_id,
                count,
            });
            base_ids.push(Some(next_id));
            next_id += count;
        }

        Self {
            ranges,
            base_ids,
            next_id,
        }
    }

    /// Base ID of a collection, or `None` if it owns no IDs.
    #[must_use]
    pub fn base_id(&self, collection_index: usize) -> Option<u32> {
        self.base_ids.get(collection_index).copied().flatten()
    }

    /// Resolves a global ID. ID 0 and unassigned IDs resolve to `None`.
    #[must_use]
    pub fn resolve(&self, id: u32) -> Option<PickTarget> {
        if id == 0 {
            return None;
        }
        // Ranges are sorted by base_id
        let pos = self.ranges.partition_point(|r| r.end() <= id);
        let range = self.ranges.get(pos).filter(|r| r.contains(id))?;
        Some(PickTarget {
            collection_index: range.collection_index,
            instance_index: (id - range.base_id) as usize,
        })
    }

    /// Number of IDs handed out, excluding the reserved 0.
    #[must_use]
    pub fn total_ids(&self) -> u32 {
        self.next_id.saturating_sub(1)
    }

    /// Assigned ranges in list order.
    #[must_use]
    pub fn ranges(&self) -> &[IdRange] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_point_cloud_then_cuboid_base_ids() {
        let map = IdMapping::build(&[3, 2]);
        assert_eq!(map.base_id(0), Some(1));
        assert_eq!(map.base_id(1), Some(4));
        assert_eq!(map.total_ids(), 5);

        assert_eq!(
            map.resolve(3),
            Some(PickTarget {
                collection_index: 0,
                instance_index: 2
            })
        );
        assert_eq!(
            map.resolve(4),
            Some(PickTarget {
                collection_index: 1,
                instance_index: 0
            })
        );
        assert_eq!(map.resolve(6), None);
    }

    #[test]
    fn test_zero_is_none() {
        assert_eq!(IdMapping::default().resolve(0), None);
        assert_eq!(IdMapping::build(&[10]).resolve(0), None);
    }

    #[test]
    fn test_empty_collections_do_not_shift_ids() {
        let map = IdMapping::build(&[2, 0, 3]);
        assert_eq!(map.base_id(0), Some(1));
        assert_eq!(map.base_id(1), None);
        assert_eq!(map.base_id(2), Some(3));
        assert_eq!(
            map.resolve(3),
            Some(PickTarget {
                collection_index: 2,
                instance_index: 0
            })
        );
    }

    #[test]
    fn test_overflowing_collection_is_unpickable() {
        let map = IdMapping::build(&[MAX_PICK_ID as usize - 1, 5, 1]);
        assert_eq!(map.base_id(0), Some(1));
        assert_eq!(map.base_id(1), None);
        assert_eq!(map.base_id(2), Some(MAX_PICK_ID));
        assert_eq!(
            map.resolve(MAX_PICK_ID),
            Some(PickTarget {
                collection_index: 2,
                instance_index: 0
            })
        );
    }

    #[test]
    fn test_out_of_range_collection_index() {
        assert_eq!(IdMapping::build(&[1]).base_id(7), None);
    }

    proptest! {
        #[test]
        fn prop_ranges_are_contiguous(counts in prop::collection::vec(0usize..50, 0..12)) {
            let map = IdMapping::build(&counts);

            let mut expected_next = 1u32;
            for range in map.ranges() {
                prop_assert_eq!(range.base_id, expected_next);
                expected_next = range.end();
            }
            prop_assert_eq!(map.total_ids() as usize, counts.iter().sum::<usize>());

            // Every assigned id resolves back to the instance that owns it
            for (collection_index, &count) in counts.iter().enumerate() {
                let Some(base) = map.base_id(collection_index) else {
                    prop_assert_eq!(count, 0);
                    continue;
                };
                for instance_index in 0..count {
                    let target = map.resolve(base + instance_index as u32);
                    prop_assert_eq!(target, Some(PickTarget { collection_index, instance_index }));
                }
            }
            prop_assert_eq!(map.resolve(expected_next), None);
        }
    }
}
