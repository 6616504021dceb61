//! Sorted container utilities for entity collections.
//!
//! Providers keep their entities in plain `Vec`s that stay sorted at all
//! times, so that:
//! - "same spot, refresh data" semantics are a binary search away
//!   (circles, pointers, bars keyed by rounded position)
//! - expiry-sorted collections (explosions, arcs) can stop compacting at the
//!   first expired element instead of scanning everything
//!
//! Comparators follow one convention: `cmp(probe, item)` returns `Less` when
//! `probe` belongs before `item`, `Equal` when they denote the same slot.

use crate::globe_lifecycle::PointData;
use std::cmp::Ordering;

/// Position tolerance in degrees.
pub const POSITION_EPSILON: f64 = 0.001;

// ============================================================================
// INSERTION
// ============================================================================

/// Options for [`binary_search_replace`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Insert even when an equal element exists
    pub no_replace: bool,
    /// Flip the comparator's sign
    pub ascending: bool,
}

impl InsertOptions {
    /// Always insert.
    pub fn no_replace() -> Self {
        Self {
            no_replace: true,
            ascending: false,
        }
    }
}

/// What [`binary_search_replace`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(usize),
    Replaced(usize),
}

/// Inserts `item` into an already sorted `collection`, replacing an equal
/// element unless `no_replace` is set.
///
/// # Arguments
/// * `collection` - Vector sorted per `comparator`
/// * `item` - Element to insert
/// * `comparator` - `cmp(probe, item)`, see module docs
/// * `opts` - Replace/ordering options
///
/// # Returns
/// Index at which the item now lives, and whether it replaced an element.
pub fn binary_search_replace<T, F>(
    collection: &mut Vec<T>,
    item: T,
    comparator: F,
    opts: InsertOptions,
) -> InsertOutcome
where
    F: Fn(&T, &T) -> Ordering,
{
    let mut start = 0usize;
    let mut end = collection.len();

    while start < end {
        let mid = (start + end) >> 1;
        let mut comp = comparator(&collection[mid], &item);
        if opts.ascending {
            comp = comp.reverse();
        }

        match comp {
            Ordering::Equal => {
                if opts.no_replace {
                    collection.insert(mid, item);
                    return InsertOutcome::Inserted(mid);
                }
                collection[mid] = item;
                return InsertOutcome::Replaced(mid);
            }
            Ordering::Less => start = mid + 1,
            Ordering::Greater => end = mid,
        }
    }

    collection.insert(start, item);
    InsertOutcome::Inserted(start)
}

// ============================================================================
// COMPACTION
// ============================================================================

/// Options for [`map_and_filter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// The collection is sorted by descending time left: stop at the first
    /// expired element and drop everything after it.
    pub sorted_by_lifetime: bool,
}

/// Advances every element to `now` and drops the expired ones in one pass.
///
/// # Returns
/// Number of removed elements.
pub fn map_and_filter<T: PointData>(collection: &mut Vec<T>, now: f64, opts: FilterOptions) -> usize {
    map_and_filter_with(collection, now, opts, |_| {})
}

/// Like [`map_and_filter`], calling `retained` for every survivor.
///
/// Survivors keep their relative order.
pub fn map_and_filter_with<T, F>(
    collection: &mut Vec<T>,
    now: f64,
    opts: FilterOptions,
    mut retained: F,
) -> usize
where
    T: PointData,
    F: FnMut(&T),
{
    let before = collection.len();
    let mut new_len = 0;

    for i in 0..collection.len() {
        if collection[i].update(now).is_alive() {
            collection.swap(new_len, i);
            retained(&collection[new_len]);
            new_len += 1;
        } else if opts.sorted_by_lifetime {
            break;
        }
    }

    collection.truncate(new_len);
    before - new_len
}

/// Advances every element to `now` without removing anything.
pub fn update_for_frame<T: PointData>(collection: &mut [T], now: f64) {
    for item in collection.iter_mut() {
        let _ = item.update(now);
    }
}

// ============================================================================
// COMPARATORS
// ============================================================================

fn partial_order(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Equal within [`POSITION_EPSILON`], otherwise descending by `lon * 1000 + lat`.
pub fn compare_positions<T: PointData + ?Sized>(left: &T, right: &T) -> Ordering {
    compare_coordinates(left.lat(), left.lon(), right.lat(), right.lon())
}

/// [`compare_positions`] on raw coordinates.
pub fn compare_coordinates(left_lat: f64, left_lon: f64, right_lat: f64, right_lon: f64) -> Ordering {
    if (left_lat - right_lat).abs() < POSITION_EPSILON
        && (left_lon - right_lon).abs() < POSITION_EPSILON
    {
        return Ordering::Equal;
    }
    let left_num = left_lon * 1000.0 + left_lat;
    let right_num = right_lon * 1000.0 + right_lat;
    partial_order(right_num, left_num)
}

/// Descending by time left.
pub fn compare_time_left<T: PointData + ?Sized>(left: &T, right: &T) -> Ordering {
    partial_order(right.time_left(), left.time_left())
}

/// Returns true if no adjacent pair is out of order per `comparator`.
pub fn is_sorted_by<T, F>(collection: &[T], comparator: F) -> bool
where
    F: Fn(&T, &T) -> Ordering,
{
    collection
        .windows(2)
        .all(|pair| comparator(&pair[0], &pair[1]) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globe_lifecycle::{CommonData, EntityKind};
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    struct Dot {
        common: CommonData,
    }

    impl Dot {
        fn new(lat: f64, lon: f64, ttl: f64, start: f64) -> Self {
            let mut common = CommonData::at(lat, lon, Some(ttl), start);
            common.life.start_time = start;
            Self { common }
        }
    }

    impl PointData for Dot {
        fn common(&self) -> &CommonData {
            &self.common
        }
        fn common_mut(&mut self) -> &mut CommonData {
            &mut self.common
        }
        fn kind(&self) -> EntityKind {
            EntityKind::Circle
        }
    }

    fn int_cmp(a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut v = vec![1, 3, 5, 7];
        assert_eq!(
            binary_search_replace(&mut v, 4, int_cmp, InsertOptions::default()),
            InsertOutcome::Inserted(2)
        );
        assert_eq!(v, vec![1, 3, 4, 5, 7]);

        binary_search_replace(&mut v, 0, int_cmp, InsertOptions::default());
        binary_search_replace(&mut v, 9, int_cmp, InsertOptions::default());
        assert_eq!(v, vec![0, 1, 3, 4, 5, 7, 9]);
    }

    #[test]
    fn test_equal_element_replaced_or_duplicated() {
        let mut v = vec![(1, 'a'), (2, 'b'), (3, 'c')];
        let cmp = |a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0);

        let outcome = binary_search_replace(&mut v, (2, 'x'), cmp, InsertOptions::default());
        assert_eq!(outcome, InsertOutcome::Replaced(1));
        assert_eq!(v, vec![(1, 'a'), (2, 'x'), (3, 'c')]);

        let outcome = binary_search_replace(&mut v, (2, 'y'), cmp, InsertOptions::no_replace());
        assert_eq!(outcome, InsertOutcome::Inserted(1));
        assert_eq!(v.len(), 4);
        assert!(is_sorted_by(&v, cmp));
    }

    #[test]
    fn test_ascending_flag_reverses() {
        let mut v = vec![9, 5, 1];
        let opts = InsertOptions {
            no_replace: false,
            ascending: true,
        };
        binary_search_replace(&mut v, 4, int_cmp, opts);
        assert_eq!(v, vec![9, 5, 4, 1]);
    }

    #[test]
    fn test_empty_collection() {
        let mut v: Vec<i32> = Vec::new();
        assert_eq!(
            binary_search_replace(&mut v, 1, int_cmp, InsertOptions::default()),
            InsertOutcome::Inserted(0)
        );
        assert_eq!(v, vec![1]);
    }

    #[test]
    fn test_position_comparator_tolerance() {
        let a = Dot::new(10.0, 20.0, 1000.0, 0.0);
        let b = Dot::new(10.0005, 20.0005, 1000.0, 0.0);
        let c = Dot::new(10.0, 21.0, 1000.0, 0.0);

        assert_eq!(compare_positions(&a, &b), Ordering::Equal);
        // Descending by lon*1000+lat: c sorts before a
        assert_eq!(compare_positions(&c, &a), Ordering::Less);
        assert_eq!(compare_positions(&a, &c), Ordering::Greater);
    }

    #[test]
    fn test_time_left_comparator_descending() {
        let long = Dot::new(0.0, 0.0, 5000.0, 0.0);
        let short = Dot::new(0.0, 0.0, 1000.0, 0.0);
        assert_eq!(compare_time_left(&long, &short), Ordering::Less);
        assert_eq!(compare_time_left(&short, &long), Ordering::Greater);
    }

    #[test]
    fn test_map_and_filter_removes_expired() {
        let mut v = vec![
            Dot::new(0.0, 0.0, 100.0, 0.0),
            Dot::new(1.0, 0.0, 1000.0, 0.0),
            Dot::new(2.0, 0.0, 50.0, 0.0),
            Dot::new(3.0, 0.0, 2000.0, 0.0),
        ];

        let removed = map_and_filter(&mut v, 500.0, FilterOptions::default());
        assert_eq!(removed, 2);
        let lats: Vec<f64> = v.iter().map(|d| d.lat()).collect();
        assert_eq!(lats, vec![1.0, 3.0]);
        assert!(v.iter().all(|d| d.lifecycle().lifetime == 500.0));
    }

    #[test]
    fn test_map_and_filter_sorted_stops_at_first_expired() {
        let mut v: Vec<Dot> = Vec::new();
        for ttl in [100.0, 3000.0, 200.0, 2000.0, 50.0] {
            binary_search_replace(
                &mut v,
                Dot::new(0.0, ttl, ttl, 0.0),
                compare_time_left,
                InsertOptions::no_replace(),
            );
        }
        assert!(is_sorted_by(&v, compare_time_left));

        let mut retained = 0;
        let removed = map_and_filter_with(
            &mut v,
            500.0,
            FilterOptions {
                sorted_by_lifetime: true,
            },
            |_| retained += 1,
        );
        assert_eq!(removed, 3);
        assert_eq!(retained, 2);
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|d| !d.expired()));
    }

    #[test]
    fn test_update_for_frame_keeps_expired() {
        let mut v = vec![Dot::new(0.0, 0.0, 10.0, 0.0)];
        update_for_frame(&mut v, 100.0);
        assert_eq!(v.len(), 1);
        assert!(v[0].expired());
    }

    proptest! {
        #[test]
        fn prop_insert_preserves_sortedness(
            mut values in proptest::collection::vec(-1000i32..1000, 0..64),
            item in -1000i32..1000,
            no_replace in any::<bool>(),
        ) {
            values.sort();
            let before = values.len();
            let had_equal = values.contains(&item);
            let opts = InsertOptions { no_replace, ascending: false };

            binary_search_replace(&mut values, item, int_cmp, opts);

            prop_assert!(is_sorted_by(&values, int_cmp));
            let expected = if had_equal && !no_replace { before } else { before + 1 };
            prop_assert_eq!(values.len(), expected);
        }

        #[test]
        fn prop_sorted_filter_removes_exactly_expired(
            ttls in proptest::collection::vec(1.0f64..10_000.0, 0..64),
            now in 0.0f64..10_000.0,
        ) {
            let mut v: Vec<Dot> = Vec::new();
            for ttl in &ttls {
                binary_search_replace(
                    &mut v,
                    Dot::new(0.0, 0.0, *ttl, 0.0),
                    compare_time_left,
                    InsertOptions::no_replace(),
                );
            }
            let survivors = ttls.iter().filter(|ttl| now <= **ttl).count();

            map_and_filter(&mut v, now, FilterOptions { sorted_by_lifetime: true });

            prop_assert_eq!(v.len(), survivors);
            prop_assert!(v.iter().all(|d| !d.expired()));
        }
    }
}
