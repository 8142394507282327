//! Read-only summarization accessors: numeric aggregates and grouped counts.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::FormStoreResult;
use crate::store::core::FormStore;
use crate::store::record::Record;

/// Summary of an integer projection over a filtered record set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct I64Aggregate {
    /// Records matching the filter, whether or not they projected a value.
    pub count: u64,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub sum: i64,
    /// Mean over the records that projected a value.
    pub avg: Option<f64>,
}

impl FormStore {
    /// Aggregates an `i64` projection (count, min, max, sum, avg) over the
    /// records matching `filter`. Records projecting `None` count toward
    /// `count` but not the numeric summaries.
    pub fn aggregate_i64<R, F, P>(&self, filter: F, project: P) -> FormStoreResult<I64Aggregate>
    where
        R: Record,
        F: Fn(&R) -> bool,
        P: Fn(&R) -> Option<i64>,
    {
        let rows: Vec<R> = self.scan_records()?;
        let mut agg = I64Aggregate::default();
        let mut projected = 0u64;
        for row in rows.iter().filter(|r| filter(r)) {
            agg.count += 1;
            if let Some(value) = project(row) {
                projected += 1;
                agg.sum += value;
                agg.min = Some(agg.min.map_or(value, |m| m.min(value)));
                agg.max = Some(agg.max.map_or(value, |m| m.max(value)));
            }
        }
        if projected > 0 {
            agg.avg = Some(agg.sum as f64 / projected as f64);
        }
        Ok(agg)
    }

    /// Groups records by `key` and counts each group (the groupBy/count
    /// shape).
    pub fn group_count<R, K, F>(&self, key: F) -> FormStoreResult<HashMap<K, u64>>
    where
        R: Record,
        K: Eq + Hash,
        F: Fn(&R) -> K,
    {
        let rows: Vec<R> = self.scan_records()?;
        let mut groups: HashMap<K, u64> = HashMap::new();
        for row in &rows {
            *groups.entry(key(row)).or_insert(0) += 1;
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::Field;
    use crate::testing_utils::TestStoreFactory;

    #[test]
    fn test_field_order_aggregate() {
        let (store, _user, form) = TestStoreFactory::create_store_with_form();
        for (i, label) in ["Name", "Email", "Message"].iter().enumerate() {
            store
                .insert(&Field::new(&form.id, "text", *label, i as i64))
                .unwrap();
        }

        let agg = store
            .aggregate_i64::<Field, _, _>(|f| f.form_id == form.id, |f| Some(f.order))
            .unwrap();
        assert_eq!(agg.count, 3);
        assert_eq!(agg.min, Some(0));
        assert_eq!(agg.max, Some(2));
        assert_eq!(agg.sum, 3);
        assert_eq!(agg.avg, Some(1.0));
    }

    #[test]
    fn test_empty_aggregate_has_no_extrema() {
        let store = TestStoreFactory::create_temp_store();
        let agg = store
            .aggregate_i64::<Field, _, _>(|_| true, |f| Some(f.order))
            .unwrap();
        assert_eq!(agg.count, 0);
        assert_eq!(agg.min, None);
        assert_eq!(agg.avg, None);
    }

    #[test]
    fn test_group_count_by_kind() {
        let (store, _user, form) = TestStoreFactory::create_store_with_form();
        store.insert(&Field::new(&form.id, "text", "A", 0)).unwrap();
        store.insert(&Field::new(&form.id, "text", "B", 1)).unwrap();
        store
            .insert(&Field::new(&form.id, "select", "C", 2))
            .unwrap();

        let groups = store
            .group_count::<Field, _, _>(|f| f.kind.clone())
            .unwrap();
        assert_eq!(groups.get("text"), Some(&2));
        assert_eq!(groups.get("select"), Some(&1));
    }
}
