//! Tag Search
//!
//! Harvests the positive match set of every leaf tag filter reachable in a
//! condition tree:
//!
//! ```text
//! host=a and (zone=z1 or not ip=10.0.0.1)
//!   → { "host=a":       (key 1, {3}),
//!       "zone=z1":      (key 2, {1, 4}),
//!       "ip=10.0.0.1":  (key 3, {7}) }
//! ```
//!
//! AND/OR are not combined and NOT is not inverted here; series selection
//! downstream rebuilds the boolean structure from the condition and these
//! per-leaf results, keyed by [`TagFilter::rewrite`].

use crate::index::Metadata;
use crate::query::error::{QueryError, QueryResult};
use crate::query::expr::{Expr, TagFilter};
use roaring::RoaringBitmap;
use std::collections::HashMap;

/// Tag value IDs matched by one leaf filter
#[derive(Debug, Clone, PartialEq)]
pub struct TagFilterResult {
    pub tag_key_id: u32,
    pub tag_value_ids: RoaringBitmap,
}

/// Single-use resolver of one condition against one metric's tag index
///
/// Holds the tag key cache and the first error of the traversal, so an
/// instance must not be shared between threads or reused across conditions.
pub struct TagSearch<'a> {
    namespace: String,
    metric_name: String,
    condition: Option<&'a Expr>,
    metadata: &'a dyn Metadata,

    result: HashMap<String, TagFilterResult>,
    /// tag key name → tag key ID
    tags: HashMap<String, u32>,
    err: Option<QueryError>,
}

impl<'a> TagSearch<'a> {
    pub fn new(
        namespace: impl Into<String>,
        metric_name: impl Into<String>,
        condition: Option<&'a Expr>,
        metadata: &'a dyn Metadata,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            condition,
            metadata,
            result: HashMap::new(),
            tags: HashMap::new(),
            err: None,
        }
    }

    /// Resolve every leaf of the condition
    ///
    /// Returns an empty map when there is no condition. The first error
    /// anywhere in the tree fails the whole search; no partial result is
    /// returned.
    pub fn filter(mut self) -> QueryResult<HashMap<String, TagFilterResult>> {
        if let Some(condition) = self.condition {
            self.find_tag_value_ids_by_expr(condition);
        }
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }

    fn find_tag_value_ids_by_expr(&mut self, expr: &Expr) {
        if self.err.is_some() {
            return;
        }
        match expr {
            Expr::Tag(filter) => {
                if let Err(err) = self.find_leaf(filter) {
                    self.err = Some(err);
                }
            }
            Expr::Paren(inner) => self.find_tag_value_ids_by_expr(inner),
            // not tag filter => tag filter, inverted by series selection
            Expr::Not(inner) => self.find_tag_value_ids_by_expr(inner),
            Expr::Binary { op, left, right } => {
                if !op.is_logical() {
                    self.err = Some(QueryError::WrongBinaryOperator(op.to_string()));
                    return;
                }
                self.find_tag_value_ids_by_expr(left);
                self.find_tag_value_ids_by_expr(right);
            }
        }
    }

    fn find_leaf(&mut self, filter: &TagFilter) -> QueryResult<()> {
        let tag_key_id = self.get_tag_key_id(filter.tag_key())?;
        let tag_value_ids = self
            .metadata
            .tag_metadata()
            .find_tag_value_ids_by_expr(tag_key_id, filter)?;

        if !tag_value_ids.is_empty() {
            self.result.insert(
                filter.rewrite(),
                TagFilterResult {
                    tag_key_id,
                    tag_value_ids,
                },
            );
        }
        Ok(())
    }

    fn get_tag_key_id(&mut self, tag_key: &str) -> QueryResult<u32> {
        if let Some(&id) = self.tags.get(tag_key) {
            return Ok(id);
        }
        let id = self.metadata.metadata_database().get_tag_key_id(
            &self.namespace,
            &self.metric_name,
            tag_key,
        )?;
        self.tags.insert(tag_key.to_string(), id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{
        IndexError, IndexResult, MetadataDatabase, TagIndex, TagMetadata,
    };
    use crate::query::expr::BinaryOp;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn index() -> TagIndex {
        let index = TagIndex::new();
        for (host, zone, ip) in [
            ("web-1", "z1", "10.0.0.1"),
            ("web-2", "z2", "10.0.0.2"),
            ("db-1", "z1", "10.0.1.1"),
        ] {
            index
                .register_tags("ns", "cpu", &[("host", host), ("zone", zone), ("ip", ip)])
                .unwrap();
        }
        index
    }

    /// Counts tag key lookups and delegates to a real index
    struct CountingMetadata {
        inner: TagIndex,
        key_lookups: AtomicUsize,
    }

    impl MetadataDatabase for CountingMetadata {
        fn get_tag_key_id(&self, ns: &str, metric: &str, key: &str) -> IndexResult<u32> {
            self.key_lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.get_tag_key_id(ns, metric, key)
        }
    }

    impl Metadata for CountingMetadata {
        fn metadata_database(&self) -> &dyn MetadataDatabase {
            self
        }

        fn tag_metadata(&self) -> &dyn TagMetadata {
            &self.inner
        }
    }

    #[test]
    fn test_no_condition_is_empty() {
        let index = index();
        let result = TagSearch::new("ns", "cpu", None, &index).filter().unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_every_leaf_is_harvested() {
        let index = index();
        // host like 'web-*' and (zone=z1 or not ip=10.0.1.1)
        let condition = Expr::and(
            Expr::tag(TagFilter::like("host", "web-*")),
            Expr::paren(Expr::or(
                Expr::tag(TagFilter::equals("zone", "z1")),
                Expr::not(Expr::tag(TagFilter::equals("ip", "10.0.1.1"))),
            )),
        );

        let result = TagSearch::new("ns", "cpu", Some(&condition), &index)
            .filter()
            .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result["host like web-*"].tag_value_ids.len(), 2);
        assert_eq!(result["zone=z1"].tag_value_ids.len(), 1);
        // negation is not applied here
        assert_eq!(result["ip=10.0.1.1"].tag_value_ids.len(), 1);
    }

    #[test]
    fn test_empty_match_is_omitted() {
        let index = index();
        let condition = Expr::or(
            Expr::tag(TagFilter::equals("host", "web-1")),
            Expr::tag(TagFilter::equals("host", "missing")),
        );
        let result = TagSearch::new("ns", "cpu", Some(&condition), &index)
            .filter()
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("host=web-1"));
    }

    #[test]
    fn test_equivalent_leaves_share_entry() {
        let index = index();
        let condition = Expr::or(
            Expr::tag(TagFilter::in_values("zone", &["z1", "z2"])),
            Expr::tag(TagFilter::in_values("zone", &["z2", "z1"])),
        );
        let result = TagSearch::new("ns", "cpu", Some(&condition), &index)
            .filter()
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result["zone in (z1,z2)"].tag_value_ids.len(), 2);
    }

    #[test]
    fn test_wrong_binary_operator_fails_whole_search() {
        let index = index();
        let condition = Expr::and(
            Expr::tag(TagFilter::equals("host", "web-1")),
            Expr::binary(
                BinaryOp::Add,
                Expr::tag(TagFilter::equals("zone", "z1")),
                Expr::tag(TagFilter::equals("zone", "z2")),
            ),
        );
        let err = TagSearch::new("ns", "cpu", Some(&condition), &index)
            .filter()
            .unwrap_err();
        assert_eq!(err.to_string(), "wrong binary operator in tag filter: +");
    }

    #[test]
    fn test_unknown_tag_key_latches_error() {
        let index = index();
        let condition = Expr::or(
            Expr::tag(TagFilter::equals("dc", "east")),
            Expr::tag(TagFilter::equals("host", "web-1")),
        );
        let err = TagSearch::new("ns", "cpu", Some(&condition), &index)
            .filter()
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Index(IndexError::TagKeyNotFound { .. })
        ));
    }

    #[test]
    fn test_tag_key_lookup_is_cached() {
        let metadata = CountingMetadata {
            inner: index(),
            key_lookups: AtomicUsize::new(0),
        };
        let condition = Expr::or(
            Expr::tag(TagFilter::equals("host", "web-1")),
            Expr::tag(TagFilter::equals("host", "web-2")),
        );
        let result = TagSearch::new("ns", "cpu", Some(&condition), &metadata)
            .filter()
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(metadata.key_lookups.load(Ordering::SeqCst), 1);
    }
}
