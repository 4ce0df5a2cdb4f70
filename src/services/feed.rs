//! Feed query construction and the pagination contract.
//!
//! Every paginated, joined read (videos, comments, tweets) goes through
//! [`FeedQuery`]: exact-match ID filters first, then the free-text filter,
//! then the owner join, projection, and sort. Identifier validation happens
//! at the handler boundary before a query is ever built; an empty page is a
//! valid result, never an error.

use crate::models::ObjectId;
use crate::services::document_store::{DocumentStore, Page, StoreResult};
use crate::services::pipeline::{Filter, Lookup, Projection, SortSpec, Stage};
use serde_json::Value;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// A normalized page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

/// Coerce raw query parameters into a usable page request. Absent, zero,
/// and negative values all normalize to the defaults.
pub fn page_request(page: Option<i64>, limit: Option<i64>) -> PageRequest {
    PageRequest {
        page: page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE),
        limit: limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT),
    }
}

/// Builder for a joined, sorted, paginated collection read.
#[derive(Debug, Clone)]
pub struct FeedQuery {
    collection: &'static str,
    id_filters: Vec<(&'static str, ObjectId)>,
    text_filter: Option<(&'static str, String)>,
    owner_as: &'static str,
    sort: SortSpec,
    projection: Projection,
}

impl FeedQuery {
    pub fn new(collection: &'static str, projection: Projection) -> Self {
        Self {
            collection,
            id_filters: Vec::new(),
            text_filter: None,
            owner_as: "owner",
            sort: SortSpec {
                field: DEFAULT_SORT_FIELD.to_string(),
                descending: true,
            },
            projection,
        }
    }

    /// Restrict to documents whose `field` equals `id`.
    pub fn match_id(mut self, field: &'static str, id: ObjectId) -> Self {
        self.id_filters.push((field, id));
        self
    }

    /// Case-insensitive substring filter on a text field.
    pub fn search(mut self, field: &'static str, needle: impl Into<String>) -> Self {
        self.text_filter = Some((field, needle.into()));
        self
    }

    /// Name the joined owner document something other than `owner`.
    pub fn join_owner_as(mut self, as_field: &'static str) -> Self {
        self.owner_as = as_field;
        self
    }

    /// Resolve the sort specification. A requested field outside the
    /// allow-list falls back to the default rather than erroring; any
    /// direction other than `asc` sorts descending.
    pub fn sort(mut self, requested: Option<&str>, allowed: &[&str], direction: Option<&str>) -> Self {
        let field = requested
            .filter(|f| allowed.contains(f))
            .unwrap_or(DEFAULT_SORT_FIELD);
        self.sort = SortSpec {
            field: field.to_string(),
            descending: direction != Some("asc"),
        };
        self
    }

    /// Materialize the ordered stage list.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        // Exact-match filters lead: cheapest and most selective.
        for (field, id) in &self.id_filters {
            stages.push(Stage::Match(Filter::new().eq(*field, *id)));
        }
        if let Some((field, needle)) = &self.text_filter {
            stages.push(Stage::Match(Filter::new().contains_ci(*field, needle.clone())));
        }
        stages.push(Stage::Lookup(Lookup {
            from: "users",
            local_field: "owner".to_string(),
            foreign_field: "id".to_string(),
            as_field: self.owner_as.to_string(),
        }));
        stages.push(Stage::Unwind(self.owner_as.to_string()));
        stages.push(Stage::Project(self.projection.clone()));
        stages.push(Stage::Sort(self.sort.clone()));
        stages
    }

    /// Run the query and return one page plus totals.
    pub async fn fetch_page(
        &self,
        store: &DocumentStore,
        request: PageRequest,
    ) -> StoreResult<Page<Value>> {
        store
            .run_paginated_pipeline(self.collection, &self.stages(), request.page, request.limit)
            .await
    }

    /// Run the query single-pass, without pagination.
    pub async fn fetch_all(&self, store: &DocumentStore) -> StoreResult<Vec<Value>> {
        store.run_pipeline(self.collection, &self.stages()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_normalizes_bad_input() {
        assert_eq!(page_request(None, None), PageRequest { page: 1, limit: 10 });
        assert_eq!(page_request(Some(0), Some(0)), PageRequest { page: 1, limit: 10 });
        assert_eq!(
            page_request(Some(-3), Some(-1)),
            PageRequest { page: 1, limit: 10 }
        );
        assert_eq!(
            page_request(Some(4), Some(25)),
            PageRequest { page: 4, limit: 25 }
        );
    }

    #[test]
    fn unrecognized_sort_field_falls_back_to_default() {
        let feed = FeedQuery::new("videos", Projection::new().field("id")).sort(
            Some("password"),
            &["createdAt", "views", "duration"],
            None,
        );
        match feed.stages().last() {
            Some(Stage::Sort(sort)) => {
                assert_eq!(sort.field, "createdAt");
                assert!(sort.descending);
            }
            other => panic!("expected sort stage, got {other:?}"),
        }
    }

    #[test]
    fn explicit_ascending_sort_is_honored() {
        let feed = FeedQuery::new("videos", Projection::new().field("id")).sort(
            Some("views"),
            &["createdAt", "views", "duration"],
            Some("asc"),
        );
        match feed.stages().last() {
            Some(Stage::Sort(sort)) => {
                assert_eq!(sort.field, "views");
                assert!(!sort.descending);
            }
            other => panic!("expected sort stage, got {other:?}"),
        }
    }

    #[test]
    fn stages_follow_the_contract_order() {
        let owner = ObjectId::new();
        let feed = FeedQuery::new("videos", Projection::new().field("id"))
            .match_id("owner", owner)
            .search("title", "rust");
        let stages = feed.stages();
        assert!(matches!(stages[0], Stage::Match(_)));
        assert!(matches!(stages[1], Stage::Match(_)));
        assert!(matches!(stages[2], Stage::Lookup(_)));
        assert!(matches!(stages[3], Stage::Unwind(_)));
        assert!(matches!(stages[4], Stage::Project(_)));
        assert!(matches!(stages[5], Stage::Sort(_)));
        assert_eq!(stages.len(), 6);
    }
}
