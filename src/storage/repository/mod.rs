// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the credential store.
//!
//! Each repository owns the rules for one entity type and runs every
//! mutation inside a single redb write transaction.

pub mod roles;
pub mod users;

pub use roles::{normalize_modules, NewRole, RoleRepository, RoleUpdate, StoredRole};
pub use users::{
    BulkFailure, BulkUpdate, BulkWriteResult, NewUser, RoleSummary, StoredUser, UpdateManyResult,
    UserFilter, UserRepository, UserUpdate, UserView,
};

/// Default page size when the client does not send `limit`.
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

/// Search and pagination parameters shared by the list operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    /// Case-insensitive substring filter; empty matches everything.
    pub q: String,
    /// 1-based page number. Zero is treated as the first page.
    pub page: u64,
    /// Page size. Zero means no limit.
    pub limit: u64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            q: String::new(),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ListParams {
    fn skip(&self) -> usize {
        let page = self.page.max(1);
        usize::try_from((page - 1).saturating_mul(self.limit)).unwrap_or(usize::MAX)
    }

    fn take(&self) -> usize {
        if self.limit == 0 {
            usize::MAX
        } else {
            usize::try_from(self.limit).unwrap_or(usize::MAX)
        }
    }

    /// Lowercased needle, or `None` when no filter applies. Whitespace in
    /// `q` is significant.
    fn needle(&self) -> Option<String> {
        (!self.q.is_empty()).then(|| self.q.to_lowercase())
    }

    /// Filter `items` by `haystacks` against the query, then cut the page.
    pub(crate) fn apply<T, F>(&self, items: Vec<T>, haystacks: F) -> Vec<T>
    where
        F: Fn(&T) -> Vec<&str>,
    {
        let needle = self.needle();
        items
            .into_iter()
            .filter(|item| match &needle {
                Some(needle) => haystacks(item)
                    .iter()
                    .any(|h| h.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .skip(self.skip())
            .take(self.take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(q: &str, page: u64, limit: u64) -> ListParams {
        ListParams {
            q: q.to_string(),
            page,
            limit,
        }
    }

    #[test]
    fn pages_are_cut_after_filtering() {
        let items: Vec<String> = (1..=7).map(|i| format!("item-{i}")).collect();

        let page = params("", 2, 3).apply(items.clone(), |s| vec![s.as_str()]);
        assert_eq!(page, vec!["item-4", "item-5", "item-6"]);

        let last = params("", 3, 3).apply(items.clone(), |s| vec![s.as_str()]);
        assert_eq!(last, vec!["item-7"]);

        let beyond = params("", 9, 3).apply(items, |s| vec![s.as_str()]);
        assert!(beyond.is_empty());
    }

    #[test]
    fn query_is_case_insensitive_substring() {
        let items = vec!["Admin".to_string(), "Editor".to_string(), "sysadmin".to_string()];
        let hits = params("ADM", 1, 20).apply(items, |s| vec![s.as_str()]);
        assert_eq!(hits, vec!["Admin", "sysadmin"]);
    }

    #[test]
    fn query_whitespace_is_matched_as_sent() {
        let items = vec!["admin".to_string(), "super admin".to_string()];
        let hits = params(" admin", 1, 20).apply(items, |s| vec![s.as_str()]);
        assert_eq!(hits, vec!["super admin"]);
    }

    #[test]
    fn zero_page_is_first_page_and_zero_limit_is_unbounded() {
        let items: Vec<String> = (1..=30).map(|i| i.to_string()).collect();
        assert_eq!(params("", 0, 5).apply(items.clone(), |s| vec![s.as_str()]).len(), 5);
        assert_eq!(params("", 1, 0).apply(items, |s| vec![s.as_str()]).len(), 30);
    }

    #[test]
    fn any_haystack_may_match() {
        let items = vec![("Ann", "Lee"), ("Bob", "Annetta")];
        let hits = params("ann", 1, 20).apply(items, |(a, b)| vec![*a, *b]);
        assert_eq!(hits.len(), 2);
    }
}
