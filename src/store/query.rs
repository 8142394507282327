//! Pagination and ordering options for `find_many`-style accessors.

use crate::store::record::Record;

/// Direction records are ordered in, by primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Options for list accessors: primary-key ordering, cursor-based paging
/// (exclusive start-after id) and take/skip limits.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub order: SortOrder,
    /// Resume strictly after the record with this id.
    pub cursor: Option<String>,
    pub skip: usize,
    pub take: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Resume after the given record id.
    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }
}

/// Sorts, cursors, and slices a filtered result set.
pub(crate) fn page<R: Record>(mut rows: Vec<R>, options: &FindOptions) -> Vec<R> {
    rows.sort_by(|a, b| a.id().cmp(b.id()));
    if options.order == SortOrder::Desc {
        rows.reverse();
    }

    let start = match &options.cursor {
        Some(cursor) => match rows.iter().position(|r| r.id() == cursor.as_str()) {
            Some(pos) => pos + 1,
            // Cursor row no longer matches the filter; nothing to resume from.
            None => return Vec::new(),
        },
        None => 0,
    };

    let mut iter: Box<dyn Iterator<Item = R>> =
        Box::new(rows.into_iter().skip(start).skip(options.skip));
    if let Some(take) = options.take {
        iter = Box::new(iter.take(take));
    }
    iter.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    fn user_with_id(id: &str) -> User {
        let mut user = User::new(format!("{}@example.com", id));
        user.id = id.to_string();
        user
    }

    #[test]
    fn test_paging_with_cursor_and_take() {
        let rows = vec![
            user_with_id("c"),
            user_with_id("a"),
            user_with_id("d"),
            user_with_id("b"),
        ];
        let options = FindOptions::new().after("a").take(2);
        let paged = page(rows, &options);
        let ids: Vec<&str> = paged.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_descending_order_with_skip() {
        let rows = vec![user_with_id("a"), user_with_id("b"), user_with_id("c")];
        let options = FindOptions::new().order(SortOrder::Desc).skip(1);
        let paged = page(rows, &options);
        let ids: Vec<&str> = paged.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_missing_cursor_yields_empty_page() {
        let rows = vec![user_with_id("a")];
        let options = FindOptions::new().after("zzz");
        assert!(page(rows, &options).is_empty());
    }
}
