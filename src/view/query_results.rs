use crate::view::media::ViewItem;
use chrono::{DateTime, Utc};

/// Items fetched for a view plus the selected one
///
/// The selection is always a valid index into `results`, or `None` when
/// there are no results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults {
    results: Vec<ViewItem>,
    selected_index: Option<usize>,
    timestamp: DateTime<Utc>,
}

impl QueryResults {
    /// Results with the newest (first) item selected
    pub fn new(results: Vec<ViewItem>) -> Self {
        let selected_index = (!results.is_empty()).then_some(0);
        QueryResults {
            results,
            selected_index,
            timestamp: Utc::now(),
        }
    }

    pub fn results(&self) -> &[ViewItem] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// When the results were fetched
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    pub fn get_selected_result(&self) -> Option<&ViewItem> {
        self.results.get(self.selected_index?)
    }

    pub fn get_result(&self, index: usize) -> Option<&ViewItem> {
        self.results.get(index)
    }

    /// A copy selecting `index`. Out-of-range indices leave the selection as is.
    pub fn select_index(&self, index: usize) -> QueryResults {
        let mut selected = self.clone();
        if index < selected.results.len() {
            selected.selected_index = Some(index);
        }
        selected
    }

    /// A copy selecting the first item that matches, if there is one.
    pub fn select_result_if_found(&self, predicate: impl Fn(&ViewItem) -> bool) -> Option<QueryResults> {
        let index = self.results.iter().position(predicate)?;
        Some(self.select_index(index))
    }

    /// A copy without the item with this ID, keeping the selection on the
    /// same neighbour where possible.
    pub fn remove_item(&self, id: &str) -> QueryResults {
        let Some(removed) = self.results.iter().position(|item| item.id() == id) else {
            return self.clone();
        };

        let mut results = self.results.clone();
        results.remove(removed);
        let selected_index = match self.selected_index {
            _ if results.is_empty() => None,
            Some(selected) if selected > removed => Some(selected - 1),
            Some(selected) => Some(selected.min(results.len() - 1)),
            None => Some(0),
        };

        QueryResults {
            results,
            selected_index,
            timestamp: self.timestamp,
        }
    }
}
