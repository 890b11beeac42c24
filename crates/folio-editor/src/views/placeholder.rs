// SPDX-License-Identifier: AGPL-3.0-or-later
//! View for unsupported-content placeholders
//!
//! Shows the source label. Details are fetched lazily the first time they
//! are expanded and cached afterwards. A failed fetch is retried on the next
//! expansion. Without a detail handle nothing is ever fetched.

use folio_core::extensions::placeholder::{detail_handle, source_label};
use folio_core::services::{DetailFetcher, DetailHandle, PlaceholderDetail};
use folio_core::Element;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DetailState {
    #[default]
    NotLoaded,
    Loaded(PlaceholderDetail),
    Failed(String),
}

pub struct PlaceholderView {
    label: String,
    handle: Option<DetailHandle>,
    fetcher: Arc<dyn DetailFetcher>,
    expanded: bool,
    detail: DetailState,
}

impl PlaceholderView {
    pub fn new(
        label: impl Into<String>,
        handle: Option<DetailHandle>,
        fetcher: Arc<dyn DetailFetcher>,
    ) -> Self {
        Self {
            label: label.into(),
            handle,
            fetcher,
            expanded: false,
            detail: DetailState::NotLoaded,
        }
    }

    /// View over a placeholder node's attributes
    pub fn from_element(node: &Element, fetcher: Arc<dyn DetailFetcher>) -> Self {
        Self::new(source_label(node), detail_handle(node), fetcher)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> Option<&DetailHandle> {
        self.handle.as_ref()
    }

    /// Details can only be shown when there is something to fetch
    pub fn has_details(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn detail(&self) -> &DetailState {
        &self.detail
    }

    /// Flip the details panel, fetching on first expansion
    pub async fn toggle_details(&mut self) -> &DetailState {
        self.expanded = !self.expanded;
        if self.expanded && !matches!(self.detail, DetailState::Loaded(_)) {
            self.fetch().await;
        }
        &self.detail
    }

    /// Fetch again after a failure
    pub async fn retry(&mut self) -> &DetailState {
        if matches!(self.detail, DetailState::Failed(_)) {
            self.fetch().await;
        }
        &self.detail
    }

    async fn fetch(&mut self) {
        let Some(handle) = self.handle.as_ref() else {
            return;
        };
        self.detail = match self.fetcher.fetch_detail(handle).await {
            Ok(detail) => DetailState::Loaded(detail),
            Err(err) => {
                tracing::debug!(%handle, %err, "placeholder detail fetch failed");
                DetailState::Failed(err.to_string())
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_core::services::DetailFetchError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds
    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl DetailFetcher for Flaky {
        async fn fetch_detail(
            &self,
            handle: &DetailHandle,
        ) -> Result<PlaceholderDetail, DetailFetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(DetailFetchError::Status { status: 503 });
            }
            Ok(PlaceholderDetail {
                raw_content: format!("macro {handle}"),
                notes: None,
            })
        }
    }

    fn flaky(failures: usize) -> Arc<Flaky> {
        Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            failures,
        })
    }

    #[tokio::test]
    async fn test_details_are_cached() {
        let fetcher = flaky(0);
        let mut view = PlaceholderView::new("toc", Some(DetailHandle::Id(9)), fetcher.clone());
        assert!(matches!(view.toggle_details().await, DetailState::Loaded(d) if d.raw_content == "macro 9"));
        view.toggle_details().await;
        assert!(!view.is_expanded());
        view.toggle_details().await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_retried() {
        let fetcher = flaky(1);
        let mut view = PlaceholderView::new("toc", Some(DetailHandle::Key("k".into())), fetcher.clone());
        assert!(matches!(view.toggle_details().await, DetailState::Failed(_)));
        assert!(matches!(view.retry().await, DetailState::Loaded(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_element_reads_attrs() {
        let node = Element::new("fallbackPlaceholder")
            .with_attr("sourceLabel", "jira")
            .with_attr("detailHandle", 42i64);
        let view = PlaceholderView::from_element(&node, flaky(0));
        assert_eq!(view.label(), "jira");
        assert_eq!(view.handle(), Some(&DetailHandle::Id(42)));
    }

    #[tokio::test]
    async fn test_null_handle_never_fetches() {
        let fetcher = flaky(0);
        let mut view = PlaceholderView::new("Unknown Macro", None, fetcher.clone());
        assert!(!view.has_details());
        assert_eq!(view.toggle_details().await, &DetailState::NotLoaded);
        view.toggle_details().await;
        view.toggle_details().await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(view.label(), "Unknown Macro");
    }
}
