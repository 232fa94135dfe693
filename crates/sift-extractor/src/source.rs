//! In-memory text source

use async_trait::async_trait;
use sift_domain::{DocumentRef, ExtractionMode, SourceKind, SourceText, TextSource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Text source backed by preloaded documents
///
/// Documents without preloaded text fall back to the reference's own title
/// and abstract in abstract mode. All state is shared between clones, and
/// fetches are counted so callers can check caching.
#[derive(Debug, Clone, Default)]
pub struct StaticTextSource {
    texts: Arc<Mutex<HashMap<String, SourceText>>>,
    scraped: Arc<Mutex<HashMap<String, String>>>,
    fetches: Arc<Mutex<usize>>,
}

impl StaticTextSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload text for a document id
    pub fn insert(&self, document_id: impl Into<String>, text: SourceText) {
        self.texts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(document_id.into(), text);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_text(self, document_id: impl Into<String>, text: SourceText) -> Self {
        self.insert(document_id, text);
        self
    }

    /// Abstract returned by [`TextSource::scrape_abstract`] for a document
    pub fn with_scraped_abstract(
        self,
        document_id: impl Into<String>,
        abstract_text: impl Into<String>,
    ) -> Self {
        self.scraped
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(document_id.into(), abstract_text.into());
        self
    }

    /// Number of fetches served so far
    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl TextSource for StaticTextSource {
    type Error = String;

    async fn fetch(
        &self,
        document: &DocumentRef,
        mode: ExtractionMode,
    ) -> Result<SourceText, Self::Error> {
        *self.fetches.lock().unwrap_or_else(|p| p.into_inner()) += 1;

        let preloaded = self
            .texts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&document.id)
            .cloned();
        if let Some(text) = preloaded {
            return Ok(text);
        }

        match mode {
            ExtractionMode::Abstract => {
                let mut text = SourceText::plain("", SourceKind::IndexAbstract);
                if let Some(title) = &document.title {
                    text = text.with_section("title", title.as_str());
                }
                if let Some(abstract_text) = &document.abstract_text {
                    text = text.with_section("abstract", abstract_text.as_str());
                }
                Ok(text)
            }
            ExtractionMode::Fulltext => Err(format!("no full text for document '{}'", document.id)),
        }
    }

    async fn scrape_abstract(&self, document: &DocumentRef) -> Result<Option<String>, Self::Error> {
        Ok(self
            .scraped
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&document.id)
            .cloned())
    }
}
