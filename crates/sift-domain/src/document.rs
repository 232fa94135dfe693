//! Documents, extraction modes and resolved source text

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Section keys a text source may report
pub const SECTION_KEYS: [&str; 7] = [
    "title",
    "abstract",
    "introduction",
    "methods",
    "results",
    "discussion",
    "conclusion",
];

/// Which text an extraction run works over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Title and abstract only, processed as a single chunk
    #[default]
    Abstract,
    /// Full document text, processed as overlapping chunks
    Fulltext,
}

impl ExtractionMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Abstract => "abstract",
            ExtractionMode::Fulltext => "fulltext",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document ("work") as known to the caller before any text is fetched
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document identifier; sessions are keyed by it
    pub id: String,

    /// Title, if known
    #[serde(default)]
    pub title: Option<String>,

    /// Abstract, if the index already holds it
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,

    /// Landing page or full-text location
    #[serde(default)]
    pub url: Option<String>,
}

impl DocumentRef {
    /// Create a reference with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the abstract
    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = Some(abstract_text.into());
        self
    }
}

/// Where resolved text came from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Abstract from the search index
    #[default]
    IndexAbstract,
    /// Abstract scraped from the landing page
    ScrapedAbstract,
    /// Parsed PDF
    Pdf,
    /// Structured repository full text (e.g. PMC)
    Repository,
    /// Scraped web page
    Web,
    /// Local file
    File,
}

/// Text resolved for one document: `(fullText, sections)` plus provenance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceText {
    /// Whole document text
    pub full_text: String,

    /// Named sections; keys come from [`SECTION_KEYS`]; may be empty
    #[serde(default)]
    pub sections: BTreeMap<String, String>,

    /// Where the text came from
    #[serde(default)]
    pub source_kind: SourceKind,

    /// Whether the abstract was obtained by scraping
    #[serde(default)]
    pub scraped_abstract: bool,
}

impl SourceText {
    /// Text with no structured sections
    pub fn plain(full_text: impl Into<String>, source_kind: SourceKind) -> Self {
        Self {
            full_text: full_text.into(),
            sections: BTreeMap::new(),
            source_kind,
            scraped_abstract: false,
        }
    }

    /// Add a section; blank content is ignored
    pub fn with_section(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.sections.insert(key.into(), content);
        }
        self
    }

    /// Look up a non-blank section
    pub fn section(&self, key: &str) -> Option<&str> {
        self.sections
            .get(key)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Whether any non-blank section is present
    pub fn has_sections(&self) -> bool {
        self.sections.values().any(|s| !s.trim().is_empty())
    }

    /// Whether there is nothing to extract from
    pub fn is_empty(&self) -> bool {
        self.full_text.trim().is_empty() && !self.has_sections()
    }
}
