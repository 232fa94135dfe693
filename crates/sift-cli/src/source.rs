//! Local file text source.
//!
//! Plain text and markdown files are read from disk. Markdown headings that
//! name a known section ("Abstract", "2. Materials and Methods", ...) split
//! the file into the section vocabulary the prompt builder understands.

use async_trait::async_trait;
use sift_domain::{DocumentRef, ExtractionMode, SourceKind, SourceText, TextSource};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// Text source that maps document ids to files on disk.
#[derive(Debug, Clone, Default)]
pub struct FileTextSource {
    paths: HashMap<String, PathBuf>,
}

impl FileTextSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the file backing a document.
    pub fn with_file(mut self, document_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(document_id.into(), path.into());
        self
    }
}

#[async_trait]
impl TextSource for FileTextSource {
    type Error = io::Error;

    async fn fetch(
        &self,
        document: &DocumentRef,
        _mode: ExtractionMode,
    ) -> Result<SourceText, Self::Error> {
        let path = self.paths.get(&document.id).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no file registered for document '{}'", document.id),
            )
        })?;

        let raw = tokio::fs::read_to_string(path).await?;
        let text = parse_document(&raw);
        debug!(
            "Read {} ({} chars, {} sections)",
            path.display(),
            text.full_text.len(),
            text.sections.len()
        );
        Ok(text)
    }

    async fn scrape_abstract(&self, _document: &DocumentRef) -> Result<Option<String>, Self::Error> {
        Ok(None)
    }
}

/// Build a [`SourceText`] from file contents.
///
/// The full text is the file as read. Sections are only reported when at
/// least one recognised heading is present.
pub fn parse_document(raw: &str) -> SourceText {
    let mut text = SourceText::plain(raw, SourceKind::File);
    for (key, content) in split_sections(raw) {
        text = text.with_section(key, content);
    }
    text
}

/// Split markdown into known sections.
///
/// The first level-one heading that is not itself a section name becomes
/// the title. Unrecognised headings stay inside the current section.
pub fn split_sections(raw: &str) -> BTreeMap<String, String> {
    let mut sections: BTreeMap<String, String> = BTreeMap::new();
    let mut title: Option<String> = None;
    let mut current: Option<&'static str> = None;
    let mut buffer: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if let Some((level, heading)) = parse_heading(line) {
            if let Some(key) = section_key(heading) {
                flush(&mut sections, current, &buffer);
                buffer.clear();
                current = Some(key);
                continue;
            }
            if level == 1 && title.is_none() && current.is_none() {
                title = Some(heading.to_string());
                continue;
            }
        }
        if current.is_some() {
            buffer.push(line);
        }
    }
    flush(&mut sections, current, &buffer);

    if let Some(title) = title {
        if !sections.is_empty() {
            sections.insert("title".to_string(), title);
        }
    }
    sections
}

fn flush(sections: &mut BTreeMap<String, String>, key: Option<&'static str>, lines: &[&str]) {
    let Some(key) = key else {
        return;
    };
    let content = lines.join("\n").trim().to_string();
    if content.is_empty() {
        return;
    }
    sections
        .entry(key.to_string())
        .and_modify(|existing| {
            existing.push_str("\n\n");
            existing.push_str(&content);
        })
        .or_insert(content);
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let heading = rest.trim().trim_end_matches('#').trim();
    (!heading.is_empty()).then_some((level, heading))
}

fn section_key(heading: &str) -> Option<&'static str> {
    let normalized = heading
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c.is_whitespace())
        .trim_end_matches(':')
        .to_lowercase();

    let key = match normalized.as_str() {
        "abstract" | "summary" => "abstract",
        "introduction" | "background" => "introduction",
        "methods" | "method" | "methodology" | "materials and methods" | "methods and materials"
        | "patients and methods" => "methods",
        "results" | "findings" | "results and discussion" => "results",
        "discussion" => "discussion",
        "conclusion" | "conclusions" => "conclusion",
        _ => return None,
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = "\
# Statins after stroke

## Abstract
We randomised 120 patients.

## 1. Introduction
Background text.

## 2. Materials and Methods
Participants were recruited.

### Outcomes
Primary outcome was recurrence.

## Results
Recurrence fell.

## Conclusions
Statins help.
";

    #[test]
    fn test_sections_are_split() {
        let sections = split_sections(PAPER);
        assert_eq!(sections["title"], "Statins after stroke");
        assert_eq!(sections["abstract"], "We randomised 120 patients.");
        assert_eq!(sections["introduction"], "Background text.");
        assert_eq!(sections["conclusion"], "Statins help.");
    }

    #[test]
    fn test_subheadings_stay_in_section() {
        let sections = split_sections(PAPER);
        let methods = &sections["methods"];
        assert!(methods.starts_with("Participants were recruited."));
        assert!(methods.contains("### Outcomes"));
        assert!(methods.ends_with("Primary outcome was recurrence."));
    }

    #[test]
    fn test_plain_text_has_no_sections() {
        let text = parse_document("Just some prose without headings.");
        assert!(!text.has_sections());
        assert_eq!(text.full_text, "Just some prose without headings.");
        assert_eq!(text.source_kind, SourceKind::File);
    }

    #[test]
    fn test_title_alone_is_not_a_section() {
        let sections = split_sections("# A title\n\nBody text.");
        assert!(sections.is_empty());
    }

    #[test]
    fn test_hashtag_is_not_a_heading() {
        assert_eq!(parse_heading("#hashtag"), None);
        assert_eq!(parse_heading("## Results ##"), Some((2, "Results")));
    }

    #[tokio::test]
    async fn test_fetch_reads_registered_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.md");
        std::fs::write(&path, PAPER).unwrap();

        let source = FileTextSource::new().with_file("W1", &path);
        let text = source
            .fetch(&DocumentRef::new("W1"), ExtractionMode::Fulltext)
            .await
            .unwrap();
        assert_eq!(text.section("results"), Some("Recurrence fell."));
    }

    #[tokio::test]
    async fn test_unregistered_document_is_not_found() {
        let err = FileTextSource::new()
            .fetch(&DocumentRef::new("W2"), ExtractionMode::Abstract)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
