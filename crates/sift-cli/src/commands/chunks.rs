//! Chunks command implementation.

use crate::cli::ChunksArgs;
use crate::config::Config;
use crate::error::Result;
use crate::source::parse_document;
use sift_domain::{ExtractionMode, SourceText};
use sift_extractor::{chunk_text, TextChunker};
use std::io::Write;

/// Execute the chunks command.
pub fn execute_chunks(args: ChunksArgs, config: &Config, out: &mut impl Write) -> Result<()> {
    let raw = std::fs::read_to_string(&args.input)?;
    let source = parse_document(&raw);
    write_chunks(&source, args.mode.into(), config, args.json, out)
}

fn write_chunks(
    source: &SourceText,
    mode: ExtractionMode,
    config: &Config,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let chunker = TextChunker::from_profile(config.extractor.profile(mode))?;
    let chunks = chunker.chunk(&chunk_text(source, mode));

    if json {
        for chunk in &chunks {
            writeln!(out, "{}", serde_json::to_string(chunk)?)?;
        }
        return Ok(());
    }

    let sections: Vec<&str> = source.sections.keys().map(String::as_str).collect();
    writeln!(
        out,
        "{} chunk(s) in {} mode; sections: {}",
        chunks.len(),
        mode,
        if sections.is_empty() { "none".to_string() } else { sections.join(", ") }
    )?;
    for chunk in &chunks {
        let preview: String = chunk.text.chars().take(60).collect();
        writeln!(
            out,
            "  [{}/{}] {}..{} ({} chars) {}",
            chunk.index + 1,
            chunk.total,
            chunk.start,
            chunk.end,
            chunk.len(),
            preview.replace('\n', " ")
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_domain::SourceKind;

    #[test]
    fn test_long_text_is_split_into_overlapping_chunks() {
        let source = SourceText::plain("x".repeat(9_000), SourceKind::File);
        let mut out = Vec::new();
        write_chunks(&source, ExtractionMode::Fulltext, &Config::default(), true, &mut out).unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1]["start"], 2_500);
    }

    #[test]
    fn test_abstract_mode_uses_title_and_abstract() {
        let source = parse_document("# Trial\n\n## Abstract\nShort abstract.\n\n## Methods\nLong methods.");
        let mut out = Vec::new();
        write_chunks(&source, ExtractionMode::Abstract, &Config::default(), false, &mut out).unwrap();

        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.starts_with("1 chunk(s) in abstract mode"));
        assert!(rendered.contains("Trial  Short abstract."));
    }
}
