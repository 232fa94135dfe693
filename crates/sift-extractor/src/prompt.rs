//! Prompt construction for per-chunk field extraction

use crate::chunking::Chunk;
use sift_domain::{Accumulator, DocumentRef, FieldDescriptor, SourceText};

/// Field ids or names that pull the methods section into the context
const METHODS_KEYS: &[&str] = &["methods", "method", "methodology", "techniques"];

/// Field ids or names that pull the results section into the context
const RESULTS_KEYS: &[&str] = &["results", "primary_outcome", "outcomes", "outcome"];

/// Document-level context shared by every prompt of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentContext {
    title: Option<String>,
    abstract_text: Option<String>,
    methods: Option<String>,
    results: Option<String>,
}

impl DocumentContext {
    /// Collect context from the document reference and its resolved text
    ///
    /// Sections win over the reference's own title and abstract.
    pub fn new(document: &DocumentRef, source: &SourceText) -> Self {
        let pick = |key: &str, fallback: Option<&String>| {
            source
                .section(key)
                .map(str::to_string)
                .or_else(|| fallback.filter(|s| !s.trim().is_empty()).cloned())
        };

        Self {
            title: pick("title", document.title.as_ref()),
            abstract_text: pick("abstract", document.abstract_text.as_ref()),
            methods: source.section("methods").map(str::to_string),
            results: source.section("results").map(str::to_string),
        }
    }

    /// Whether any structured context is available
    pub fn is_structured(&self) -> bool {
        self.abstract_text.is_some() || self.methods.is_some() || self.results.is_some()
    }

    /// Whether `text` holds nothing beyond this context's title and abstract
    fn covers(&self, text: &str) -> bool {
        let Some(abstract_text) = &self.abstract_text else {
            return false;
        };
        let (text, abstract_text) = (text.trim(), abstract_text.trim());
        text == abstract_text
            || self
                .title
                .as_ref()
                .is_some_and(|title| text == format!("{}\n\n{}", title.trim(), abstract_text))
    }
}

/// Builds initial and update prompts for one document
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    context: DocumentContext,
    fallback_chars: usize,
}

impl PromptBuilder {
    /// Create a builder; `fallback_chars` bounds the raw-text context used
    /// when the document has no structured sections
    pub fn new(context: DocumentContext, fallback_chars: usize) -> Self {
        Self {
            context,
            fallback_chars,
        }
    }

    /// Prompt for the first chunk
    pub fn build_initial(
        &self,
        chunk: &Chunk,
        schema_description: &str,
        fields: &[FieldDescriptor],
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(INITIAL_INSTRUCTIONS);
        prompt.push_str("\n\nFields to extract:\n");
        prompt.push_str(schema_description);
        prompt.push('\n');

        self.push_context(&mut prompt, chunk, fields);

        prompt.push_str(ENVELOPE_REMINDER);
        prompt
    }

    /// Prompt for every later chunk, seeded with the results so far
    pub fn build_update(
        &self,
        accumulator: &Accumulator,
        chunk: &Chunk,
        schema_description: &str,
        fields: &[FieldDescriptor],
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(UPDATE_INSTRUCTIONS);
        prompt.push_str("\n\nFields to extract:\n");
        prompt.push_str(schema_description);
        prompt.push('\n');

        // BTreeMap keeps field order stable between prompts
        let current = serde_json::to_string_pretty(accumulator).unwrap_or_else(|_| "{}".to_string());
        prompt.push_str("Current results (from earlier parts of the document):\n");
        prompt.push_str(&current);
        prompt.push_str("\n\n");

        self.push_context(&mut prompt, chunk, fields);

        prompt.push_str(UPDATE_RULES);
        prompt.push_str("\n\n");
        prompt.push_str(ENVELOPE_REMINDER);
        prompt
    }

    fn push_context(&self, prompt: &mut String, chunk: &Chunk, fields: &[FieldDescriptor]) {
        let ctx = &self.context;

        if let Some(title) = &ctx.title {
            prompt.push_str(&format!("Title: {}\n\n", title.trim()));
        }

        if !ctx.is_structured() {
            prompt.push_str(&format!(
                "Document text (part {} of {}):\n---\n{}\n---\n\n",
                chunk.index + 1,
                chunk.total,
                truncate_chars(&chunk.text, self.fallback_chars)
            ));
            return;
        }

        if let Some(abstract_text) = &ctx.abstract_text {
            prompt.push_str(&format!("Abstract:\n{}\n\n", abstract_text.trim()));
        }
        if let Some(methods) = ctx.methods.as_ref().filter(|_| wants(fields, METHODS_KEYS)) {
            prompt.push_str(&format!("Methods:\n{}\n\n", methods.trim()));
        }
        if let Some(results) = ctx.results.as_ref().filter(|_| wants(fields, RESULTS_KEYS)) {
            prompt.push_str(&format!("Results:\n{}\n\n", results.trim()));
        }

        if ctx.covers(&chunk.text) {
            return;
        }

        prompt.push_str(&format!(
            "Excerpt (part {} of {}):\n---\n{}\n---\n\n",
            chunk.index + 1,
            chunk.total,
            chunk.text
        ));
    }
}

/// Whether any field is keyed to one of `keys`, by id or by name
fn wants(fields: &[FieldDescriptor], keys: &[&str]) -> bool {
    fields.iter().any(|field| {
        let id = field.id.to_lowercase();
        let name = field.name.trim().to_lowercase().replace(' ', "_");
        keys.iter().any(|key| id == *key || name == *key)
    })
}

/// First `max` characters of `text`
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

const INITIAL_INSTRUCTIONS: &str = r#"You are extracting structured data from a research document.
For every field listed below, read the text and report:
- "value": the extracted value, matching the field's type, or null if the text does not say
- "confidence": a number from 0.0 to 1.0 reflecting how clearly the text supports the value
- "citations": short verbatim quotes supporting the value, each with a "location" such as "abstract" or "methods"

Use lower confidence when the text hedges or only implies the value.
Do not guess values the text does not support."#;

const UPDATE_INSTRUCTIONS: &str = r#"You are continuing a structured extraction over a long research document, one part at a time.
Earlier parts have already produced the current results shown below.
Read the new part of the document and return the complete result object for every field."#;

const UPDATE_RULES: &str = r#"Rules for updating:
- Improve a field only where the new part adds information (a clearer value, better evidence, or additional options)
- If the new part says nothing new about a field, return that field exactly as it appears in the current results
- Never lower a field's confidence just because the new part does not mention it"#;

const ENVELOPE_REMINDER: &str = r#"Output format (a single JSON object, keyed by field id):
{
  "<field id>": {
    "value": <typed value or null>,
    "confidence": 0.0-1.0,
    "citations": [{"text": "exact quote", "location": "section"}]
  }
}

Return ONLY the JSON object. No prose, no explanations, no markdown code fences."#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sift_domain::{Citation, FieldExtraction, FieldType, SourceKind};

    fn chunk(text: &str, index: usize, total: usize) -> Chunk {
        Chunk {
            index,
            total,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn structured_source() -> SourceText {
        SourceText::plain("full body", SourceKind::Repository)
            .with_section("title", "Aspirin after stroke")
            .with_section("abstract", "We randomised 400 patients.")
            .with_section("methods", "Double-blind allocation by computer.")
            .with_section("results", "Recurrence fell by 20%.")
    }

    fn builder(source: &SourceText) -> PromptBuilder {
        PromptBuilder::new(DocumentContext::new(&DocumentRef::new("W1"), source), 4000)
    }

    #[test]
    fn test_initial_prompt_has_json_only_contract() {
        let fields = vec![FieldDescriptor::new("n", "Sample size", FieldType::Number)];
        let prompt = builder(&structured_source()).build_initial(
            &chunk("body", 0, 1),
            "- \"n\" (Sample size): number\n",
            &fields,
        );

        assert!(prompt.contains("Return ONLY the JSON object"));
        assert!(prompt.contains("no markdown code fences"));
        assert!(prompt.contains("\"citations\""));
        assert!(prompt.contains("\"n\" (Sample size)"));
    }

    #[test]
    fn test_context_order_title_then_abstract() {
        let fields = vec![FieldDescriptor::new("n", "Sample size", FieldType::Number)];
        let prompt = builder(&structured_source()).build_initial(&chunk("body", 0, 1), "", &fields);

        let title = prompt.find("Title: Aspirin after stroke").unwrap();
        let abstract_pos = prompt.find("Abstract:\nWe randomised").unwrap();
        assert!(title < abstract_pos);
    }

    #[test]
    fn test_sections_are_gated_by_field_keys() {
        let source = structured_source();
        let unrelated = vec![FieldDescriptor::new("n", "Sample size", FieldType::Number)];
        let prompt = builder(&source).build_initial(&chunk("body", 0, 1), "", &unrelated);
        assert!(!prompt.contains("Double-blind allocation"));
        assert!(!prompt.contains("Recurrence fell"));

        let gated = vec![
            FieldDescriptor::new("methods", "Methods", FieldType::Text),
            FieldDescriptor::new("primary_outcome", "Primary outcome", FieldType::Text),
        ];
        let prompt = builder(&source).build_initial(&chunk("body", 0, 1), "", &gated);
        let abstract_pos = prompt.find("Abstract:").unwrap();
        let methods_pos = prompt.find("Methods:\nDouble-blind allocation").unwrap();
        let results_pos = prompt.find("Results:\nRecurrence fell").unwrap();
        assert!(abstract_pos < methods_pos && methods_pos < results_pos);
    }

    #[test]
    fn test_fallback_truncates_raw_text() {
        let source = SourceText::plain("x", SourceKind::Web);
        let builder =
            PromptBuilder::new(DocumentContext::new(&DocumentRef::new("W1"), &source), 10);
        let text = format!("{}{}", "a".repeat(10), "Z".repeat(50));
        let prompt = builder.build_initial(&chunk(&text, 0, 1), "", &[]);

        assert!(prompt.contains(&"a".repeat(10)));
        assert!(!prompt.contains('Z'));
        assert!(prompt.contains("Document text (part 1 of 1)"));
    }

    #[test]
    fn test_abstract_only_chunk_is_not_repeated() {
        let source = SourceText::plain("", SourceKind::Repository)
            .with_section("title", "Aspirin after stroke")
            .with_section("abstract", "We randomised 400 patients.");
        let text = "Aspirin after stroke\n\nWe randomised 400 patients.";
        let prompt = builder(&source).build_initial(&chunk(text, 0, 1), "", &[]);

        assert_eq!(prompt.matches("We randomised 400 patients.").count(), 1);
        assert_eq!(prompt.matches("Aspirin after stroke").count(), 1);
        assert!(!prompt.contains("Excerpt"));

        let prompt = builder(&source).build_initial(
            &chunk("We randomised 400 patients.", 0, 1),
            "",
            &[],
        );
        assert_eq!(prompt.matches("We randomised 400 patients.").count(), 1);
    }

    #[test]
    fn test_excerpt_kept_when_chunk_adds_text() {
        let prompt = builder(&structured_source()).build_initial(&chunk("body", 0, 1), "", &[]);
        assert!(prompt.contains("Excerpt (part 1 of 1):\n---\nbody"));
    }

    #[test]
    fn test_reference_title_used_without_sections() {
        let document = DocumentRef::new("W2").with_title("Reference title");
        let source = SourceText::plain("text", SourceKind::Web);
        let prompt = PromptBuilder::new(DocumentContext::new(&document, &source), 100)
            .build_initial(&chunk("text", 0, 1), "", &[]);
        assert!(prompt.contains("Title: Reference title"));
    }

    #[test]
    fn test_update_prompt_embeds_accumulator() {
        let mut accumulator = Accumulator::new();
        accumulator.insert(
            "n".to_string(),
            FieldExtraction::new(json!(400), 0.8, vec![Citation::new("400 patients", "abstract")]),
        );
        let fields = vec![FieldDescriptor::new("n", "Sample size", FieldType::Number)];
        let prompt = builder(&structured_source()).build_update(
            &accumulator,
            &chunk("second part", 1, 3),
            "",
            &fields,
        );

        assert!(prompt.contains("Current results"));
        assert!(prompt.contains("\"400 patients\""));
        assert!(prompt.contains("return that field exactly as it appears"));
        assert!(prompt.contains("Excerpt (part 2 of 3)"));
        assert!(prompt.contains("Return ONLY the JSON object"));
    }

    #[test]
    fn test_truncate_chars_respects_utf8() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}
