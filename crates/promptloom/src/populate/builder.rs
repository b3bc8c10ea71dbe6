//! Paragraph and document builders used by the populator.
//!
//! [`ParagraphBuilder`] keeps generated prose apart from protected text
//! (verbatim spans, the must-include literal, the persona introduction) so
//! only generated prose is rewritten when the paragraph is built.
//! [`DocumentBuilder`] joins built paragraphs with blank lines.

/// One piece of a paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Prose produced from catalog data or explanations; may be rewritten.
    Generated(String),
    /// Text inserted exactly as given.
    Protected(String),
}

/// Builder for a single paragraph.
///
/// Segments are joined with single spaces. Empty segments are skipped.
///
/// # Example
///
/// ```
/// use promptloom::populate::builder::ParagraphBuilder;
///
/// let paragraph = ParagraphBuilder::new()
///     .generated("Be brief.")
///     .protected("Never guess.")
///     .generated_opt(None::<String>)
///     .build(|text| text.to_uppercase());
///
/// assert_eq!(paragraph, "BE BRIEF. Never guess.");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParagraphBuilder {
    segments: Vec<Segment>,
}

impl ParagraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append generated prose. Skipped if empty.
    pub fn generated(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.segments.push(Segment::Generated(text));
        }
        self
    }

    /// Append generated prose only if the content is `Some`.
    pub fn generated_opt(self, text: Option<impl Into<String>>) -> Self {
        match text {
            Some(t) => self.generated(t),
            None => self,
        }
    }

    /// Append protected text. Skipped if empty.
    pub fn protected(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.segments.push(Segment::Protected(text));
        }
        self
    }

    /// Insert protected text ahead of everything else. Skipped if empty.
    pub fn protected_first(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.segments.insert(0, Segment::Protected(text));
        }
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Rewrite generated segments with `rewrite` and join everything.
    pub fn build(self, rewrite: impl Fn(&str) -> String) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Generated(t) => rewrite(t),
                Segment::Protected(t) => t.trim().to_string(),
            })
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Builder for the whole document. Paragraphs are joined with blank lines.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    paragraphs: Vec<String>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a built paragraph. Skipped if empty.
    pub fn paragraph(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.paragraphs.push(text);
        }
        self
    }

    pub fn build(self) -> String {
        self.paragraphs.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(text: &str) -> String {
        text.to_string()
    }

    #[test]
    fn segments_join_with_spaces() {
        let paragraph = ParagraphBuilder::new()
            .generated("One.")
            .protected("Two.")
            .generated("Three.")
            .build(identity);
        assert_eq!(paragraph, "One. Two. Three.");
    }

    #[test]
    fn empty_segments_skipped() {
        let builder = ParagraphBuilder::new()
            .generated("")
            .protected("   ")
            .generated_opt(None::<String>);
        assert!(builder.segments().is_empty());
        assert_eq!(builder.build(identity), "");
    }

    #[test]
    fn only_generated_text_is_rewritten() {
        let paragraph = ParagraphBuilder::new()
            .generated("use grep")
            .protected("grep stays")
            .build(|t| t.replace("grep", "a tool"));
        assert_eq!(paragraph, "use a tool grep stays");
    }

    #[test]
    fn protected_first_leads_the_paragraph() {
        let paragraph = ParagraphBuilder::new()
            .generated("Body.")
            .protected_first("Intro.")
            .build(identity);
        assert_eq!(paragraph, "Intro. Body.");
    }

    #[test]
    fn rewrite_that_empties_a_segment_drops_it() {
        let paragraph = ParagraphBuilder::new()
            .generated("drop me")
            .protected("Keep.")
            .build(|_| String::new());
        assert_eq!(paragraph, "Keep.");
    }

    #[test]
    fn document_paragraphs_separated_by_blank_lines() {
        let doc = DocumentBuilder::new()
            .paragraph("First.")
            .paragraph("")
            .paragraph("Second.")
            .build();
        assert_eq!(doc, "First.\n\nSecond.");
    }
}
