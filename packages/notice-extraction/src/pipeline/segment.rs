//! Section segmentation for long gazette bodies.
//!
//! Headings are located in vocabulary order with a monotonic cursor, so an
//! earlier occurrence is never matched twice. A candidate heading must start
//! its line and must not look like a contents-page entry.

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::types::config::{SectionSpec, SectionVocabulary};
use crate::types::section::Section;

/// Section name used when only the bounding region was located.
pub const REGION_SECTION: &str = "Bounded Region";

/// Section name used when neither sections nor a region were located.
pub const WHOLE_DOCUMENT_SECTION: &str = "Whole Document";

/// How far back (bytes) a `CONTENTS` marker marks a heading as an index entry.
pub const CONTENTS_WINDOW: usize = 200;

const CONTENTS_MARKER: &str = "CONTENTS";

lazy_static! {
    static ref DOT_LEADER: Regex = Regex::new(r"\.{3,}|…").unwrap();
    static ref PAGE_REFERENCE: Regex = Regex::new(r"(?i)\b(?:pg|page|p)\.?\s*\d+\s*$").unwrap();
    static ref NONE_TRAILER: Regex = Regex::new(r"(?i)\bnone\s*$").unwrap();
}

struct CompiledSpec {
    name: String,
    patterns: Vec<Regex>,
}

impl CompiledSpec {
    fn compile(spec: &SectionSpec) -> Result<Self> {
        let patterns = spec
            .patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            name: spec.name.clone(),
            patterns,
        })
    }

    /// First accepted heading starting at or after `from`.
    fn find(&self, text: &str, from: usize) -> Option<Range<usize>> {
        self.patterns
            .iter()
            .filter_map(|pattern| {
                pattern
                    .find_iter(text)
                    .filter(|m| m.start() >= from)
                    .find(|m| is_heading(text, m.start(), m.end()))
                    .map(|m| m.range())
            })
            .min_by_key(|range| range.start)
    }

    /// Every accepted heading in the text.
    fn find_all(&self, text: &str) -> Vec<usize> {
        self.patterns
            .iter()
            .flat_map(|pattern| pattern.find_iter(text))
            .filter(|m| is_heading(text, m.start(), m.end()))
            .map(|m| m.start())
            .collect()
    }
}

/// Finds vocabulary sections in flat document text.
pub struct Segmenter {
    targets: Vec<CompiledSpec>,
    stops: Vec<CompiledSpec>,
    region: Option<(Regex, Regex)>,
}

impl Segmenter {
    /// Compile a vocabulary. Fails if any pattern does not compile.
    pub fn new(vocabulary: &SectionVocabulary) -> Result<Self> {
        let targets = vocabulary
            .targets
            .iter()
            .map(CompiledSpec::compile)
            .collect::<Result<Vec<_>>>()?;
        let stops = vocabulary
            .stops
            .iter()
            .map(CompiledSpec::compile)
            .collect::<Result<Vec<_>>>()?;
        let region = match &vocabulary.bounding_region {
            Some(bounds) => Some((Regex::new(&bounds.start)?, Regex::new(&bounds.end)?)),
            None => None,
        };
        Ok(Self {
            targets,
            stops,
            region,
        })
    }

    /// Segment `text` into vocabulary sections, sorted by start offset.
    ///
    /// Targets absent from the text are omitted; zero matches yields an
    /// empty list.
    pub fn segment(&self, text: &str) -> Vec<Section> {
        let mut headings: Vec<(&str, usize)> = Vec::new();
        let mut cursor = 0;

        for spec in &self.targets {
            match spec.find(text, cursor) {
                Some(range) => {
                    headings.push((spec.name.as_str(), range.start));
                    cursor = range.end;
                }
                None => debug!(section = %spec.name, "section heading not found"),
            }
        }

        let mut stops: Vec<usize> = self.stops.iter().flat_map(|s| s.find_all(text)).collect();
        stops.sort_unstable();

        let mut sections: Vec<Section> = headings
            .iter()
            .map(|&(name, start)| {
                let next_target = headings
                    .iter()
                    .map(|&(_, s)| s)
                    .filter(|&s| s > start)
                    .min()
                    .unwrap_or(text.len());
                let next_stop = stops
                    .iter()
                    .copied()
                    .find(|&s| s > start)
                    .unwrap_or(text.len());
                Section::from_span(name, text, start, next_target.min(next_stop))
            })
            .collect();

        sections.sort_by_key(|s| s.start);
        sections
    }

    /// Names of targets the segmentation did not find.
    pub fn missing_targets<'a>(&'a self, sections: &[Section]) -> Vec<&'a str> {
        self.targets
            .iter()
            .map(|t| t.name.as_str())
            .filter(|name| !sections.iter().any(|s| s.name == *name))
            .collect()
    }

    /// Span from the region start heading to the region end heading (or the
    /// end of the text when no end heading follows).
    pub fn bounding_region(&self, text: &str) -> Option<Range<usize>> {
        let (start_re, end_re) = self.region.as_ref()?;
        let start = start_re
            .find_iter(text)
            .find(|m| is_heading(text, m.start(), m.end()))?
            .start();
        let end = end_re
            .find_iter(text)
            .filter(|m| m.start() > start)
            .find(|m| is_heading(text, m.start(), m.end()))
            .map(|m| m.start())
            .unwrap_or(text.len());
        Some(start..end)
    }

    /// Vocabulary sections, or a single fallback section covering the
    /// bounding region (or the whole text) when none are found.
    pub fn region_of_interest(&self, text: &str) -> Vec<Section> {
        let sections = self.segment(text);
        if !sections.is_empty() {
            return sections;
        }
        match self.bounding_region(text) {
            Some(range) => vec![Section::from_span(REGION_SECTION, text, range.start, range.end)],
            None if text.trim().is_empty() => Vec::new(),
            None => vec![Section::from_span(WHOLE_DOCUMENT_SECTION, text, 0, text.len())],
        }
    }
}

/// Segment `text` with a vocabulary in one call.
pub fn segment(text: &str, vocabulary: &SectionVocabulary) -> Result<Vec<Section>> {
    Ok(Segmenter::new(vocabulary)?.segment(text))
}

fn is_heading(text: &str, start: usize, end: usize) -> bool {
    starts_line(text, start) && !is_contents_reference(text, start, end)
}

/// Only whitespace precedes `start` on its line.
fn starts_line(text: &str, start: usize) -> bool {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    text[line_start..start].trim().is_empty()
}

/// Any one signal marks the match as an index entry: a nearby `CONTENTS`
/// marker, dot leaders or a page number after it, or a trailing `None`.
fn is_contents_reference(text: &str, start: usize, end: usize) -> bool {
    let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
    let trailer = &text[end..line_end];

    if DOT_LEADER.is_match(trailer)
        || PAGE_REFERENCE.is_match(trailer)
        || NONE_TRAILER.is_match(trailer)
    {
        return true;
    }

    let mut window_start = start.saturating_sub(CONTENTS_WINDOW);
    while !text.is_char_boundary(window_start) {
        window_start -= 1;
    }
    text[window_start..start].contains(CONTENTS_MARKER)
}
