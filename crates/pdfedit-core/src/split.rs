//! Split tool
//!
//! Produces one output document per page, or one per requested range.
//! Each output is built by deleting every other page from a copy of the
//! source and pruning what is no longer reachable.

use crate::error::EditError;
use lopdf::Document;
use serde::Serialize;
use std::collections::BTreeSet;

/// Inclusive, 1-indexed page range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn single(page: u32) -> Self {
        Self { start: page, end: page }
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    /// `page_5` or `pages_1-3`
    fn label(&self) -> String {
        if self.start == self.end {
            format!("page_{}", self.start)
        } else {
            format!("pages_{}-{}", self.start, self.end)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitMode {
    EveryPage,
    Ranges(Vec<PageRange>),
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitOutput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Parse "1-3, 5" into ranges, keeping the order and grouping as written.
pub fn parse_range_groups(input: &str, page_count: u32) -> Result<Vec<PageRange>, EditError> {
    let mut ranges = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let range = match part.split_once('-') {
            Some((start, end)) => PageRange {
                start: parse_page(start)?,
                end: parse_page(end)?,
            },
            None => PageRange::single(parse_page(part)?),
        };

        if range.start < 1 || range.start > range.end {
            return Err(EditError::InvalidRange(format!("'{}' is not a valid range", part)));
        }
        if range.end > page_count {
            return Err(EditError::InvalidRange(format!(
                "'{}' is past the last page ({})",
                part, page_count
            )));
        }
        ranges.push(range);
    }

    if ranges.is_empty() {
        return Err(EditError::InvalidRange("No pages specified".into()));
    }
    Ok(ranges)
}

/// Flatten a range expression into sorted unique page numbers.
pub fn parse_ranges(input: &str, page_count: u32) -> Result<Vec<u32>, EditError> {
    let pages: BTreeSet<u32> = parse_range_groups(input, page_count)?
        .iter()
        .flat_map(PageRange::pages)
        .collect();
    Ok(pages.into_iter().collect())
}

fn parse_page(text: &str) -> Result<u32, EditError> {
    text.trim()
        .parse()
        .map_err(|_| EditError::InvalidRange(format!("'{}' is not a page number", text.trim())))
}

/// Copy of `doc` holding only `pages` (1-indexed).
pub fn extract_pages(doc: &Document, pages: &[u32]) -> Result<Vec<u8>, EditError> {
    let page_count = doc.get_pages().len() as u32;
    if pages.is_empty() {
        return Err(EditError::InvalidRange("No pages specified".into()));
    }
    if let Some(&bad) = pages.iter().find(|&&p| p == 0 || p > page_count) {
        return Err(EditError::PageOutOfRange { page: bad, page_count });
    }

    let keep: BTreeSet<u32> = pages.iter().copied().collect();
    let drop: Vec<u32> = (1..=page_count).rev().filter(|p| !keep.contains(p)).collect();

    let mut out = doc.clone();
    out.delete_pages(&drop);
    out.prune_objects();
    out.compress();

    let mut buffer = Vec::new();
    out.save_to(&mut buffer)
        .map_err(|e| EditError::Operation(format!("Failed to save split PDF: {}", e)))?;
    Ok(buffer)
}

/// `report.pdf` → `report`
fn base_name(filename: &str) -> &str {
    filename
        .strip_suffix(".pdf")
        .or_else(|| filename.strip_suffix(".PDF"))
        .unwrap_or(filename)
}

pub fn split_document(bytes: &[u8], filename: &str, mode: &SplitMode) -> Result<Vec<SplitOutput>, EditError> {
    let doc = Document::load_mem(bytes).map_err(|e| EditError::DocumentLoad(e.to_string()))?;
    let page_count = doc.get_pages().len() as u32;

    let ranges = match mode {
        SplitMode::EveryPage => (1..=page_count).map(PageRange::single).collect(),
        SplitMode::Ranges(ranges) => ranges.clone(),
    };

    let base = base_name(filename);
    let outputs = ranges
        .iter()
        .map(|range| {
            let pages: Vec<u32> = range.pages().collect();
            Ok(SplitOutput {
                filename: format!("{}_{}.pdf", base, range.label()),
                bytes: extract_pages(&doc, &pages)?,
            })
        })
        .collect::<Result<Vec<_>, EditError>>()?;

    tracing::info!("Split '{}' into {} documents", filename, outputs.len());
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_pdf;
    use pretty_assertions::assert_eq;

    fn page_count(bytes: &[u8]) -> usize {
        Document::load_mem(bytes).unwrap().get_pages().len()
    }

    #[test]
    fn test_parse_range_groups() {
        let groups = parse_range_groups("1-3, 5", 10).unwrap();
        assert_eq!(groups, vec![PageRange { start: 1, end: 3 }, PageRange::single(5)]);
    }

    #[test]
    fn test_parse_range_groups_rejects_bad_input() {
        assert!(parse_range_groups("", 5).is_err());
        assert!(parse_range_groups("0", 5).is_err());
        assert!(parse_range_groups("4-2", 5).is_err());
        assert!(parse_range_groups("3-9", 5).is_err());
        assert!(parse_range_groups("a-b", 5).is_err());
    }

    #[test]
    fn test_parse_ranges_deduplicates() {
        assert_eq!(parse_ranges("1-3, 2-4", 10).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(parse_ranges("1-3, 5, 8-10", 10).unwrap(), vec![1, 2, 3, 5, 8, 9, 10]);
    }

    #[test]
    fn test_extract_pages() {
        let doc = Document::load_mem(&test_pdf::build(5, 612, 792)).unwrap();
        assert_eq!(page_count(&extract_pages(&doc, &[1, 3, 5]).unwrap()), 3);
        assert!(matches!(
            extract_pages(&doc, &[6]),
            Err(EditError::PageOutOfRange { page: 6, page_count: 5 })
        ));
        assert!(extract_pages(&doc, &[]).is_err());
    }

    #[test]
    fn test_split_every_page_names() {
        let outputs = split_document(&test_pdf::build(3, 612, 792), "report.pdf", &SplitMode::EveryPage).unwrap();
        let names: Vec<&str> = outputs.iter().map(|o| o.filename.as_str()).collect();
        assert_eq!(names, vec!["report_page_1.pdf", "report_page_2.pdf", "report_page_3.pdf"]);
        assert!(outputs.iter().all(|o| page_count(&o.bytes) == 1));
    }

    #[test]
    fn test_split_by_ranges() {
        let bytes = test_pdf::build(6, 612, 792);
        let mode = SplitMode::Ranges(parse_range_groups("1-3, 5", 6).unwrap());
        let outputs = split_document(&bytes, "scan.pdf", &mode).unwrap();

        assert_eq!(outputs[0].filename, "scan_pages_1-3.pdf");
        assert_eq!(page_count(&outputs[0].bytes), 3);
        assert_eq!(outputs[1].filename, "scan_page_5.pdf");
        assert_eq!(page_count(&outputs[1].bytes), 1);
    }
}
