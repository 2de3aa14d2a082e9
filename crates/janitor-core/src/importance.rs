//! Policy deciding which documents justify a (billed) remote vision call.

use serde::Deserialize;

/// What an importance policy may look at.
#[derive(Debug, Clone)]
pub struct DocumentInfo<'a> {
    pub file_name: &'a str,
    pub size_bytes: u64,
    pub page_count: u32,
}

/// Judges whether a document is important enough for the remote engine.
///
/// The selector only asks this after OCR has been deemed necessary and the
/// remote engine is enabled.
pub trait ImportancePolicy: Send + Sync {
    fn is_important(&self, doc: &DocumentInfo<'_>) -> bool;
}

/// Keyword + size + page-count policy.
///
/// A document is important when its file name contains one of the keywords
/// (case-insensitive), its size is within `[min_size_kb, max_size_kb]` and it
/// has at most `max_pages` pages.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordImportance {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_min_size_kb")]
    pub min_size_kb: u64,
    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_keywords() -> Vec<String> {
    [
        "invoice",
        "发票",
        "contract",
        "合同",
        "report",
        "报告",
        "statement",
        "对账单",
        "协议",
        "agreement",
        "证明",
        "certificate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_min_size_kb() -> u64 {
    100
}
fn default_max_size_kb() -> u64 {
    10_000
}
fn default_max_pages() -> u32 {
    5
}

impl Default for KeywordImportance {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            min_size_kb: default_min_size_kb(),
            max_size_kb: default_max_size_kb(),
            max_pages: default_max_pages(),
        }
    }
}

impl ImportancePolicy for KeywordImportance {
    fn is_important(&self, doc: &DocumentInfo<'_>) -> bool {
        let name = doc.file_name.to_lowercase();
        let keyword_hit = self
            .keywords
            .iter()
            .any(|kw| name.contains(&kw.to_lowercase()));
        let size_ok = (self.min_size_kb.saturating_mul(1024)..=self.max_size_kb.saturating_mul(1024))
            .contains(&doc.size_bytes);
        let pages_ok = doc.page_count <= self.max_pages;

        let important = keyword_hit && size_ok && pages_ok;
        if important {
            tracing::debug!(
                file = doc.file_name,
                size_bytes = doc.size_bytes,
                pages = doc.page_count,
                "document marked important"
            );
        }
        important
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, kb: u64, pages: u32) -> DocumentInfo<'_> {
        DocumentInfo {
            file_name: name,
            size_bytes: kb * 1024,
            page_count: pages,
        }
    }

    #[test]
    fn keyword_size_and_pages_all_required() {
        let p = KeywordImportance::default();
        assert!(p.is_important(&doc("ACME_Invoice_2024.pdf", 500, 2)));
        assert!(p.is_important(&doc("供应商发票.pdf", 500, 5)));
        assert!(!p.is_important(&doc("holiday.pdf", 500, 2)));
        assert!(!p.is_important(&doc("invoice.pdf", 50, 2)));
        assert!(!p.is_important(&doc("invoice.pdf", 20_000, 2)));
        assert!(!p.is_important(&doc("invoice.pdf", 500, 6)));
    }

    #[test]
    fn size_bounds_are_inclusive() {
        let p = KeywordImportance::default();
        assert!(p.is_important(&doc("contract.pdf", 100, 1)));
        assert!(p.is_important(&doc("contract.pdf", 10_000, 1)));
    }

    #[test]
    fn partial_kilobytes_count_against_the_upper_bound() {
        let p = KeywordImportance::default();
        let just_over = DocumentInfo {
            file_name: "contract.pdf",
            size_bytes: 10_000 * 1024 + 900,
            page_count: 1,
        };
        assert!(!p.is_important(&just_over));
        let just_under = DocumentInfo {
            file_name: "contract.pdf",
            size_bytes: 100 * 1024 - 1,
            page_count: 1,
        };
        assert!(!p.is_important(&just_under));
    }

    #[test]
    fn custom_keywords_replace_defaults() {
        let p = KeywordImportance {
            keywords: vec!["Receipt".to_string()],
            ..KeywordImportance::default()
        };
        assert!(p.is_important(&doc("receipt-0001.png", 300, 1)));
        assert!(!p.is_important(&doc("invoice.pdf", 300, 1)));
    }
}
