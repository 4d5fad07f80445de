//! Page math and the sliding-window page selector shared by every list screen.

use serde::{Serialize, Serializer};

/// One unit of pagination-control output: a selectable page number or the
/// inert ellipsis marker shown between non-adjacent pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageToken {
    Page(i64),
    Ellipsis,
}

impl PageToken {
    pub fn page(&self) -> Option<i64> {
        match self {
            PageToken::Page(number) => Some(*number),
            PageToken::Ellipsis => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            PageToken::Page(number) => number.to_string(),
            PageToken::Ellipsis => "...".into(),
        }
    }
}

impl Serialize for PageToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PageToken::Page(number) => serializer.serialize_i64(*number),
            PageToken::Ellipsis => serializer.serialize_str("..."),
        }
    }
}

/// Builds the page-selector tokens for a list view.
///
/// Up to seven pages fit the control outright; past that a window of at most
/// seven tokens is kept around `current_page`, anchored on the first and last
/// page with ellipses over the gaps. Total over all integer input: page counts
/// of zero or less yield an empty vector, and an out-of-range `current_page`
/// falls into whichever window its value selects (callers get an in-range
/// page from the service layer, which clamps).
pub fn page_tokens(current_page: i64, page_count: i64) -> Vec<PageToken> {
    if page_count <= 0 {
        return Vec::new();
    }
    if page_count <= 7 {
        return (1..=page_count).map(PageToken::Page).collect();
    }

    let mut tokens = Vec::with_capacity(7);
    if current_page <= 4 {
        tokens.extend((1..=5).map(PageToken::Page));
        tokens.push(PageToken::Ellipsis);
        tokens.push(PageToken::Page(page_count));
    } else if current_page >= page_count - 3 {
        tokens.push(PageToken::Page(1));
        tokens.push(PageToken::Ellipsis);
        tokens.extend((page_count - 4..=page_count).map(PageToken::Page));
    } else {
        tokens.push(PageToken::Page(1));
        tokens.push(PageToken::Ellipsis);
        tokens.extend((current_page - 1..=current_page + 1).map(PageToken::Page));
        tokens.push(PageToken::Ellipsis);
        tokens.push(PageToken::Page(page_count));
    }
    tokens
}

/// Number of pages needed for `count` items at `page_size` per page.
pub fn total_pages(count: i64, page_size: i64) -> i64 {
    if count <= 0 {
        return 0;
    }
    // Signed div_ceil is unstable; both operands are positive here, so the
    // unsigned equivalent rounds identically.
    (count as u64).div_ceil(page_size.max(1) as u64) as i64
}

/// Clamps a requested 1-based page into `[1, page_count]`, treating an empty
/// result set as a single page.
pub fn clamp_page(page: i64, page_count: i64) -> i64 {
    page.clamp(1, page_count.max(1))
}
