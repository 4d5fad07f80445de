use std::fmt::Write;

use crate::pagination::PageToken;

#[derive(Clone, Debug, Default)]
pub struct ListingPage {
    pub title: String,
    pub base_url: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub current_page: i64,
    pub page_tokens: Vec<PageToken>,
    pub empty_label: String,
}

pub fn render_listing(page: &ListingPage) -> String {
    let mut html = String::new();
    writeln!(
        html,
        "<section class=\"listing\"><h2>{}</h2><table class=\"admin_table\"><thead><tr>",
        page.title
    )
    .ok();
    for column in &page.columns {
        writeln!(html, "<th>{}</th>", column).ok();
    }
    html.push_str("</tr></thead><tbody>");

    if page.rows.is_empty() {
        writeln!(
            html,
            "<tr class=\"empty\"><td colspan=\"{}\">{}</td></tr>",
            page.columns.len().max(1),
            page.empty_label
        )
        .ok();
    } else {
        for row in &page.rows {
            html.push_str("<tr>");
            for cell in row {
                writeln!(html, "<td>{}</td>", cell).ok();
            }
            html.push_str("</tr>");
        }
    }

    html.push_str("</tbody></table>");
    html.push_str(&render_pagination(
        &page.page_tokens,
        page.current_page,
        &page.base_url,
    ));
    html.push_str("</section>");
    html
}

/// The page strip under every listing. The current page is not a link and
/// the ellipsis is inert text.
pub fn render_pagination(tokens: &[PageToken], current_page: i64, base_url: &str) -> String {
    if tokens.is_empty() {
        return String::new();
    }
    let mut html = String::from("<nav class=\"pagination\">");
    for token in tokens {
        match token.page() {
            Some(number) if number == current_page => {
                writeln!(html, "<strong class=\"current\">{}</strong>", number).ok();
            }
            Some(number) => {
                writeln!(
                    html,
                    "<a href=\"{};page={}\">{}</a>",
                    base_url, number, number
                )
                .ok();
            }
            None => html.push_str("<span class=\"ellipsis\">&hellip;</span>"),
        }
    }
    html.push_str("</nav>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::page_tokens;

    #[test]
    fn renders_rows_and_strip() {
        let page = ListingPage {
            title: "Gifts".into(),
            base_url: "/admin?area=gifts".into(),
            columns: vec!["Name".into(), "Stock".into()],
            rows: vec![vec!["Cinema ticket".into(), "5".into()]],
            current_page: 1,
            page_tokens: page_tokens(1, 3),
            empty_label: "Nothing here yet".into(),
        };
        let html = render_listing(&page);
        assert!(html.contains("Cinema ticket"));
        assert!(html.contains("<strong class=\"current\">1</strong>"));
        assert!(html.contains("page=3"));
    }

    #[test]
    fn empty_listing_shows_placeholder() {
        let page = ListingPage {
            title: "Gifts".into(),
            columns: vec!["Name".into()],
            empty_label: "Nothing here yet".into(),
            ..ListingPage::default()
        };
        let html = render_listing(&page);
        assert!(html.contains("Nothing here yet"));
        assert!(!html.contains("<nav"));
    }

    #[test]
    fn ellipsis_is_not_a_link() {
        let html = render_pagination(&page_tokens(10, 20), 10, "/admin?area=tasks");
        assert!(html.contains("<span class=\"ellipsis\">"));
        assert!(html.contains("<a href=\"/admin?area=tasks;page=20\">20</a>"));
        assert!(!html.contains("page=12"));
    }
}
