// src/fetch/urls.rs

use regex::Regex;
use scraper::{Html, Selector};
use tracing::trace;
use url::Url;

use crate::schema::Period;

/// Substitute `{year}`, `{month}` and `{month_name}` in an endpoint template.
pub fn expand(template: &str, period: Period) -> String {
    template
        .replace("{year}", &format!("{:04}", period.year))
        .replace("{month_name}", period.month_name())
        .replace("{month}", &format!("{:02}", period.month))
}

/// Scan a listing page for `.zip` links and return the first absolute URL matching `pattern`.
pub fn find_zip_link(html: &str, base: &Url, pattern: &Regex) -> Option<String> {
    let selector =
        Selector::parse(r#"a[href$=".zip"]"#).expect("Invalid CSS selector for .zip links");

    Html::parse_document(html)
        .select(&selector)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .map(|u| u.to_string())
        .inspect(|u| trace!(url = %u, "found zip link"))
        .find(|u| pattern.is_match(u))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_all_tokens() {
        let p = Period { year: 2023, month: 3 };
        assert_eq!(
            expand("https://x/{year}/{month}/cpsc-{month_name}-{year}.zip", p),
            "https://x/2023/03/cpsc-march-2023.zip"
        );
    }

    #[test]
    fn picks_matching_link_from_listing() {
        let html = r#"
            <html><body>
              <a href="/files/zip/monthly-enrollment-cpsc-december-2022.zip">Dec</a>
              <a href="/files/zip/monthly-enrollment-cpsc-january-2023.zip">Jan</a>
              <a href="/about">About</a>
            </body></html>"#;
        let base = Url::parse("https://www.cms.gov/data/monthly/").unwrap();
        let pattern = Regex::new("cpsc-january-2023").unwrap();

        assert_eq!(
            find_zip_link(html, &base, &pattern).as_deref(),
            Some("https://www.cms.gov/files/zip/monthly-enrollment-cpsc-january-2023.zip")
        );
        let missing = Regex::new("cpsc-june-2023").unwrap();
        assert!(find_zip_link(html, &base, &missing).is_none());
    }
}
