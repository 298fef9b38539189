//! Paging envelope of a list response.

use crate::query::Paging;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PAGE_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"([?&])page=[^&#]*").unwrap());

/// Page position of a list response.
///
/// `total` and `page_count` are only present when the total was requested;
/// links are only present when the request URL is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GistPager {
    pub page: u64,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
}

impl GistPager {
    /// Pager for a fetched page of `rows` rows.
    pub fn new(paging: &Paging, rows: usize, total: Option<u64>, request_url: Option<&str>) -> Self {
        let page = paging.page_number();
        let size = paging.size.max(1);
        let page_count = total.map(|total| total.div_ceil(u64::from(size)).max(1));
        let has_next = match page_count {
            Some(count) => page < count,
            None => rows >= size as usize,
        };
        let link = |target: u64| request_url.map(|url| with_page(url, target));
        Self {
            page,
            page_size: size,
            total,
            page_count,
            prev_page: if page > 1 { link(page - 1) } else { None },
            next_page: if has_next { link(page + 1) } else { None },
        }
    }

    /// Total implied by the fetched page alone: a non-empty page that is not
    /// full must be the last one.
    pub fn inferred_total(paging: &Paging, rows: usize) -> Option<u64> {
        (rows > 0 && rows < paging.size as usize).then(|| paging.offset + rows as u64)
    }
}

/// `url` with its `page` parameter set to `page`
pub fn with_page(url: &str, page: u64) -> String {
    if PAGE_PARAM.is_match(url) {
        return PAGE_PARAM
            .replace(url, |caps: &regex::Captures<'_>| format!("{}page={}", &caps[1], page))
            .into_owned();
    }
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut linked = format!("{}{}page={}", base, separator, page);
    if let Some(fragment) = fragment {
        linked.push('#');
        linked.push_str(fragment);
    }
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("/api/widgets/gist", 3, "/api/widgets/gist?page=3")]
    #[test_case("/api/widgets/gist?pageSize=5", 2, "/api/widgets/gist?pageSize=5&page=2")]
    #[test_case("/api/widgets/gist?page=4&pageSize=5", 5, "/api/widgets/gist?page=5&pageSize=5")]
    #[test_case("/api/widgets/gist?pageSize=5&page=4", 3, "/api/widgets/gist?pageSize=5&page=3")]
    #[test_case("/api/widgets/gist?pageSize=5#top", 2, "/api/widgets/gist?pageSize=5&page=2#top")]
    #[test_case("/api/widgets/gist?subpage=1", 2, "/api/widgets/gist?subpage=1&page=2")]
    fn test_with_page(url: &str, page: u64, expected: &str) {
        assert_eq!(with_page(url, page), expected);
    }

    #[test]
    fn test_full_first_page_without_total() {
        let pager = GistPager::new(&Paging::new(0, 2), 2, None, Some("/api/widgets/gist?pageSize=2"));
        assert_eq!(pager.page, 1);
        assert_eq!(pager.page_size, 2);
        assert_eq!(pager.total, None);
        assert_eq!(pager.prev_page, None);
        assert_eq!(
            pager.next_page.as_deref(),
            Some("/api/widgets/gist?pageSize=2&page=2")
        );
    }

    #[test]
    fn test_last_page_with_total() {
        let pager = GistPager::new(&Paging::new(4, 2), 1, Some(5), Some("/api/widgets/gist?page=3&pageSize=2"));
        assert_eq!(pager.page, 3);
        assert_eq!(pager.page_count, Some(3));
        assert_eq!(pager.next_page, None);
        assert_eq!(
            pager.prev_page.as_deref(),
            Some("/api/widgets/gist?page=2&pageSize=2")
        );
    }

    #[test]
    fn test_serialization_omits_unknowns() {
        let pager = GistPager::new(&Paging::new(0, 50), 3, None, None);
        assert_eq!(
            serde_json::to_value(&pager).unwrap(),
            json!({"page": 1, "pageSize": 50})
        );
    }

    #[test]
    fn test_empty_total_has_one_page() {
        let pager = GistPager::new(&Paging::new(0, 10), 0, Some(0), None);
        assert_eq!(pager.page_count, Some(1));
        assert_eq!(pager.next_page, None);
    }

    #[test_case(0, 10, 3, Some(3))]
    #[test_case(20, 10, 4, Some(24))]
    #[test_case(0, 10, 10, None)]
    #[test_case(30, 10, 0, None)]
    fn test_inferred_total(offset: u64, size: u32, rows: usize, expected: Option<u64>) {
        assert_eq!(GistPager::inferred_total(&Paging::new(offset, size), rows), expected);
    }
}
