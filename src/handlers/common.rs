use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// Page selector shared by the listing endpoints. Pages are 1-based.
#[derive(Debug, Default, Clone, Deserialize, Serialize, IntoParams)]
pub struct PageQuery {
    /// Page number (default: 1)
    #[param(value_type = Option<u64>)]
    pub page: Option<String>,
}

impl PageQuery {
    /// Missing, zero or unparsable pages read as the first page.
    pub fn page(&self) -> u64 {
        self.page
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(1)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_of(raw: &str) -> u64 {
        PageQuery {
            page: Some(raw.to_string()),
        }
        .page()
    }

    #[test]
    fn page_defaults_and_clamps_to_one() {
        assert_eq!(PageQuery::default().page(), 1);
        assert_eq!(page_of("0"), 1);
        assert_eq!(page_of("3"), 3);
        assert_eq!(page_of(" 4 "), 4);
    }

    #[test]
    fn unparsable_pages_read_as_first_page() {
        assert_eq!(page_of("abc"), 1);
        assert_eq!(page_of("-1"), 1);
        assert_eq!(page_of("2.5"), 1);
    }
}
