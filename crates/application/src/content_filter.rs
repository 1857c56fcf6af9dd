//! 违禁内容检查
//!
//! 词表由外部协作方维护、经配置注入。匹配不区分大小写，
//! 命中任意词条即标记消息并升级到审核协调器。

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    terms: Vec<String>,
}

impl ContentFilter {
    pub fn new(terms: Vec<String>) -> Self {
        let terms = terms
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    /// 返回命中的第一个词条
    pub fn first_match(&self, content: &str) -> Option<&str> {
        let lowered = content.to_lowercase();
        self.terms
            .iter()
            .find(|term| lowered.contains(term.as_str()))
            .map(|term| term.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> ContentFilter {
        ContentFilter::new(vec![
            "contact info".to_string(),
            "WhatsApp".to_string(),
            "  ".to_string(),
        ])
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let filter = filter();
        assert_eq!(
            filter.first_match("free CONTACT INFO: a@b.c"),
            Some("contact info")
        );
        assert_eq!(filter.first_match("ping me on whatsapp"), Some("whatsapp"));
    }

    #[test]
    fn test_clean_content_passes() {
        let filter = filter();
        assert_eq!(filter.first_match("is the bike still available?"), None);
    }

    #[test]
    fn test_blank_terms_are_dropped() {
        let filter = ContentFilter::new(vec!["  ".to_string(), String::new()]);
        assert!(filter.is_empty());
        assert_eq!(filter.first_match("anything"), None);
    }
}
