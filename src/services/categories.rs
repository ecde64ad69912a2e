//! Category keyword groups used by the event listing filter.
//!
//! A category name expands to a set of keywords that are matched as
//! substrings against title and description. The built-in groups can be
//! replaced by a JSON file (`{"tech": ["tech", "ai"], ...}`).

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

lazy_static::lazy_static! {
    static ref DEFAULT_GROUPS: HashMap<String, Vec<String>> = {
        let groups: [(&str, &[&str]); 6] = [
            ("startup", &[
                "startup", "founder", "entrepreneur", "venture", "pitch", "funding",
                "incubator", "accelerator", "innovation",
            ]),
            ("business", &[
                "business", "networking", "marketing", "sales", "finance", "leadership",
                "management", "corporate", "career", "resume", "job", "interview",
                "workshop", "money", "income", "profit", "ecommerce", "trade", "expo",
                "exhibition", "organization", "team", "strategy", "communication",
            ]),
            ("tech", &[
                "tech", "software", "developer", "ai", "data", "code", "programming",
                "cloud", "security", "web", "digital", "cyber", "electronics", "engineering",
            ]),
            ("music", &["music", "concert", "live", "dj", "band", "festival", "performance"]),
            ("sports", &[
                "sport", "cricket", "football", "run", "marathon", "yoga", "fitness", "badminton",
            ]),
            ("arts", &["art", "design", "creative", "gallery", "painting"]),
        ];
        groups
            .iter()
            .map(|(name, kws)| (name.to_string(), kws.iter().map(|k| k.to_string()).collect()))
            .collect()
    };
}

#[derive(Debug, Clone)]
pub struct CategoryKeywords {
    groups: HashMap<String, Vec<String>>,
}

impl Default for CategoryKeywords {
    fn default() -> Self {
        Self {
            groups: DEFAULT_GROUPS.clone(),
        }
    }
}

impl CategoryKeywords {
    pub fn from_groups(groups: HashMap<String, Vec<String>>) -> Self {
        let groups = groups
            .into_iter()
            .map(|(name, kws)| {
                let kws = kws
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (name.trim().to_lowercase(), kws)
            })
            .collect();
        Self { groups }
    }

    /// Load groups from a JSON file, replacing the built-in table.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading category keywords from {}", path.display()))?;
        let groups: HashMap<String, Vec<String>> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing category keywords in {}", path.display()))?;
        Ok(Self::from_groups(groups))
    }

    /// Keywords for `category`. Unknown categories match on their own name;
    /// blank input and "all" disable the filter.
    pub fn expand(&self, category: &str) -> Option<Vec<String>> {
        let key = category.trim().to_lowercase();
        if key.is_empty() || key == "all" {
            return None;
        }
        match self.groups.get(&key) {
            Some(kws) if !kws.is_empty() => Some(kws.clone()),
            _ => Some(vec![key]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_category_expands_to_group() {
        let kws = CategoryKeywords::default().expand("Tech").unwrap();
        assert!(kws.contains(&"ai".to_string()));
        assert!(kws.contains(&"software".to_string()));
    }

    #[test]
    fn unknown_category_matches_itself() {
        let kws = CategoryKeywords::default().expand("Food").unwrap();
        assert_eq!(kws, vec!["food".to_string()]);
    }

    #[test]
    fn all_and_blank_disable_filter() {
        let c = CategoryKeywords::default();
        assert!(c.expand("all").is_none());
        assert!(c.expand("  ").is_none());
    }

    #[test]
    fn custom_groups_replace_defaults() {
        let mut groups = HashMap::new();
        groups.insert("Food".to_string(), vec![" Cooking ".to_string(), "chef".to_string()]);
        let c = CategoryKeywords::from_groups(groups);
        assert_eq!(
            c.expand("food").unwrap(),
            vec!["cooking".to_string(), "chef".to_string()]
        );
        assert_eq!(c.expand("tech").unwrap(), vec!["tech".to_string()]);
    }
}
