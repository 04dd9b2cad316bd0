use std::collections::HashMap;

#[derive(PartialEq, Debug)]
pub struct QueryString {
    items: HashMap<String, String>,
}

impl QueryString {
    pub fn from(buf: &str) -> Self {
        let vs: Vec<(String, String)> = serde_urlencoded::from_str(buf).unwrap_or_else(|_| vec![]);
        let items: HashMap<String, String> = vs.into_iter().collect();

        QueryString {
            items,
        }
    }

    /// Trimmed `search` term, `None` when missing or blank.
    pub fn get_search(&self) -> Option<&str> {
        self.items.get("search")
            .map(|term| term.trim())
            .filter(|term| !term.is_empty())
    }
}
