use std::collections::HashMap;

/// Fallback used when a submitted MIME type is missing or unknown.
pub const PLAIN_MIME: &str = "text/plain";
pub const PLAIN_SYNTAX: &str = "text";

/// Syntax tag meaning "render as plain, unstyled text".
pub const GENERIC_SYNTAX: &str = "generic";

const BUILTIN: &[(&str, &str)] = &[
    ("text/plain", "text"),
    ("text/generic", "generic"),
    ("text/javascript", "javascript"),
    ("text/x-csrc", "clike"),
    ("text/x-cmake", "cmake"),
    ("text/css", "css"),
    ("text/x-d", "d"),
    ("text/x-diff", "diff"),
    ("text/x-dockerfile", "dockerfile"),
    ("text/x-erlang", "erlang"),
    ("text/x-go", "go"),
    ("text/x-haskell", "haskell"),
    ("text/html", "xml"),
    ("text/x-java", "clike"),
    ("jinja2", "jinja2"),
    ("text/x-kotlin", "clike"),
    ("text/x-lua", "lua"),
    ("text/x-markdown", "markdown"),
    ("text/x-perl", "perl"),
    ("text/x-php", "php"),
    ("text/x-python", "python"),
    ("text/x-rpm-changes", "rpm"),
    ("text/x-rst", "rst"),
    ("text/x-ruby", "ruby"),
    ("text/x-rust", "rust"),
    ("text/x-sh", "shell"),
    ("text/x-sql", "sql"),
    ("text/x-swift", "swift"),
    ("text/x-yaml", "yaml"),
    ("application/xml", "xml"),
];

/// Static lookup from a submitted MIME type to a highlighting syntax tag.
#[derive(Debug, Clone)]
pub struct SyntaxTable {
    entries: HashMap<String, String>,
}

impl Default for SyntaxTable {
    fn default() -> Self {
        Self {
            entries: BUILTIN
                .iter()
                .map(|(mime, syntax)| ((*mime).to_owned(), (*syntax).to_owned()))
                .collect(),
        }
    }
}

impl SyntaxTable {
    /// The built-in table with `overrides` layered on top.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut table = Self::default();
        table.entries.extend(
            overrides
                .iter()
                .map(|(mime, syntax)| (mime.clone(), syntax.clone())),
        );
        table
    }

    pub fn lookup(&self, mime: &str) -> Option<&str> {
        self.entries.get(mime).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookups() {
        let table = SyntaxTable::default();
        assert_eq!(BUILTIN.len(), 30);
        assert_eq!(table.lookup("text/x-python"), Some("python"));
        assert_eq!(table.lookup("text/html"), Some("xml"));
        assert_eq!(table.lookup(PLAIN_MIME), Some(PLAIN_SYNTAX));
        assert_eq!(table.lookup("text/unknown"), None);
        assert_eq!(table.lookup(""), None);
    }

    #[test]
    fn overrides_extend_and_replace() {
        let overrides = HashMap::from([
            ("text/x-toml".to_owned(), "toml".to_owned()),
            ("text/html".to_owned(), "html".to_owned()),
        ]);
        let table = SyntaxTable::with_overrides(&overrides);
        assert_eq!(table.lookup("text/x-rust"), Some("rust"));
        assert_eq!(table.lookup("text/x-toml"), Some("toml"));
        assert_eq!(table.lookup("text/html"), Some("html"));
    }
}
