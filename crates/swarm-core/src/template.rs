//! `{{token}}` substitution for job and proxy templates.
//!
//! Substitution is literal text replacement. Tokens nobody supplied a
//! value for stay in the output verbatim; callers can list them with
//! [`Template::unresolved`] and decide what to do.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Template text with `{{name}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        std::fs::read_to_string(path).map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Replace `{{name}}` with `value` everywhere.
    pub fn set(mut self, name: &str, value: impl AsRef<str>) -> Self {
        let token = format!("{{{{{name}}}}}");
        self.text = self.text.replace(&token, value.as_ref());
        self
    }

    /// Apply several substitutions in order.
    pub fn render<'a, I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: AsRef<str>,
    {
        values
            .into_iter()
            .fold(self, |tpl, (name, value)| tpl.set(name, value))
    }

    /// Distinct placeholder names still present in the text.
    pub fn unresolved(&self) -> BTreeSet<String> {
        PLACEHOLDER
            .captures_iter(&self.text)
            .map(|c| c[1].to_string())
            .collect()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
