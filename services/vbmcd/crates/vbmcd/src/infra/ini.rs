//! Minimal INI-style document: `[section]` headers and `key = value` lines.
//!
//! Values are single-line and stored trimmed. Lines starting with `#` or `;`
//! are comments. Section and key order is preserved on render.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IniError {
    #[error("line {line}: entry outside of any section")]
    NoSection { line: usize },
    #[error("line {line}: expected 'key = value'")]
    MissingSeparator { line: usize },
    #[error("line {line}: unterminated section header")]
    BadHeader { line: usize },
}

/// One named section with its entries in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace `key`.
    pub fn set(&mut self, key: &str, value: &str) {
        let value = value.trim().to_string();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ini {
    sections: Vec<Section>,
}

impl Ini {
    pub fn parse(text: &str) -> Result<Self, IniError> {
        let mut ini = Self::default();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .ok_or(IniError::BadHeader { line })?
                    .trim();
                ini.section_mut(name);
                continue;
            }
            let (key, value) = trimmed
                .split_once('=')
                .ok_or(IniError::MissingSeparator { line })?;
            let section = ini
                .sections
                .last_mut()
                .ok_or(IniError::NoSection { line })?;
            section.set(key.trim(), value);
        }
        Ok(ini)
    }

    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Get or append the section called `name`.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (key, value) in &section.entries {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }
}
