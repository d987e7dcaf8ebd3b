//! Path templates.
//!
//! Configured paths may contain placeholders of the form `_[A-Z]+_`, for
//! example `/proj/delivery/_PROJECTID_`. Each placeholder is replaced by the
//! value registered under its lowercase name (`projectid`).

use std::collections::HashMap;
use std::path::PathBuf;

use super::error::{ConfigResult, ConfigurationError};

/// Values available to path templates
#[derive(Debug, Clone, Default)]
pub struct PathContext {
    values: HashMap<String, String>,
}

impl PathContext {
    pub fn for_project(project_id: &str) -> Self {
        Self::default().with("projectid", project_id)
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_lowercase(), value.into());
        self
    }

    /// Expand every placeholder in `template`
    pub fn expand(&self, template: &str) -> ConfigResult<PathBuf> {
        let mut expanded = String::with_capacity(template.len());
        let mut rest = template;

        while let Some((start, end)) = find_placeholder(rest) {
            let placeholder = &rest[start..end];
            let key = placeholder.trim_matches('_').to_lowercase();
            let value = self.values.get(&key).ok_or_else(|| {
                ConfigurationError::UnknownPlaceholder {
                    template: template.to_string(),
                    placeholder: placeholder.to_string(),
                }
            })?;
            expanded.push_str(&rest[..start]);
            expanded.push_str(value);
            rest = &rest[end..];
        }
        expanded.push_str(rest);

        Ok(PathBuf::from(expanded))
    }
}

/// Locate the first `_[A-Z]+_` in `s`, returning its byte range
fn find_placeholder(s: &str) -> Option<(usize, usize)> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_uppercase() {
                j += 1;
            }
            if j > i + 1 && j < bytes.len() && bytes[j] == b'_' {
                return Some((i, j + 1));
            }
        }
        i += 1;
    }
    None
}
