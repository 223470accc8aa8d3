use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::LibraryError;

/// One declared keyword argument, optionally with a default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub default: Option<&'static str>,
}

impl ArgSpec {
    pub const fn required(name: &'static str) -> Self {
        Self { name, default: None }
    }

    pub const fn optional(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            default: Some(default),
        }
    }

    /// Robot Framework argument spec form: `name` or `name=default`
    pub fn signature(&self) -> String {
        match self.default {
            Some(default) => format!("{}={}", self.name, default),
            None => self.name.to_string(),
        }
    }
}

/// Positional and named arguments resolved against a keyword's [`ArgSpec`]s,
/// with defaults filled in.
#[derive(Debug)]
pub struct KeywordArgs {
    keyword: &'static str,
    specs: &'static [ArgSpec],
    values: Vec<Value>,
}

impl KeywordArgs {
    pub fn resolve(
        keyword: &'static str,
        specs: &'static [ArgSpec],
        positional: Vec<Value>,
        mut named: BTreeMap<String, Value>,
    ) -> Result<Self, LibraryError> {
        if positional.len() > specs.len() {
            return Err(Self::count_error(keyword, specs, positional.len() + named.len()));
        }

        let got = positional.len() + named.len();
        let mut slots: Vec<Option<Value>> = positional.into_iter().map(Some).collect();
        slots.resize(specs.len(), None);

        for (index, spec) in specs.iter().enumerate() {
            if let Some(value) = named.remove(spec.name) {
                if slots[index].is_some() {
                    return Err(LibraryError::DuplicateArgument {
                        keyword: keyword.to_string(),
                        name: spec.name.to_string(),
                    });
                }
                slots[index] = Some(value);
            }
        }

        if let Some(name) = named.into_keys().next() {
            return Err(LibraryError::UnexpectedNamedArgument {
                keyword: keyword.to_string(),
                name,
            });
        }

        let mut values = Vec::with_capacity(specs.len());
        for (slot, spec) in slots.into_iter().zip(specs) {
            match (slot, spec.default) {
                (Some(value), _) => values.push(value),
                (None, Some(default)) => values.push(Value::String(default.to_string())),
                (None, None) => return Err(Self::count_error(keyword, specs, got)),
            }
        }

        Ok(Self { keyword, specs, values })
    }

    fn count_error(keyword: &str, specs: &[ArgSpec], got: usize) -> LibraryError {
        let required = specs.iter().filter(|s| s.default.is_none()).count();
        let expected = if required == specs.len() {
            required.to_string()
        } else {
            format!("{} to {}", required, specs.len())
        };
        LibraryError::ArgumentCount {
            keyword: keyword.to_string(),
            expected,
            got,
        }
    }

    pub fn keyword(&self) -> &'static str {
        self.keyword
    }

    /// Argument `index` as text. Robot passes most values as strings already.
    pub fn string(&self, index: usize) -> String {
        match &self.values[index] {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn integer(&self, index: usize) -> Result<i64, LibraryError> {
        let name = self.specs[index].name;
        match &self.values[index] {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| LibraryError::invalid_argument(name, "an integer", n.to_string())),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| LibraryError::invalid_argument(name, "an integer", s.clone())),
            other => Err(LibraryError::invalid_argument(name, "an integer", other.to_string())),
        }
    }

    pub fn port(&self, index: usize) -> Result<u16, LibraryError> {
        let value = self.integer(index)?;
        u16::try_from(value)
            .map_err(|_| LibraryError::invalid_argument(self.specs[index].name, "a port number", value.to_string()))
    }

    /// Like [`port`](Self::port), but an empty value means "not given"
    pub fn optional_port(&self, index: usize) -> Result<Option<u16>, LibraryError> {
        if self.string(index).trim().is_empty() {
            return Ok(None);
        }
        self.port(index).map(Some)
    }
}
