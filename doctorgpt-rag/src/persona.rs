use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Validated handle naming where a persona's corpus lives.
///
/// Store adapters only ever see handles, never raw persona strings, so
/// every table and function name reaching a backend is derived from an
/// identifier that already passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusHandle {
    persona: String,
    table: String,
    match_function: String,
}

impl CorpusHandle {
    fn new(persona: &str) -> Result<Self> {
        if !is_valid_persona(persona) {
            return Err(RagError::Validation(format!(
                "invalid persona name '{persona}': expected lowercase letters, digits or underscores, starting with a letter"
            )));
        }
        Ok(Self {
            persona: persona.to_string(),
            table: format!("{persona}_chunks"),
            match_function: format!("match_{persona}_chunks"),
        })
    }

    /// Persona name the handle was derived from.
    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Table (or collection) holding the persona's chunks.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Stored similarity-search function for the persona's table.
    pub fn match_function(&self) -> &str {
        &self.match_function
    }
}

fn is_valid_persona(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// The set of personas a deployment serves.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    default_persona: String,
    handles: HashMap<String, CorpusHandle>,
}

impl PersonaRegistry {
    pub const DEFAULT_PERSONA: &'static str = "sinclair";

    /// Builds a registry from persona names; the first becomes the
    /// default for requests that do not name one.
    pub fn new<I, S>(personas: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut default_persona = None;
        let mut handles = HashMap::new();
        for persona in personas {
            let persona = persona.as_ref();
            let handle = CorpusHandle::new(persona)?;
            if default_persona.is_none() {
                default_persona = Some(persona.to_string());
            }
            handles.insert(persona.to_string(), handle);
        }
        let default_persona = default_persona.ok_or_else(|| {
            RagError::Config("at least one persona must be registered".into())
        })?;
        Ok(Self {
            default_persona,
            handles,
        })
    }

    /// Resolves a persona name to its corpus handle.
    pub fn resolve(&self, persona: &str) -> Result<&CorpusHandle> {
        self.handles
            .get(persona)
            .ok_or_else(|| RagError::Validation(format!("unknown persona '{persona}'")))
    }

    /// Persona used when a request does not name one.
    pub fn default_persona(&self) -> &str {
        &self.default_persona
    }

    /// Registered persona names, sorted.
    pub fn personas(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::new([Self::DEFAULT_PERSONA]).expect("default persona name is valid")
    }
}
