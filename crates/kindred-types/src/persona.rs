//! Persona data shapes.

use serde::{Deserialize, Serialize};

/// A fixed personality profile the model impersonates.
///
/// The full record, including the prompt template, is internal to the
/// registry; public listings go through [`PersonaProfile`].
#[derive(Debug, Clone)]
pub struct Persona {
    pub name: &'static str,
    pub age: u8,
    pub description: &'static str,
    pub personality: &'static str,
    /// System instruction seeded into every model call for this persona.
    pub system_prompt: &'static str,
    /// Per-persona override of the soft word cap applied to streamed replies.
    pub word_cap: Option<usize>,
}

/// The externally visible slice of a persona: everything except the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub name: String,
    pub age: u8,
    pub description: String,
    pub personality: String,
}

impl From<&Persona> for PersonaProfile {
    fn from(p: &Persona) -> Self {
        Self {
            name: p.name.to_string(),
            age: p.age,
            description: p.description.to_string(),
            personality: p.personality.to_string(),
        }
    }
}
