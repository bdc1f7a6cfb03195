//! Extracted symptom snapshot

use serde::{Deserialize, Serialize};

/// One extracted clinical observation.
///
/// `None` means the field has not been captured yet; `Some("")` means it
/// was captured as blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symptom {
    pub name: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
}

impl Symptom {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            severity: None,
            duration: None,
            frequency: None,
        }
    }

    /// Whether every optional field has been captured
    pub fn is_complete(&self) -> bool {
        self.severity.is_some() && self.duration.is_some() && self.frequency.is_some()
    }
}

/// Latest symptom snapshot from the server. Replaced wholesale, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymptomSet {
    symptoms: Vec<Symptom>,
}

impl SymptomSet {
    pub fn new(symptoms: Vec<Symptom>) -> Self {
        Self { symptoms }
    }

    pub fn len(&self) -> usize {
        self.symptoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symptom> {
        self.symptoms.iter()
    }

    pub fn as_slice(&self) -> &[Symptom] {
        &self.symptoms
    }
}

impl FromIterator<Symptom> for SymptomSet {
    fn from_iter<I: IntoIterator<Item = Symptom>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
