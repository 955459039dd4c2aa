//! Dictionary data model: imported word-list dictionaries with metadata.
//! A dictionary's stable identity is the (author, from_language, to_language)
//! tuple; positional indices are never used as identity.

pub mod import;
pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata block of a dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryInfo {
    pub author: String,
    pub languages: Vec<String>,
    pub from_language: String,
    pub to_language: String,
    /// Comma-separated flag string.
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub categories: Categories,
    #[serde(default)]
    pub social_media: BTreeMap<String, String>,
}

/// Dictionary files carry categories either as a single comma-separated
/// string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Categories {
    One(String),
    Many(Vec<String>),
}

impl Default for Categories {
    fn default() -> Self {
        Categories::Many(Vec::new())
    }
}

impl Categories {
    /// Flatten to a list of category names.
    pub fn names(&self) -> Vec<String> {
        match self {
            Categories::One(s) => s
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            Categories::Many(v) => v.clone(),
        }
    }
}

/// A single dictionary entry. After the engine runs, the same shape doubles
/// as a translation token: `russian` is the matched source span and `dolgan`
/// its rendering. Extra language columns survive import/export untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryWord {
    pub category: String,
    pub russian: String,
    pub dolgan: String,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DictionaryWord {
    pub fn new(
        category: impl Into<String>,
        russian: impl Into<String>,
        dolgan: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            russian: russian.into(),
            dolgan: dolgan.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// A complete dictionary: metadata plus the ordered word list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictionary {
    pub info: DictionaryInfo,
    pub words: Vec<DictionaryWord>,
}

/// Stable dictionary identity: author plus language pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DictionaryId {
    pub author: String,
    pub from_language: String,
    pub to_language: String,
}

impl std::fmt::Display for DictionaryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} -> {})",
            self.author, self.from_language, self.to_language
        )
    }
}

impl Dictionary {
    pub fn id(&self) -> DictionaryId {
        DictionaryId {
            author: self.info.author.clone(),
            from_language: self.info.from_language.clone(),
            to_language: self.info.to_language.clone(),
        }
    }

    /// Content fingerprint over identity and every word triple.
    /// Used as the dictionary component of translation cache keys, so any
    /// edit to the word list invalidates cached translations.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.info.author.as_bytes());
        hasher.update(b"|");
        hasher.update(self.info.from_language.as_bytes());
        hasher.update(b"|");
        hasher.update(self.info.to_language.as_bytes());
        for word in &self.words {
            hasher.update(b"|");
            hasher.update(word.category.as_bytes());
            hasher.update(b"|");
            hasher.update(word.russian.as_bytes());
            hasher.update(b"|");
            hasher.update(word.dolgan.as_bytes());
        }
        *hasher.finalize().as_bytes()
    }
}

/// Bundled Russian -> Binary sample dictionary, always present after a
/// fresh store initialization.
pub fn sample_dictionary() -> Dictionary {
    serde_json::from_str(include_str!("sample_dictionary.json"))
        .expect("bundled sample dictionary is valid")
}
