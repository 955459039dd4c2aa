//! Dictionary import/export.
//! Import is a two-branch tagged parse: a full `Dictionary` object first,
//! then a raw bilingual string map wrapped with synthesized metadata.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use super::{Categories, Dictionary, DictionaryInfo, DictionaryWord};

/// Author recorded on dictionaries synthesized from raw bilingual maps.
const AUTO_LOADED_AUTHOR: &str = "Автоматически загружен";
/// Source language assumed for raw bilingual maps.
const RAW_MAP_FROM_LANGUAGE: &str = "Русский";
/// Category assigned to every word of a raw bilingual map.
const RAW_MAP_CATEGORY: &str = "basic";

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(e) => write!(f, "dictionary IO error: {e}"),
            ImportError::Parse(e) => write!(f, "dictionary parse error: {e}"),
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(e: std::io::Error) -> Self {
        ImportError::Io(e)
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(e: serde_json::Error) -> Self {
        ImportError::Parse(e)
    }
}

/// Parse dictionary JSON.
///
/// Branch 1: strict full `Dictionary` object with `info` and `words`.
/// Branch 2: raw `string -> string` map, auto-wrapped into a dictionary whose
/// target language name is derived from `file_name` (stem prefix before `_`,
/// first letter capitalized). Anything else is a parse error.
pub fn parse_dictionary(content: &str, file_name: &str) -> Result<Dictionary, ImportError> {
    match serde_json::from_str::<Dictionary>(content) {
        Ok(dict) => Ok(dict),
        Err(full_err) => {
            let raw: BTreeMap<String, String> = match serde_json::from_str(content) {
                Ok(map) => map,
                // Report the full-object error; it is the richer diagnostic.
                Err(_) => return Err(ImportError::Parse(full_err)),
            };
            Ok(wrap_raw_map(raw, file_name))
        }
    }
}

/// Read and parse a dictionary file from disk.
pub fn import_file(path: &Path) -> Result<Dictionary, ImportError> {
    let content = std::fs::read_to_string(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dict = parse_dictionary(&content, &file_name)?;
    info!(
        file = %path.display(),
        words = dict.words.len(),
        "dictionary imported"
    );
    Ok(dict)
}

/// Wrap a raw bilingual map into a full dictionary with synthesized info.
fn wrap_raw_map(raw: BTreeMap<String, String>, file_name: &str) -> Dictionary {
    let to_language = language_name_from_file(file_name);
    let words = raw
        .into_iter()
        .map(|(russian, translation)| DictionaryWord::new(RAW_MAP_CATEGORY, russian, translation))
        .collect();

    Dictionary {
        info: DictionaryInfo {
            author: AUTO_LOADED_AUTHOR.to_string(),
            languages: vec![RAW_MAP_FROM_LANGUAGE.to_string(), to_language.clone()],
            from_language: RAW_MAP_FROM_LANGUAGE.to_string(),
            to_language,
            parameters: String::new(),
            categories: Categories::Many(vec![RAW_MAP_CATEGORY.to_string()]),
            social_media: BTreeMap::new(),
        },
        words,
    }
}

/// `dolgan_language.json` -> `Dolgan`.
fn language_name_from_file(file_name: &str) -> String {
    let stem = file_name
        .rsplit('/')
        .next()
        .unwrap_or(file_name)
        .trim_end_matches(".json");
    let prefix = stem.split('_').next().unwrap_or(stem);
    let mut chars = prefix.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Serialize a dictionary for export: pretty-printed full-object JSON.
pub fn export_dictionary(dict: &Dictionary) -> String {
    serde_json::to_string_pretty(dict).unwrap_or_else(|_| "{}".to_string())
}

/// File name used for exported dictionaries.
pub fn export_file_name(dict: &Dictionary) -> String {
    format!(
        "dictionary_{}_{}.json",
        dict.info.from_language, dict.info.to_language
    )
}

/// Write a dictionary next to the given directory using the export name.
pub fn export_to_dir(dict: &Dictionary, dir: &Path) -> Result<std::path::PathBuf, ImportError> {
    let path = dir.join(export_file_name(dict));
    std::fs::write(&path, export_dictionary(dict))?;
    info!(file = %path.display(), "dictionary exported");
    Ok(path)
}
