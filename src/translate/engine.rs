//! Longest-match translation engine.
//! Maps input text plus a dictionary to an ordered token sequence: phrase
//! matches take precedence over single words, unmatched digit runs are
//! spelled out, and everything else passes through verbatim.

use std::collections::HashMap;

use crate::dictionary::{Dictionary, DictionaryWord};

use super::numerals::spell_cardinal;
use super::tokenize::{tokenize, Token, TokenKind};

/// Engine-internal token categories.
pub const CATEGORY_FORMATTING: &str = "formatting";
pub const CATEGORY_NOT_FOUND: &str = "not-found";
pub const CATEGORY_NUMBER: &str = "number";
pub const CATEGORY_PHRASE: &str = "phrase";

/// Upper bound on constituent words considered for one phrase match.
const MAX_PHRASE_WORDS: usize = 256;

/// Normalized key for dictionary lookup: Unicode lowercase, `ё` folded to
/// `е`, internal whitespace runs collapsed to single spaces.
fn normalize_key(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lc in c.to_lowercase() {
            out.push(if lc == 'ё' { 'е' } else { lc });
        }
    }
    out
}

/// Normalized lookup map over a dictionary's word list.
///
/// Duplicate normalized keys keep the earliest entry: dictionary authors are
/// expected to keep normalized `russian` keys unique, and when they do not,
/// the first entry is authoritative and later ones are shadowed.
struct Lookup {
    map: HashMap<String, usize>,
    max_phrase_words: usize,
}

impl Lookup {
    fn build(dict: &Dictionary) -> Self {
        let mut map = HashMap::with_capacity(dict.words.len());
        let mut max_phrase_words = 1;
        for (i, word) in dict.words.iter().enumerate() {
            let key = normalize_key(&word.russian);
            if key.is_empty() {
                continue;
            }
            let words_in_key = key.split(' ').count();
            if words_in_key > max_phrase_words {
                max_phrase_words = words_in_key;
            }
            map.entry(key).or_insert(i);
        }
        Self {
            map,
            max_phrase_words: max_phrase_words.min(MAX_PHRASE_WORDS),
        }
    }

    fn get(&self, key: &str) -> Option<usize> {
        self.map.get(key).copied()
    }
}

/// Translate `text` against `dict`.
///
/// Total over all inputs; never fails. Concatenating the `russian` fields of
/// the result reproduces the input (the `number` category annotates its
/// source digits with the spelled form, see DESIGN notes), and concatenating
/// the `dolgan` fields yields the translation.
pub fn translate(dict: &Dictionary, text: &str) -> Vec<DictionaryWord> {
    let lookup = Lookup::build(dict);
    let tokens = tokenize(text);
    let mut out = Vec::with_capacity(tokens.len());

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        match token.kind {
            TokenKind::Whitespace => {
                out.push(pass_through(CATEGORY_FORMATTING, token.text));
                i += 1;
            }
            TokenKind::Other => {
                if token.text.bytes().all(|b| b.is_ascii_digit()) {
                    out.push(translate_number(dict, &lookup, token.text));
                } else {
                    out.push(pass_through(CATEGORY_FORMATTING, token.text));
                }
                i += 1;
            }
            TokenKind::Cyrillic => {
                if let Some((consumed, word)) = match_phrase(dict, &lookup, text, &tokens, i) {
                    out.push(word);
                    i += consumed;
                } else {
                    out.push(pass_through(CATEGORY_NOT_FOUND, token.text));
                    i += 1;
                }
            }
        }
    }

    out
}

fn pass_through(category: &str, text: &str) -> DictionaryWord {
    DictionaryWord::new(category, text, text)
}

/// Longest-phrase matching anchored at token `i` (a Cyrillic run).
///
/// Candidates extend over alternating (word, whitespace, word, ...) tokens up
/// to the longest phrase the dictionary defines, tried longest first so that
/// idiomatic multi-word entries shadow their component words. Returns the
/// number of consumed tokens and the emitted entry.
fn match_phrase(
    dict: &Dictionary,
    lookup: &Lookup,
    text: &str,
    tokens: &[Token<'_>],
    i: usize,
) -> Option<(usize, DictionaryWord)> {
    let mut word_ends = vec![i];
    let mut k = i;
    while word_ends.len() < lookup.max_phrase_words {
        if k + 2 < tokens.len()
            && tokens[k + 1].kind == TokenKind::Whitespace
            && tokens[k + 2].kind == TokenKind::Cyrillic
        {
            k += 2;
            word_ends.push(k);
        } else {
            break;
        }
    }

    for length in (1..=word_ends.len()).rev() {
        let last = word_ends[length - 1];
        let span = &text[tokens[i].start..tokens[last].end()];
        if let Some(entry_idx) = lookup.get(&normalize_key(span)) {
            let entry = &dict.words[entry_idx];
            let category = if length > 1 {
                CATEGORY_PHRASE.to_string()
            } else {
                entry.category.clone()
            };
            let word = DictionaryWord {
                category,
                russian: span.to_string(),
                dolgan: transfer_case(span, &entry.dolgan),
                extra: entry.extra.clone(),
            };
            return Some((last - i + 1, word));
        }
    }

    None
}

/// Pure-digit token: spell it out, then translate the spelled form.
fn translate_number(dict: &Dictionary, lookup: &Lookup, digits: &str) -> DictionaryWord {
    let spelled = digits
        .parse::<u32>()
        .ok()
        .and_then(spell_cardinal);

    let Some(spelled) = spelled else {
        // Out of spelling range: untranslatable span, identity fallback.
        return pass_through(CATEGORY_NOT_FOUND, digits);
    };

    let dolgan = lookup
        .get(&normalize_key(&spelled))
        .map(|idx| dict.words[idx].dolgan.clone())
        .unwrap_or_else(|| digits.to_string());

    DictionaryWord::new(CATEGORY_NUMBER, format!("{digits} ({spelled})"), dolgan)
}

/// Capitalize the translation's first letter iff the source span starts
/// uppercase. Only the first character's case transfers.
fn transfer_case(source: &str, translation: &str) -> String {
    let starts_upper = source.chars().next().is_some_and(char::is_uppercase);
    if !starts_upper {
        return translation.to_string();
    }
    let mut chars = translation.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
