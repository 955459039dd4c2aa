//! Lossless maximal-run tokenizer.
//! Every input decomposes into runs of Cyrillic letters, whitespace, or
//! everything else; concatenating the runs reproduces the input exactly.

/// Character class of a token run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Cyrillic,
    Whitespace,
    Other,
}

/// A contiguous span of the input, all of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub kind: TokenKind,
    /// Byte offset of the span start within the original input.
    pub start: usize,
}

impl Token<'_> {
    /// Byte offset one past the span end.
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Cyrillic block plus the supplement, which covers every letter the
/// lookup normalization can produce (including `ё`).
pub fn is_cyrillic(c: char) -> bool {
    matches!(c, '\u{0400}'..='\u{04FF}' | '\u{0500}'..='\u{052F}')
}

fn kind_of(c: char) -> TokenKind {
    if c.is_whitespace() {
        TokenKind::Whitespace
    } else if is_cyrillic(c) {
        TokenKind::Cyrillic
    } else {
        TokenKind::Other
    }
}

/// Split `text` into maximal same-kind runs.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut run_start = 0;
    let mut run_kind: Option<TokenKind> = None;

    for (offset, c) in text.char_indices() {
        let kind = kind_of(c);
        match run_kind {
            Some(current) if current == kind => {}
            Some(current) => {
                tokens.push(Token {
                    text: &text[run_start..offset],
                    kind: current,
                    start: run_start,
                });
                run_start = offset;
                run_kind = Some(kind);
            }
            None => {
                run_kind = Some(kind);
            }
        }
    }

    if let Some(kind) = run_kind {
        tokens.push(Token {
            text: &text[run_start..],
            kind,
            start: run_start,
        });
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(String, TokenKind)> {
        tokenize(text)
            .into_iter()
            .map(|t| (t.text.to_string(), t.kind))
            .collect()
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn splits_into_maximal_runs() {
        assert_eq!(
            kinds("привет, мир!"),
            vec![
                ("привет".to_string(), TokenKind::Cyrillic),
                (",".to_string(), TokenKind::Other),
                (" ".to_string(), TokenKind::Whitespace),
                ("мир".to_string(), TokenKind::Cyrillic),
                ("!".to_string(), TokenKind::Other),
            ]
        );
    }

    #[test]
    fn digits_adjacent_to_cyrillic_split_by_class() {
        assert_eq!(
            kinds("123абс"),
            vec![
                ("123".to_string(), TokenKind::Other),
                ("абс".to_string(), TokenKind::Cyrillic),
            ]
        );
    }

    #[test]
    fn latin_and_punctuation_are_one_run() {
        assert_eq!(
            kinds("hello?!"),
            vec![("hello?!".to_string(), TokenKind::Other)]
        );
    }

    #[test]
    fn whitespace_runs_are_preserved() {
        assert_eq!(
            kinds("а  \t\nб"),
            vec![
                ("а".to_string(), TokenKind::Cyrillic),
                ("  \t\n".to_string(), TokenKind::Whitespace),
                ("б".to_string(), TokenKind::Cyrillic),
            ]
        );
    }

    #[test]
    fn concatenation_is_lossless() {
        let inputs = [
            "Привет, мир! 123 hello ёж\n\tдобрый   день",
            "   ",
            "...",
            "ё",
        ];
        for input in inputs {
            let joined: String = tokenize(input).iter().map(|t| t.text).collect();
            assert_eq!(joined, input);
        }
    }

    #[test]
    fn offsets_index_into_the_original() {
        let input = "мир 42";
        for token in tokenize(input) {
            assert_eq!(&input[token.start..token.end()], token.text);
        }
    }

    #[test]
    fn yo_is_cyrillic() {
        assert!(is_cyrillic('ё'));
        assert!(is_cyrillic('Ё'));
        assert!(!is_cyrillic('e'));
    }
}
