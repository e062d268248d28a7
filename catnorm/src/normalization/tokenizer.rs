//! Structural tokenizer for raw inventory names
//!
//! Splits a name on whitespace and structural characters (brackets,
//! delimiters, quotes) and classifies each word by its majority character
//! class. Bracket depth is tracked so callers can separate the main text
//! from bracketed attributes.
//!
//! The tokenizer is side-effect free and never fails: empty input yields an
//! empty token list and zero counts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Word dominated by letters
    Text,
    /// Word dominated by digits (`100`, `2,5`, `100x100`)
    Number,
    /// Word with neither letters nor digits (`***`, `-`)
    Symbol,
    BracketOpen,
    BracketClose,
    /// `,` or `;` outside a number
    Delimiter,
    Quote,
}

/// One token with its character offset and bracket depth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Character offset of the first character
    pub position: usize,
    /// Bracket nesting depth at the token (0 = top level)
    pub depth: usize,
}

impl Token {
    /// Word tokens carry name content; structural tokens do not
    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Text | TokenKind::Number | TokenKind::Symbol)
    }
}

/// Structural summary of a name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureInfo {
    /// Word tokens (text + number + symbol)
    pub total_tokens: usize,
    pub text_tokens: usize,
    pub number_tokens: usize,
    pub symbol_tokens: usize,
    /// Matched open/close bracket pairs
    pub bracket_pairs: usize,
    pub max_depth: usize,
    pub has_quotes: bool,
    pub delimiter_count: usize,
    /// Word count per bracket depth
    pub depth_distribution: BTreeMap<usize, usize>,
}

/// Name tokenizer
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Split a name into classified tokens
    pub fn tokenize(&self, name: &str) -> Vec<Token> {
        let chars: Vec<char> = name.chars().collect();
        let mut tokens = Vec::new();
        let mut word = String::new();
        let mut word_start = 0;
        let mut depth = 0usize;

        for (i, &c) in chars.iter().enumerate() {
            let structural = if c.is_whitespace() {
                Some(None)
            } else if is_open_bracket(c) {
                Some(Some(TokenKind::BracketOpen))
            } else if is_close_bracket(c) {
                Some(Some(TokenKind::BracketClose))
            } else if is_quote(c) {
                Some(Some(TokenKind::Quote))
            } else if (c == ',' || c == ';') && !is_decimal_comma(&chars, i) {
                Some(Some(TokenKind::Delimiter))
            } else {
                None
            };

            match structural {
                None => {
                    if word.is_empty() {
                        word_start = i;
                    }
                    word.push(c);
                }
                Some(kind) => {
                    flush_word(&mut tokens, &mut word, word_start, depth);
                    match kind {
                        Some(TokenKind::BracketOpen) => {
                            tokens.push(structural_token(TokenKind::BracketOpen, c, i, depth));
                            depth += 1;
                        }
                        Some(TokenKind::BracketClose) => {
                            depth = depth.saturating_sub(1);
                            tokens.push(structural_token(TokenKind::BracketClose, c, i, depth));
                        }
                        Some(kind) => tokens.push(structural_token(kind, c, i, depth)),
                        None => {}
                    }
                }
            }
        }
        flush_word(&mut tokens, &mut word, word_start, depth);

        tokens
    }

    /// Count token classes and structural features
    pub fn analyze_structure(&self, name: &str) -> StructureInfo {
        let tokens = self.tokenize(name);
        let mut info = StructureInfo::default();
        let mut open_brackets = 0usize;

        for token in &tokens {
            match token.kind {
                TokenKind::Text => info.text_tokens += 1,
                TokenKind::Number => info.number_tokens += 1,
                TokenKind::Symbol => info.symbol_tokens += 1,
                TokenKind::BracketOpen => {
                    open_brackets += 1;
                    info.max_depth = info.max_depth.max(token.depth + 1);
                }
                TokenKind::BracketClose => {
                    if open_brackets > 0 {
                        open_brackets -= 1;
                        info.bracket_pairs += 1;
                    }
                }
                TokenKind::Delimiter => info.delimiter_count += 1,
                TokenKind::Quote => info.has_quotes = true,
            }
            if token.is_word() {
                *info.depth_distribution.entry(token.depth).or_insert(0) += 1;
            }
        }

        info.total_tokens = info.text_tokens + info.number_tokens + info.symbol_tokens;
        info
    }

    /// Words outside any bracket, space-joined
    pub fn main_text(&self, name: &str) -> String {
        self.tokenize(name)
            .into_iter()
            .filter(|t| t.is_word() && t.depth == 0)
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Contents of each top-level bracket group
    pub fn bracket_attributes(&self, name: &str) -> Vec<String> {
        let mut attributes = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut inside = false;

        for token in self.tokenize(name) {
            match token.kind {
                TokenKind::BracketOpen if token.depth == 0 => {
                    inside = true;
                    current.clear();
                }
                TokenKind::BracketClose if token.depth == 0 => {
                    if inside && !current.is_empty() {
                        attributes.push(current.join(" "));
                    }
                    inside = false;
                }
                _ if inside && token.is_word() => current.push(token.text),
                _ => {}
            }
        }

        attributes
    }

    /// Split on top-level delimiters, dropping empty segments
    pub fn split_by_delimiter(&self, name: &str) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for token in self.tokenize(name) {
            if token.kind == TokenKind::Delimiter && token.depth == 0 {
                if !current.is_empty() {
                    segments.push(current.join(" "));
                    current.clear();
                }
            } else if token.is_word() {
                current.push(token.text);
            }
        }
        if !current.is_empty() {
            segments.push(current.join(" "));
        }

        segments
    }

    /// `key: value` and `key=value` segments between delimiters
    pub fn key_value_pairs(&self, name: &str) -> Vec<(String, String)> {
        name.split([',', ';'])
            .filter_map(|segment| {
                let (key, value) = segment.split_once(':').or_else(|| segment.split_once('='))?;
                let key = key.trim();
                let value = value.trim();
                if key.is_empty() || value.is_empty() {
                    None
                } else {
                    Some((key.to_string(), value.to_string()))
                }
            })
            .collect()
    }

    /// Character length of each word token
    pub fn token_lengths(&self, name: &str) -> Vec<usize> {
        self.tokenize(name)
            .iter()
            .filter(|t| t.is_word())
            .map(|t| t.text.chars().count())
            .collect()
    }
}

/// Classify a word by majority character class
pub fn classify_word(word: &str) -> TokenKind {
    let digits = word.chars().filter(|c| c.is_numeric()).count();
    let letters = word.chars().filter(|c| c.is_alphabetic()).count();

    if digits == 0 && letters == 0 {
        TokenKind::Symbol
    } else if digits > letters {
        TokenKind::Number
    } else {
        TokenKind::Text
    }
}

fn flush_word(tokens: &mut Vec<Token>, word: &mut String, start: usize, depth: usize) {
    if word.is_empty() {
        return;
    }
    let text = std::mem::take(word);
    tokens.push(Token {
        kind: classify_word(&text),
        text,
        position: start,
        depth,
    });
}

fn structural_token(kind: TokenKind, c: char, position: usize, depth: usize) -> Token {
    Token {
        kind,
        text: c.to_string(),
        position,
        depth,
    }
}

fn is_open_bracket(c: char) -> bool {
    matches!(c, '(' | '[' | '{')
}

fn is_close_bracket(c: char) -> bool {
    matches!(c, ')' | ']' | '}')
}

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '«' | '»' | '“' | '”')
}

/// A comma between two digits belongs to the number (`2,5`)
fn is_decimal_comma(chars: &[char], i: usize) -> bool {
    chars[i] == ','
        && i > 0
        && chars[i - 1].is_ascii_digit()
        && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let tokenizer = Tokenizer::new();
        assert!(tokenizer.tokenize("").is_empty());
        let info = tokenizer.analyze_structure("   ");
        assert_eq!(info.text_tokens, 0);
        assert_eq!(info.number_tokens, 0);
        assert_eq!(info.total_tokens, 0);
    }

    #[test]
    fn test_majority_classification() {
        assert_eq!(classify_word("молоток"), TokenKind::Text);
        assert_eq!(classify_word("100x100"), TokenKind::Number);
        assert_eq!(classify_word("50кг"), TokenKind::Text);
        assert_eq!(classify_word("ER-00013004"), TokenKind::Number);
        assert_eq!(classify_word("***"), TokenKind::Symbol);
        assert_eq!(classify_word("a1"), TokenKind::Text);
    }

    #[test]
    fn test_analyze_structure_counts() {
        let info = Tokenizer::new().analyze_structure("Молоток ER-00013004 100x100 50кг");
        assert_eq!(info.text_tokens, 2);
        assert_eq!(info.number_tokens, 2);
        assert_eq!(info.total_tokens, 4);
        assert_eq!(info.bracket_pairs, 0);
        assert!(!info.has_quotes);
    }

    #[test]
    fn test_brackets_and_depth() {
        let tokenizer = Tokenizer::new();
        let info = tokenizer.analyze_structure("Кабель (медный (ГОСТ)) 3x2,5");
        assert_eq!(info.bracket_pairs, 2);
        assert_eq!(info.max_depth, 2);
        assert_eq!(info.depth_distribution.get(&1), Some(&1));
        assert_eq!(info.depth_distribution.get(&2), Some(&1));
        assert_eq!(info.delimiter_count, 0);

        assert_eq!(tokenizer.main_text("Кабель (медный (ГОСТ)) 3x2,5"), "Кабель 3x2,5");
        assert_eq!(
            tokenizer.bracket_attributes("Краска (белая) (матовая)"),
            vec!["белая".to_string(), "матовая".to_string()]
        );
    }

    #[test]
    fn test_token_positions_are_char_offsets() {
        let tokens = Tokenizer::new().tokenize("Шуруп 4,2x16");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1].position, 6);
        assert_eq!(tokens[1].text, "4,2x16");
    }

    #[test]
    fn test_delimiters_and_quotes() {
        let tokenizer = Tokenizer::new();
        let info = tokenizer.analyze_structure("Краска \"Эмаль\", белая; 2,5 л");
        assert!(info.has_quotes);
        assert_eq!(info.delimiter_count, 2);
        assert_eq!(
            tokenizer.split_by_delimiter("Краска, белая; 2,5 л"),
            vec!["Краска", "белая", "2,5 л"]
        );
    }

    #[test]
    fn test_key_value_pairs() {
        let pairs = Tokenizer::new().key_value_pairs("Цвет: белый, объем=2 л, матовая");
        assert_eq!(
            pairs,
            vec![
                ("Цвет".to_string(), "белый".to_string()),
                ("объем".to_string(), "2 л".to_string())
            ]
        );
    }

    #[test]
    fn test_unbalanced_close_bracket() {
        let info = Tokenizer::new().analyze_structure("деталь) 5");
        assert_eq!(info.bracket_pairs, 0);
        assert_eq!(info.total_tokens, 2);
    }
}
