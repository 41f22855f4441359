//! # Tokenizer
//!
//! Splits a raw `!postman` argument line into method, URL, `key:value` parameters and `--` flags.
//! Double quotes group text (including spaces and colons) into a single token and are stripped;
//! `\"` and `\\` produce literal characters.

use crate::domain::errors::ParseError;
use crate::domain::types::{Parameter, Token, TokenSequence};

struct Word {
    text: String,
    quoted: bool,
}

pub fn tokenize(raw: &str) -> Result<TokenSequence, ParseError> {
    let mut method = None;
    let mut url = None;
    let mut parameters = Vec::new();
    let mut flags = Vec::new();

    for word in split_words(raw)? {
        match classify(word, method.is_some(), url.is_some())? {
            Token::Method(m) => method = Some(m),
            Token::Url(u) => url = Some(u),
            Token::Parameter(p) => parameters.push(p),
            Token::Flag(f) => flags.push(f),
        }
    }

    Ok(TokenSequence {
        method: method.ok_or(ParseError::MissingMethod)?,
        url: url.ok_or(ParseError::MissingUrl)?,
        parameters,
        flags,
    })
}

fn classify(word: Word, seen_method: bool, seen_url: bool) -> Result<Token, ParseError> {
    if !word.quoted && word.text.starts_with("--") {
        return Ok(Token::Flag(word.text));
    }
    match (seen_method, seen_url) {
        (false, _) => Ok(Token::Method(word.text)),
        (true, false) => Ok(Token::Url(word.text)),
        (true, true) => parse_parameter(word.text).map(Token::Parameter),
    }
}

fn parse_parameter(text: String) -> Result<Parameter, ParseError> {
    match text.split_once(':') {
        Some((key, value)) if !key.trim().is_empty() => Ok(Parameter {
            key: key.trim().to_string(),
            value: value.to_string(),
        }),
        _ => Err(ParseError::MalformedParameter(text)),
    }
}

fn split_words(raw: &str) -> Result<Vec<Word>, ParseError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('"' | '\\')) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
                in_word = true;
            }
            // Mobile keyboards like to "smarten" quotes.
            '"' | '\u{201C}' | '\u{201D}' => {
                in_quotes = !in_quotes;
                quoted = true;
                in_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_word {
                    words.push(Word {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                    in_word = false;
                    quoted = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if in_quotes {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_word {
        words.push(Word {
            text: current,
            quoted,
        });
    }

    Ok(words)
}
