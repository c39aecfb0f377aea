//! Splits source text into blocks.
//!
//! A block is either a single delimiter character or a maximal run of
//! non-delimiter characters. Quoted regions and the text between a tag's
//! closing `>` and the next `<` keep delimiters literal, so a whole string
//! or text content arrives as one block.

use crate::ParseError;
use std::error;

// Characters that terminate a run; all but whitespace also form their own
// one-character block.
const DELIMITERS: [char; 16] = [
    '#', '\n', '\r', '\t', ' ', '<', '>', '/', '*', '=', '[', ']', ',', '(', ')', '$',
];

pub(crate) fn is_delimiter(c: char) -> bool {
    DELIMITERS.contains(&c)
}

fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\n' || c == '\r' || c == '\t'
}

#[derive(PartialEq)]
enum Mode {
    Normal,
    SingleQuote,
    DoubleQuote,
    /// Between the `>` that ended a tag and the next `<`.
    Text,
}

/// Splits `source` into blocks. The only failure is a quote left open at
/// the end of input.
pub fn split_blocks(source: &str) -> Result<Vec<String>, Box<dyn error::Error>> {
    let mut blocks: Vec<String> = Vec::new();
    let mut run = String::new();
    let mut mode = Mode::Normal;
    // Previous source character, for whitespace collapsing in text content.
    let mut last = ' ';

    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        // A backslash strips the next character of any quote or delimiter
        // role; \n and \t substitute their control characters.
        if c == '\\' {
            match chars.next() {
                Some('n') => run.push('\n'),
                Some('t') => run.push('\t'),
                Some(escaped) => run.push(escaped),
                None => {}
            }
            last = c;
            continue;
        }

        match mode {
            Mode::SingleQuote => {
                run.push(c);
                if c == '\'' {
                    mode = Mode::Normal;
                }
            }
            Mode::DoubleQuote => {
                run.push(c);
                if c == '"' {
                    mode = Mode::Normal;
                }
            }
            Mode::Text => {
                if c == '<' {
                    flush(&mut blocks, &mut run);
                    blocks.push("<".to_string());
                    mode = Mode::Normal;
                } else if is_whitespace(c) {
                    // A whitespace run contributes a single character, and
                    // nothing at all when it starts with a line break.
                    if !is_whitespace(last) && c != '\n' && c != '\r' {
                        run.push(c);
                    }
                } else {
                    run.push(c);
                }
            }
            Mode::Normal => {
                if is_whitespace(c) {
                    flush(&mut blocks, &mut run);
                } else if is_delimiter(c) {
                    flush(&mut blocks, &mut run);
                    blocks.push(c.to_string());
                    if c == '>' {
                        // Everything up to the next '<' is tag text content.
                        mode = Mode::Text;
                    }
                } else if c == '\'' {
                    run.push(c);
                    mode = Mode::SingleQuote;
                } else if c == '"' {
                    run.push(c);
                    mode = Mode::DoubleQuote;
                } else {
                    run.push(c);
                }
            }
        }

        last = c;
    }

    if mode == Mode::SingleQuote || mode == Mode::DoubleQuote {
        return Err(ParseError::UnterminatedQuote.into());
    }
    flush(&mut blocks, &mut run);

    Ok(blocks)
}

fn flush(blocks: &mut Vec<String>, run: &mut String) {
    if !run.is_empty() {
        blocks.push(std::mem::take(run));
    }
}
