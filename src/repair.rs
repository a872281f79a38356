//! Best-effort repair of almost-JSON text.
//!
//! Model output tends to break JSON in a handful of predictable ways: keys
//! without quotes, single or typographic quotes, trailing or missing commas,
//! `//` comments, Python literals, raw newlines inside strings, and output
//! cut off mid-string or mid-array. [`repair`] tokenizes the input leniently
//! and re-emits it through a container stack, inserting or dropping
//! separators as the grammar requires and closing whatever is left open.
//!
//! The result is always syntactically valid JSON when a root value exists.
//! Whether it means what the model intended is for the caller to check.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, PartialEq)]
enum Token {
    Open(Container),
    Close(Container),
    Colon,
    Comma,
    Str(String),
    /// Unquoted run of text: a literal, a number, or a bare word.
    Bare(String),
}

// ─── Tokenizer ──────────────────────────────────────────────────────────────

fn is_bare_delimiter(c: char) -> bool {
    matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"' | '\n' | '\r')
}

fn closing_quote(open: char) -> char {
    match open {
        '\u{201C}' => '\u{201D}',
        '\u{2018}' => '\u{2019}',
        other => other,
    }
}

/// A quote ends the string only if what follows looks like JSON structure.
/// This keeps unescaped inner quotes and apostrophes inside the string.
fn quote_closes_at(chars: &[char], mut i: usize) -> bool {
    let start = i;
    let mut crossed_newline = false;
    while i < chars.len() && chars[i].is_whitespace() {
        if chars[i] == '\n' {
            crossed_newline = true;
        }
        i += 1;
    }
    match chars.get(i) {
        None => true,
        Some(',' | ':' | '}' | ']') => true,
        Some('"' | '\'' | '\u{201C}' | '\u{2018}') if i > start => true,
        Some(_) => crossed_newline,
    }
}

fn read_hex4(chars: &[char], at: usize) -> Option<u32> {
    let digits: String = chars.get(at..at + 4)?.iter().collect();
    u32::from_str_radix(&digits, 16).ok()
}

/// Read a quoted string starting at `start`. Returns the decoded contents and
/// the index just past the closing quote (or the end of input).
fn read_string(chars: &[char], start: usize) -> (String, usize) {
    let close = closing_quote(chars[start]);
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            let Some(&escaped) = chars.get(i + 1) else {
                return (out, chars.len());
            };
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => {
                    if let Some(high) = read_hex4(chars, i + 2) {
                        i += 6;
                        if (0xD800..0xDC00).contains(&high)
                            && chars.get(i) == Some(&'\\')
                            && chars.get(i + 1) == Some(&'u')
                        {
                            if let Some(low) = read_hex4(chars, i + 2) {
                                if (0xDC00..0xE000).contains(&low) {
                                    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                                    out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                                    i += 6;
                                    continue;
                                }
                            }
                        }
                        out.push(char::from_u32(high).unwrap_or('\u{FFFD}'));
                        continue;
                    }
                    out.push('u');
                }
                other => out.push(other),
            }
            i += 2;
            continue;
        }
        if c == close && quote_closes_at(chars, i + 1) {
            return (out, i + 1);
        }
        out.push(c);
        i += 1;
    }

    // Unterminated: everything up to the end belongs to the string.
    (out, i)
}

fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => tokens.push(Token::Open(Container::Object)),
            '}' => tokens.push(Token::Close(Container::Object)),
            '[' => tokens.push(Token::Open(Container::Array)),
            ']' => tokens.push(Token::Close(Container::Array)),
            ':' => tokens.push(Token::Colon),
            ',' => tokens.push(Token::Comma),
            '"' | '\'' | '`' | '\u{201C}' | '\u{2018}' => {
                let (s, next) = read_string(&chars, i);
                tokens.push(Token::Str(s));
                i = next;
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                continue;
            }
            c if c.is_whitespace() => {}
            _ => {
                let begin = i;
                while i < chars.len() && !is_bare_delimiter(chars[i]) {
                    if chars[i] == '/' && matches!(chars.get(i + 1), Some('/' | '*')) {
                        break;
                    }
                    i += 1;
                }
                let word: String = chars[begin..i].iter().collect();
                let word = word.trim();
                if !word.is_empty() {
                    tokens.push(Token::Bare(word.to_string()));
                }
                continue;
            }
        }
        i += 1;
    }

    tokens
}

// ─── Emitter ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Key,
    Colon,
    Value,
}

struct Frame {
    kind: Container,
    items: usize,
    phase: Phase,
}

fn push_string(out: &mut String, s: &str) {
    out.push_str(&Value::String(s.to_string()).to_string());
}

fn push_bare(out: &mut String, word: &str) {
    match word {
        "true" | "True" | "TRUE" => out.push_str("true"),
        "false" | "False" | "FALSE" => out.push_str("false"),
        "null" | "Null" | "NULL" | "None" | "none" | "undefined" | "NaN" => out.push_str("null"),
        _ if serde_json::from_str::<serde_json::Number>(word).is_ok() => out.push_str(word),
        _ => push_string(out, word),
    }
}

fn close_frame(out: &mut String, frame: &Frame) {
    match frame.kind {
        Container::Object => {
            match frame.phase {
                Phase::Colon => out.push_str(":null"),
                Phase::Value => out.push_str("null"),
                Phase::Key => {}
            }
            out.push('}');
        }
        Container::Array => out.push(']'),
    }
}

/// Output of [`repair`].
#[derive(Debug, PartialEq)]
pub struct Repaired {
    pub text: String,
    /// Input ended while the root value was still open, so the tail was
    /// closed artificially. The text is valid JSON but the content is cut.
    pub closed_at_eof: bool,
}

impl Repaired {
    fn complete(text: String) -> Self {
        Self {
            text,
            closed_at_eof: false,
        }
    }
}

/// Rewrite `input` into valid JSON. Returns `None` when no value at all can
/// be recovered. Anything after the first complete root value is dropped.
pub fn repair(input: &str) -> Option<Repaired> {
    let mut out = String::with_capacity(input.len() + 16);
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokenize(input) {
        match token {
            // Separators are re-derived from structure.
            Token::Comma => {}
            Token::Colon => {
                if let Some(frame) = stack.last_mut() {
                    if frame.kind == Container::Object && frame.phase == Phase::Colon {
                        out.push(':');
                        frame.phase = Phase::Value;
                    }
                }
            }
            Token::Close(kind) => {
                if !stack.iter().any(|f| f.kind == kind) {
                    continue;
                }
                while let Some(frame) = stack.pop() {
                    close_frame(&mut out, &frame);
                    if frame.kind == kind {
                        break;
                    }
                }
                if stack.is_empty() {
                    return Some(Repaired::complete(out));
                }
            }
            value => {
                // An object awaiting a key that meets `{` or `[` was most
                // likely never closed; end it so the value lands in the
                // enclosing array.
                if matches!(value, Token::Open(_)) {
                    while let Some(frame) = stack.last() {
                        if frame.kind == Container::Object && frame.phase == Phase::Key {
                            close_frame(&mut out, frame);
                            stack.pop();
                            if stack.is_empty() {
                                return Some(Repaired::complete(out));
                            }
                        } else {
                            break;
                        }
                    }
                }

                if let Some(frame) = stack.last_mut() {
                    match (frame.kind, frame.phase) {
                        (Container::Array, _) => {
                            if frame.items > 0 {
                                out.push(',');
                            }
                            frame.items += 1;
                        }
                        (Container::Object, Phase::Key) => {
                            if frame.items > 0 {
                                out.push(',');
                            }
                            frame.items += 1;
                            frame.phase = Phase::Colon;
                            match &value {
                                Token::Str(s) | Token::Bare(s) => push_string(&mut out, s),
                                _ => {}
                            }
                            continue;
                        }
                        (Container::Object, Phase::Colon) => {
                            out.push(':');
                            frame.phase = Phase::Key;
                        }
                        (Container::Object, Phase::Value) => {
                            frame.phase = Phase::Key;
                        }
                    }
                }

                match value {
                    Token::Open(kind) => {
                        out.push(match kind {
                            Container::Object => '{',
                            Container::Array => '[',
                        });
                        stack.push(Frame {
                            kind,
                            items: 0,
                            phase: Phase::Key,
                        });
                    }
                    Token::Str(s) => push_string(&mut out, &s),
                    Token::Bare(word) => push_bare(&mut out, &word),
                    Token::Comma | Token::Colon | Token::Close(_) => {}
                }

                if stack.is_empty() {
                    return Some(Repaired::complete(out));
                }
            }
        }
    }

    if out.is_empty() {
        return None;
    }
    while let Some(frame) = stack.pop() {
        close_frame(&mut out, &frame);
    }
    Some(Repaired {
        text: out,
        closed_at_eof: true,
    })
}
