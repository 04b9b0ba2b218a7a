// ─── Valve KeyValues (VDF) ───
// Text format Steam uses for `localconfig.vdf`. Only what the launch
// option round trip needs: quoted/bare tokens, nested sections, `//`
// comments, platform conditionals and the common escapes. Entry order and
// conditionals are preserved so a rewrite only changes the value we touch.
// Comments are not kept.

use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdfValue {
    Text(String),
    Section(VdfSection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VdfEntry {
    key: String,
    value: VdfValue,
    /// Platform conditional such as `$WIN32`, without the brackets.
    condition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VdfSection {
    entries: Vec<VdfEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdfError {
    pub line: usize,
    pub reason: String,
}

impl VdfSection {
    /// Keys are matched case-insensitively, like Steam does.
    pub fn get(&self, key: &str) -> Option<&VdfValue> {
        self.entries
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(key))
            .map(|e| &e.value)
    }

    pub fn condition(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(key))
            .and_then(|e| e.condition.as_deref())
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut VdfValue> {
        self.entries
            .iter_mut()
            .find(|e| e.key.eq_ignore_ascii_case(key))
            .map(|e| &mut e.value)
    }

    pub fn lookup(&self, path: &[&str]) -> Option<&str> {
        let (last, sections) = path.split_last()?;
        let mut current = self;
        for key in sections {
            match current.get(key)? {
                VdfValue::Section(section) => current = section,
                VdfValue::Text(_) => return None,
            }
        }
        match current.get(last)? {
            VdfValue::Text(text) => Some(text),
            VdfValue::Section(_) => None,
        }
    }

    /// Set a text value, creating (or replacing non-section values with)
    /// the sections along the path.
    pub fn set(&mut self, path: &[&str], value: impl Into<String>) {
        let Some((last, sections)) = path.split_last() else {
            return;
        };

        let mut current = self;
        for key in sections {
            if !matches!(current.get(key), Some(VdfValue::Section(_))) {
                current.insert(key, VdfValue::Section(VdfSection::default()));
            }
            current = match current.get_mut(key) {
                Some(VdfValue::Section(section)) => section,
                _ => unreachable!("section inserted above"),
            };
        }
        current.insert(last, VdfValue::Text(value.into()));
    }

    fn insert(&mut self, key: &str, value: VdfValue) {
        match self.get_mut(key) {
            Some(existing) => *existing = value,
            None => self.entries.push(VdfEntry {
                key: key.to_string(),
                value,
                condition: None,
            }),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        render_entries(&self.entries, 0, &mut out);
        out
    }
}

fn render_entries(entries: &[VdfEntry], depth: usize, out: &mut String) {
    let indent = "\t".repeat(depth);
    for entry in entries {
        let condition = entry
            .condition
            .as_deref()
            .map(|c| format!(" [{c}]"))
            .unwrap_or_default();
        match &entry.value {
            VdfValue::Text(text) => {
                let _ = writeln!(
                    out,
                    "{indent}\"{}\"\t\t\"{}\"{condition}",
                    escape(&entry.key),
                    escape(text)
                );
            }
            VdfValue::Section(section) => {
                let _ = writeln!(out, "{indent}\"{}\"{condition}", escape(&entry.key));
                let _ = writeln!(out, "{indent}{{");
                render_entries(&section.entries, depth + 1, out);
                let _ = writeln!(out, "{indent}}}");
            }
        }
    }
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Condition(String),
    Open,
    Close,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, reason: impl Into<String>) -> VdfError {
        VdfError {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, VdfError> {
        loop {
            let Some(&ch) = self.chars.peek() else {
                return Ok(None);
            };
            match ch {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    if self.chars.peek() != Some(&'/') {
                        return Err(self.error("stray '/'"));
                    }
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '[' => {
                    self.chars.next();
                    let mut condition = String::new();
                    loop {
                        match self.chars.next() {
                            Some(']') => break,
                            Some('\n') | None => return Err(self.error("unterminated conditional")),
                            Some(c) => condition.push(c),
                        }
                    }
                    return Ok(Some(Token::Condition(condition.trim().to_string())));
                }
                '{' => {
                    self.chars.next();
                    return Ok(Some(Token::Open));
                }
                '}' => {
                    self.chars.next();
                    return Ok(Some(Token::Close));
                }
                '"' => {
                    self.chars.next();
                    return self.quoted().map(|text| Some(Token::Text(text)));
                }
                _ => return Ok(Some(Token::Text(self.bare()))),
            }
        }
    }

    fn quoted(&mut self) -> Result<String, VdfError> {
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(text),
                Some('\\') => match self.chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    text.push(c);
                }
            }
        }
    }

    fn bare(&mut self) -> String {
        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '"' | '{' | '}' | '[') {
                break;
            }
            text.push(c);
            self.chars.next();
        }
        text
    }
}

pub fn parse(text: &str) -> Result<VdfSection, VdfError> {
    let mut parser = Parser {
        lexer: Lexer::new(text),
        peeked: None,
    };
    parser.section(0)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
}

impl Parser<'_> {
    fn next(&mut self) -> Result<Option<Token>, VdfError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn take_condition(&mut self) -> Result<Option<String>, VdfError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        match self.peeked.take() {
            Some(Token::Condition(condition)) => Ok(Some(condition)),
            other => {
                self.peeked = other;
                Ok(None)
            }
        }
    }

    fn section(&mut self, depth: usize) -> Result<VdfSection, VdfError> {
        let mut section = VdfSection::default();
        loop {
            let key = match self.next()? {
                None if depth == 0 => return Ok(section),
                None => return Err(self.lexer.error("unexpected end of file inside a section")),
                Some(Token::Close) if depth > 0 => return Ok(section),
                Some(Token::Close) => return Err(self.lexer.error("unbalanced '}'")),
                Some(Token::Open) => return Err(self.lexer.error("expected a key, found '{'")),
                Some(Token::Condition(_)) => {
                    return Err(self.lexer.error("conditional without a key"))
                }
                Some(Token::Text(key)) => key,
            };

            // `"key" [$COND] { ... }` puts the conditional before the section.
            let mut condition = self.take_condition()?;
            let value = match self.next()? {
                Some(Token::Text(text)) => VdfValue::Text(text),
                Some(Token::Open) => VdfValue::Section(self.section(depth + 1)?),
                Some(Token::Close) | Some(Token::Condition(_)) | None => {
                    return Err(self.lexer.error(format!("key \"{key}\" has no value")))
                }
            };
            if condition.is_none() {
                condition = self.take_condition()?;
            }
            section.entries.push(VdfEntry {
                key,
                value,
                condition,
            });
        }
    }
}
