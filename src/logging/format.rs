// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Record formatting templates.
//!
//! A template mixes literal text, `{field}` placeholders and colour markup:
//!
//! ```text
//! <green>{time}</green> | <level>{level: <8}</level> | {name}:{function}:{line} - {message}
//! ```
//!
//! Fields: `time`, `level`, `message`, `name`, `function`, `line`, `file`,
//! `process`, `thread`, `exception`. `{time:FMT}` takes a strftime pattern or
//! a `YYYY-MM-DD HH:mm:ss.SSS` style pattern; other fields take an alignment
//! modifier such as ` <8`, `>5` or `^10`. `{{` and `}}` are literal braces.
//!
//! Markup tags are rendered as ANSI escapes when colorizing and dropped
//! otherwise. Unknown `<...>` text is kept literally.

use super::entry::LogRecord;
use super::Severity;

/// Default timestamp pattern
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Console/file format for worker records: origin process and thread first
pub const WORKER_FORMAT: &str = "<green>{time}</green> | <level>{level: <8}</level> | \
<cyan>P{process}</cyan>/<magenta>T{thread}</magenta> | <cyan>{file}</cyan> | \
<cyan>{name}</cyan>:<cyan>{function}</cyan>:<cyan>{line}</cyan> - <level>{message}</level>";

const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{0}}}' in format template")]
    UnknownField(String),

    #[error("unclosed '{{' at byte {0} in format template")]
    Unclosed(usize),

    #[error("unmatched '}}' at byte {0} in format template")]
    Unmatched(usize),

    #[error("invalid alignment modifier '{modifier}' for '{field}'")]
    InvalidAlignment { field: String, modifier: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Time,
    Level,
    Message,
    Name,
    Function,
    Line,
    File,
    Process,
    Thread,
    Exception,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "time" => Field::Time,
            "level" => Field::Level,
            "message" => Field::Message,
            "name" => Field::Name,
            "function" => Field::Function,
            "line" => Field::Line,
            "file" => Field::File,
            "process" => Field::Process,
            "thread" => Field::Thread,
            "exception" => Field::Exception,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Padding {
    fill: char,
    align: Align,
    width: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Ansi(&'static str),
    /// Colour chosen by the record's severity
    Level,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Time(String),
    Field(Field, Option<Padding>),
    Open(Style),
    Close,
}

/// A parsed format template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    has_exception: bool,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut has_exception = false;
        let bytes = source.as_bytes();
        let mut i = 0;

        while i < source.len() {
            let rest = &source[i..];
            if rest.starts_with("{{") {
                literal.push('{');
                i += 2;
            } else if rest.starts_with("}}") {
                literal.push('}');
                i += 2;
            } else if bytes[i] == b'{' {
                let end = rest.find('}').ok_or(TemplateError::Unclosed(i))?;
                let placeholder = &rest[1..end];
                flush_literal(&mut literal, &mut segments);
                let segment = parse_placeholder(placeholder)?;
                if segment == Segment::Field(Field::Exception, None) {
                    has_exception = true;
                }
                segments.push(segment);
                i += end + 1;
            } else if bytes[i] == b'}' {
                return Err(TemplateError::Unmatched(i));
            } else if bytes[i] == b'<' {
                match parse_tag(rest) {
                    Some((segment, len)) => {
                        flush_literal(&mut literal, &mut segments);
                        segments.push(segment);
                        i += len;
                    }
                    None => {
                        literal.push('<');
                        i += 1;
                    }
                }
            } else {
                let ch = rest.chars().next().unwrap_or_default();
                literal.push(ch);
                i += ch.len_utf8();
            }
        }
        flush_literal(&mut literal, &mut segments);

        Ok(Self {
            segments,
            has_exception,
        })
    }

    /// The built-in format for worker records
    pub fn worker_default() -> Self {
        // WORKER_FORMAT is a constant known to parse
        Self::parse(WORKER_FORMAT).unwrap_or_else(|_| Self {
            segments: vec![Segment::Field(Field::Message, None)],
            has_exception: false,
        })
    }

    /// Render a record. Exception text is appended on its own line unless
    /// the template places `{exception}` itself.
    pub fn render(&self, record: &LogRecord, colorize: bool) -> String {
        let mut out = String::with_capacity(128);
        let mut styles: Vec<&'static str> = Vec::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Time(pattern) => out.push_str(&render_time(record, pattern)),
                Segment::Field(field, padding) => {
                    let value = field_value(*field, record);
                    match padding {
                        Some(padding) => out.push_str(&pad(&value, padding)),
                        None => out.push_str(&value),
                    }
                }
                Segment::Open(style) => {
                    if colorize {
                        let code = match style {
                            Style::Ansi(code) => *code,
                            Style::Level => level_color(record.level),
                        };
                        out.push_str(code);
                        styles.push(code);
                    }
                }
                Segment::Close => {
                    if colorize && styles.pop().is_some() {
                        out.push_str(RESET);
                        for code in &styles {
                            out.push_str(code);
                        }
                    }
                }
            }
        }
        if colorize && !styles.is_empty() {
            out.push_str(RESET);
        }

        if !self.has_exception {
            if let Some(exc) = &record.exception_text {
                out.push('\n');
                out.push_str(exc);
            }
        }
        out
    }
}

fn flush_literal(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

fn parse_placeholder(placeholder: &str) -> Result<Segment, TemplateError> {
    let (name, modifier) = match placeholder.split_once(':') {
        Some((name, modifier)) => (name.trim(), Some(modifier)),
        None => (placeholder.trim(), None),
    };
    let field =
        Field::parse(name).ok_or_else(|| TemplateError::UnknownField(placeholder.to_string()))?;

    if field == Field::Time {
        let pattern = match modifier {
            Some(modifier) if !modifier.is_empty() => time_pattern(modifier),
            _ => DEFAULT_TIME_FORMAT.to_string(),
        };
        return Ok(Segment::Time(pattern));
    }

    let padding = match modifier {
        Some(modifier) => Some(parse_padding(modifier).ok_or_else(|| TemplateError::InvalidAlignment {
            field: name.to_string(),
            modifier: modifier.to_string(),
        })?),
        None => None,
    };
    Ok(Segment::Field(field, padding))
}

/// Parse `[fill]align width`, e.g. ` <8`, `>5`, `*^10`
fn parse_padding(modifier: &str) -> Option<Padding> {
    let chars: Vec<char> = modifier.chars().collect();
    let align_of = |c: char| match c {
        '<' => Some(Align::Left),
        '>' => Some(Align::Right),
        '^' => Some(Align::Center),
        _ => None,
    };
    let (fill, align, digits) = match chars.as_slice() {
        [fill, a, rest @ ..] if align_of(*a).is_some() => (*fill, align_of(*a)?, rest),
        [a, rest @ ..] if align_of(*a).is_some() => (' ', align_of(*a)?, rest),
        _ => return None,
    };
    let width: String = digits.iter().collect();
    Some(Padding {
        fill,
        align,
        width: width.parse().ok()?,
    })
}

fn parse_tag(rest: &str) -> Option<(Segment, usize)> {
    let end = rest.find('>')?;
    let inner = &rest[1..end];
    let (closing, name) = match inner.strip_prefix('/') {
        Some(name) => (true, name),
        None => (false, inner),
    };
    let style = match name {
        "level" => Style::Level,
        "green" => Style::Ansi("\x1b[32m"),
        "cyan" => Style::Ansi("\x1b[36m"),
        "magenta" => Style::Ansi("\x1b[35m"),
        "red" => Style::Ansi("\x1b[31m"),
        "yellow" => Style::Ansi("\x1b[33m"),
        "blue" => Style::Ansi("\x1b[34m"),
        "bold" => Style::Ansi("\x1b[1m"),
        "dim" => Style::Ansi("\x1b[2m"),
        _ => return None,
    };
    let segment = if closing {
        Segment::Close
    } else {
        Segment::Open(style)
    };
    Some((segment, end + 1))
}

/// Accept either strftime patterns or the `YYYY-MM-DD HH:mm:ss.SSS` token style
fn time_pattern(modifier: &str) -> String {
    if modifier.contains('%') {
        return modifier.to_string();
    }
    const TOKENS: [(&str, &str); 8] = [
        ("YYYY", "%Y"),
        ("SSS", "%3f"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("ZZ", "%z"),
    ];
    let mut out = String::new();
    let mut rest = modifier;
    'outer: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        let ch = rest.chars().next().unwrap_or_default();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

fn render_time(record: &LogRecord, pattern: &str) -> String {
    use std::fmt::Write;

    let Some(time) = record.time() else {
        return record.timestamp.clone();
    };
    let mut out = String::new();
    // chrono reports bad patterns as a fmt error instead of panicking here
    if write!(out, "{}", time.format(pattern)).is_err() {
        return record.timestamp.clone();
    }
    out
}

fn field_value(field: Field, record: &LogRecord) -> String {
    match field {
        Field::Time => record.timestamp.clone(),
        Field::Level => record.level.as_str().to_string(),
        Field::Message => record.message.clone(),
        Field::Name => record.logger_name.clone(),
        Field::Function => record.function_name.clone(),
        Field::Line => record.line_number.to_string(),
        Field::File => record.source_file.clone(),
        Field::Process => record.process_id.to_string(),
        Field::Thread => record.thread_id.to_string(),
        Field::Exception => record.exception_text.clone().unwrap_or_default(),
    }
}

fn pad(value: &str, padding: &Padding) -> String {
    let len = value.chars().count();
    if len >= padding.width {
        return value.to_string();
    }
    let missing = padding.width - len;
    let fill = |n: usize| std::iter::repeat(padding.fill).take(n).collect::<String>();
    match padding.align {
        Align::Left => format!("{}{}", value, fill(missing)),
        Align::Right => format!("{}{}", fill(missing), value),
        Align::Center => {
            let left = missing / 2;
            format!("{}{}{}", fill(left), value, fill(missing - left))
        }
    }
}

fn level_color(level: Severity) -> &'static str {
    match level {
        Severity::Trace => "\x1b[36;1m",
        Severity::Debug => "\x1b[34;1m",
        Severity::Info => "\x1b[1m",
        Severity::Success => "\x1b[32;1m",
        Severity::Warning => "\x1b[33;1m",
        Severity::Error => "\x1b[31;1m",
        Severity::Critical => "\x1b[41;1m",
    }
}
