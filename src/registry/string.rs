//! String functions
//!
//! Positions and lengths count characters, not bytes. Positions are
//! 1-based; 0 means "not found".

use chrono::{Datelike, NaiveDateTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use super::function::FunctionContext;
use super::utils::compile_regex;
use crate::core::{EvalError, EvalResult, Result, Value};
use crate::geometry::GeometryType;
use crate::register_function;

static FORMAT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(\d{1,2})").expect("format marker pattern is valid"));

static DEFAULT_WRAP_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\x{200B}]").expect("wrap delimiter pattern is valid"));

impl FunctionRegistry {
    pub fn register_string_functions(&self) -> Result<()> {
        self.register_case_functions()?;
        self.register_length_function()?;
        self.register_replace_functions()?;
        self.register_regexp_functions()?;
        self.register_substring_functions()?;
        self.register_padding_functions()?;
        self.register_format_functions()?;
        Ok(())
    }

    fn register_case_functions(&self) -> Result<()> {
        register_function!(
            self,
            "lower",
            groups: [FunctionGroup::String],
            help: "Converts a string to lower case letters.",
            parameters: ["string"],
            implementation: |call| Ok(Value::String(call.text(0).to_lowercase()))
        )?;
        register_function!(
            self,
            "upper",
            groups: [FunctionGroup::String],
            help: "Converts a string to upper case letters.",
            parameters: ["string"],
            implementation: |call| Ok(Value::String(call.text(0).to_uppercase()))
        )?;
        register_function!(
            self,
            "title",
            groups: [FunctionGroup::String],
            help: "Converts all words of a string to title case.",
            parameters: ["string"],
            implementation: |call| Ok(Value::String(title_case(&call.text(0))))
        )?;
        register_function!(
            self,
            "trim",
            groups: [FunctionGroup::String],
            help: "Removes all leading and trailing whitespace.",
            parameters: ["string"],
            implementation: |call| Ok(Value::from(call.text(0).trim()))
        )?;
        register_function!(
            self,
            "char",
            groups: [FunctionGroup::String],
            help: "Returns the character associated with a unicode code.",
            parameters: ["code"],
            implementation: |call| {
                let code = call.int(0)?;
                Ok(u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or_default())
            }
        )?;
        register_function!(
            self,
            "wordwrap",
            groups: [FunctionGroup::String],
            help: "Returns a string wrapped to a maximum or minimum number of characters.",
            parameters: ["text", "length", "delimiter" = ""],
            implementation: |call| {
                let text = call.text(0);
                let wrap = call.int(1)?;
                if text.is_empty() || wrap == 0 {
                    return Ok(Value::Null);
                }
                Ok(Value::String(word_wrap(&text, wrap, &call.text(2))))
            }
        )
    }

    /// `length()` measures strings and line geometries
    fn register_length_function(&self) -> Result<()> {
        FunctionBuilder::new("length", FunctionGroup::String)
            .group(FunctionGroup::Geometry)
            .help("Returns the number of characters in a string or the length of a line geometry.")
            .optional_parameter("text", "")
            .implementation(|call| match call.value(0) {
                Value::Geometry(geometry) => Ok(if geometry.geometry_type() == GeometryType::Line {
                    Value::Double(geometry.length())
                } else {
                    Value::Null
                }),
                other => Ok(Value::from(other.to_text().chars().count())),
            })
            .register_builtin(self)
    }

    fn register_replace_functions(&self) -> Result<()> {
        FunctionBuilder::new("replace", FunctionGroup::String)
            .help("Replaces a substring, a list of substrings or the keys of a map with their replacements.")
            .variadic()
            .implementation(replace)
            .register_builtin(self)?;
        register_function!(
            self,
            "regexp_replace",
            groups: [FunctionGroup::String],
            help: "Replaces every match of a regular expression; \\1 style back-references are supported.",
            parameters: ["input_string", "regex", "replacement"],
            implementation: |call| {
                let regex = compile_regex(&call.text(1))?;
                let replacement = translate_back_references(&call.text(2));
                Ok(Value::String(
                    regex.replace_all(&call.text(0), replacement.as_str()).into_owned(),
                ))
            }
        )
    }

    fn register_regexp_functions(&self) -> Result<()> {
        register_function!(
            self,
            "regexp_match",
            groups: [FunctionGroup::Conditionals, FunctionGroup::String],
            help: "Returns the 1-based position of the first regular expression match, or 0.",
            parameters: ["string", "regex"],
            implementation: |call| {
                let regex = compile_regex(&call.text(1))?;
                let text = call.text(0);
                Ok(Value::from(match regex.find(&text) {
                    Some(found) => text[..found.start()].chars().count() + 1,
                    None => 0,
                }))
            }
        )?;
        register_function!(
            self,
            "regexp_matches",
            groups: [FunctionGroup::Arrays],
            help: "Returns an array of the groups captured by a regular expression.",
            parameters: ["string", "regex", "emptyvalue" = ""],
            implementation: |call| {
                let regex = compile_regex(&call.text(1))?;
                let text = call.text(0);
                let empty = call.text(2);
                let Some(captures) = regex.captures(&text) else {
                    return Ok(Value::Null);
                };
                Ok(Value::Array(
                    captures
                        .iter()
                        .skip(1)
                        .map(|group| match group.map(|m| m.as_str()) {
                            Some(matched) if !matched.is_empty() => Value::from(matched),
                            _ => Value::from(empty.as_str()),
                        })
                        .collect(),
                ))
            }
        )?;
        register_function!(
            self,
            "regexp_substr",
            groups: [FunctionGroup::String],
            help: "Returns the portion of a string matching a regular expression.",
            parameters: ["input_string", "regex"],
            implementation: |call| {
                let regex = compile_regex(&call.text(1))?;
                let text = call.text(0);
                Ok(Value::from(regex.find(&text).map(|m| m.as_str()).unwrap_or("")))
            }
        )
    }

    fn register_substring_functions(&self) -> Result<()> {
        FunctionBuilder::new("substr", FunctionGroup::String)
            .help("Returns part of a string; negative positions count from the end.")
            .parameter("string")
            .parameter("start")
            .optional_parameter("length", Value::Null)
            .handles_null()
            .implementation(substr)
            .register_builtin(self)?;
        FunctionBuilder::new("concat", FunctionGroup::String)
            .help("Concatenates several strings; null values are treated as empty strings.")
            .variadic()
            .handles_null()
            .implementation(|call| Ok(Value::String(call.values().map(Value::to_text).collect())))
            .register_builtin(self)?;
        register_function!(
            self,
            "strpos",
            groups: [FunctionGroup::String],
            help: "Returns the 1-based position of a substring, or 0 when absent.",
            parameters: ["haystack", "needle"],
            implementation: |call| {
                let haystack = call.text(0);
                Ok(Value::from(match haystack.find(&call.text(1)) {
                    Some(index) => haystack[..index].chars().count() + 1,
                    None => 0,
                }))
            }
        )?;
        register_function!(
            self,
            "left",
            groups: [FunctionGroup::String],
            help: "Returns the leftmost characters of a string.",
            parameters: ["string", "length"],
            implementation: |call| {
                let text = call.text(0);
                let length = call.int(1)?;
                Ok(Value::String(match usize::try_from(length) {
                    Ok(length) => text.chars().take(length).collect(),
                    Err(_) => text,
                }))
            }
        )?;
        register_function!(
            self,
            "right",
            groups: [FunctionGroup::String],
            help: "Returns the rightmost characters of a string.",
            parameters: ["string", "length"],
            implementation: |call| {
                let text = call.text(0);
                let length = call.int(1)?;
                Ok(Value::String(match usize::try_from(length) {
                    Ok(length) => {
                        let count = text.chars().count();
                        text.chars().skip(count.saturating_sub(length)).collect()
                    }
                    Err(_) => text,
                }))
            }
        )
    }

    fn register_padding_functions(&self) -> Result<()> {
        register_function!(
            self,
            "rpad",
            groups: [FunctionGroup::String],
            help: "Pads a string on the right, or truncates it, to the given width.",
            parameters: ["string", "width", "fill"],
            implementation: |call| pad(call, false)
        )?;
        register_function!(
            self,
            "lpad",
            groups: [FunctionGroup::String],
            help: "Pads a string on the left, or truncates it, to the given width.",
            parameters: ["string", "width", "fill"],
            implementation: |call| pad(call, true)
        )
    }

    fn register_format_functions(&self) -> Result<()> {
        FunctionBuilder::new("format", FunctionGroup::String)
            .help("Formats a string by replacing %1, %2 ... markers with the arguments.")
            .variadic()
            .implementation(|call| {
                let mut text = call.text(0);
                for argument in call.values().skip(1) {
                    text = replace_lowest_marker(&text, &argument.to_text());
                }
                Ok(Value::String(text))
            })
            .register_builtin(self)?;
        register_function!(
            self,
            "format_number",
            groups: [FunctionGroup::String],
            help: "Formats a number with thousands separators and a fixed number of decimal places.",
            parameters: ["number", "places"],
            implementation: |call| {
                let number = call.double(0)?;
                let places = call.int(1)?;
                let places = usize::try_from(places)
                    .map_err(|_| EvalError::new("Number of places must be positive"))?;
                Ok(Value::String(group_thousands(&format!("{number:.places$}"))))
            }
        )?;
        register_function!(
            self,
            "format_date",
            groups: [FunctionGroup::String, FunctionGroup::DateTime],
            help: "Formats a date or datetime using a pattern such as 'dd.MM.yyyy hh:mm'.",
            parameters: ["date", "format"],
            implementation: |call| {
                let datetime = call.datetime(0)?;
                Ok(Value::String(format_datetime(&datetime, &call.text(1))))
            }
        )
    }
}

/// Upper-case the first letter of every space-separated word longer than
/// one character, lower-case the rest
fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) if word.chars().count() > 1 => {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
                }
                _ => word.to_string(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Wrap each line of `text`.
///
/// A positive `wrap` is the maximum line width, breaking at the last
/// delimiter before it (or the first after it when there is none). A
/// negative `wrap` is the minimum width before breaking at the next
/// delimiter.
fn word_wrap(text: &str, wrap: i64, delimiter: &str) -> String {
    let delimiter: Vec<char> = delimiter.chars().collect();
    let delimiter_length = delimiter.len().max(1);
    let width = wrap.unsigned_abs() as usize;

    let mut wrapped = String::with_capacity(text.len());
    let lines: Vec<&str> = text.split('\n').collect();
    for (line_index, line) in lines.iter().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let is_delimiter = |at: usize| {
            if delimiter.is_empty() {
                chars.get(at).is_some_and(|c| {
                    let mut buffer = [0u8; 4];
                    DEFAULT_WRAP_DELIMITER.is_match(c.encode_utf8(&mut buffer))
                })
            } else {
                chars.get(at..at + delimiter.len()) == Some(delimiter.as_slice())
            }
        };
        let find_forward = |from: usize| (from..chars.len()).find(|&at| is_delimiter(at));
        let find_backward =
            |from: usize| (0..=from.min(chars.len())).rev().find(|&at| is_delimiter(at));

        let mut current = 0;
        let mut last_hit: Option<usize> = Some(0);
        while current < chars.len() {
            let hit = if wrap > 0 {
                let backward = find_backward(current + width);
                let hit = if backward == last_hit || backward.is_none() {
                    find_forward(current + width)
                } else {
                    backward
                };
                last_hit = hit;
                hit
            } else {
                find_forward(current + width)
            };
            match hit {
                Some(at) => {
                    wrapped.extend(&chars[current..at.max(current)]);
                    wrapped.push('\n');
                    current = at + delimiter_length;
                }
                None => {
                    wrapped.extend(&chars[current..]);
                    current = chars.len();
                }
            }
        }
        if line_index + 1 < lines.len() {
            wrapped.push('\n');
        }
    }
    wrapped
}

fn replace(call: &mut FunctionContext<'_>) -> EvalResult<Value> {
    match call.arg_count() {
        2 if matches!(call.value(1), Value::Map(_)) => {
            let mut text = call.text(0);
            for (before, after) in call.map(1)? {
                text = text.replace(&before, &after.to_text());
            }
            Ok(Value::String(text))
        }
        3 => {
            let mut text = call.text(0);
            let before: Vec<String> = match call.value(1) {
                Value::Array(items) => items.iter().map(Value::to_text).collect(),
                other => vec![other.to_text()],
            };
            let after: Vec<String> = match call.value(2) {
                Value::Array(items) => items.iter().map(Value::to_text).collect(),
                other => vec![other.to_text()],
            };
            let single = !matches!(call.value(2), Value::Array(_));
            if !single && before.len() != after.len() {
                return Err(EvalError::new("Invalid pair of array, length not identical"));
            }
            for (index, needle) in before.iter().enumerate() {
                let replacement = if single { &after[0] } else { &after[index] };
                text = text.replace(needle.as_str(), replacement);
            }
            Ok(Value::String(text))
        }
        _ => Err(EvalError::new("Function replace requires 2 or 3 arguments")),
    }
}

/// Turn `\1` style back-references into the `${1}` form and escape `$`
fn translate_back_references(replacement: &str) -> String {
    let mut translated = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(char::is_ascii_digit) => {
                let mut group = String::new();
                while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                    group.push(digit);
                }
                translated.push_str(&format!("${{{group}}}"));
            }
            '$' => translated.push_str("$$"),
            other => translated.push(other),
        }
    }
    translated
}

fn substr(call: &mut FunctionContext<'_>) -> EvalResult<Value> {
    if call.value(0).is_null() || call.value(1).is_null() {
        return Ok(Value::Null);
    }
    let chars: Vec<char> = call.text(0).chars().collect();
    let size = chars.len() as i64;
    let mut from = call.int(1)?;
    let mut length = if call.value(2).is_null() {
        size
    } else {
        call.int(2)?
    };

    if from < 0 {
        from = (size + from).max(0);
    } else if from > 0 {
        from -= 1;
    }
    if length < 0 {
        length = (size + length - from).max(0);
    }

    let start = from.min(size);
    let end = from.saturating_add(length).min(size).max(start);
    Ok(Value::String(chars[start as usize..end as usize].iter().collect()))
}

fn pad(call: &mut FunctionContext<'_>, left: bool) -> EvalResult<Value> {
    let text = call.text(0);
    let width = usize::try_from(call.int(1)?).unwrap_or(0);
    let fill = call.text(2).chars().next().unwrap_or(' ');
    let length = text.chars().count();
    if length >= width {
        return Ok(Value::String(text.chars().take(width).collect()));
    }
    let padding: String = std::iter::repeat_n(fill, width - length).collect();
    Ok(Value::String(if left {
        padding + &text
    } else {
        text + &padding
    }))
}

/// Substitute `replacement` for every occurrence of the lowest-numbered
/// `%N` marker in `text`
fn replace_lowest_marker(text: &str, replacement: &str) -> String {
    let lowest = FORMAT_MARKER
        .captures_iter(text)
        .filter_map(|captures| captures[1].parse::<u32>().ok())
        .filter(|marker| *marker > 0)
        .min();
    match lowest {
        Some(lowest) => FORMAT_MARKER
            .replace_all(text, |captures: &regex::Captures<'_>| {
                if captures[1].parse::<u32>().ok() == Some(lowest) {
                    replacement.to_string()
                } else {
                    captures[0].to_string()
                }
            })
            .into_owned(),
        None => text.to_string(),
    }
}

/// Insert `,` between groups of three digits in the integer part
fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };
    let mut grouped = String::with_capacity(number.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Longest token each pattern letter forms
fn max_token_length(letter: char) -> usize {
    match letter {
        'd' | 'M' | 'y' => 4,
        'z' => 3,
        'h' | 'H' | 'm' | 's' => 2,
        _ => 1,
    }
}

/// Render `datetime` with a date pattern: `d dd ddd dddd`, `M MM MMM MMMM`,
/// `yy yyyy`, `h hh H HH`, `m mm`, `s ss`, `z zzz`, `AP ap`, and
/// `'quoted'` literal text
pub(crate) fn format_datetime(datetime: &NaiveDateTime, pattern: &str) -> String {
    let twelve_hour = pattern.contains("AP") || pattern.contains("ap");
    let chars: Vec<char> = pattern.chars().collect();
    let mut output = String::with_capacity(pattern.len() + 8);
    let mut index = 0;

    while index < chars.len() {
        let letter = chars[index];
        if letter == '\'' {
            index += 1;
            if chars.get(index) == Some(&'\'') {
                output.push('\'');
                index += 1;
                continue;
            }
            while index < chars.len() {
                if chars[index] == '\'' {
                    if chars.get(index + 1) == Some(&'\'') {
                        output.push('\'');
                        index += 2;
                        continue;
                    }
                    index += 1;
                    break;
                }
                output.push(chars[index]);
                index += 1;
            }
            continue;
        }

        if (letter == 'A' || letter == 'a') && matches!(chars.get(index + 1), Some('P' | 'p')) {
            let pm = datetime.hour() >= 12;
            let marker = if pm { "PM" } else { "AM" };
            output.push_str(&if letter == 'a' {
                marker.to_lowercase()
            } else {
                marker.to_string()
            });
            index += 2;
            continue;
        }

        let mut run = 1;
        while run < max_token_length(letter) && chars.get(index + run) == Some(&letter) {
            run += 1;
        }
        let hour12 = match datetime.hour() % 12 {
            0 => 12,
            hour => hour,
        };
        let rendered = match (letter, run) {
            ('d', 1) => datetime.day().to_string(),
            ('d', 2) => format!("{:02}", datetime.day()),
            ('d', 3) => {
                DAY_NAMES[datetime.weekday().num_days_from_monday() as usize][..3].to_string()
            }
            ('d', _) => DAY_NAMES[datetime.weekday().num_days_from_monday() as usize].to_string(),
            ('M', 1) => datetime.month().to_string(),
            ('M', 2) => format!("{:02}", datetime.month()),
            ('M', 3) => MONTH_NAMES[datetime.month0() as usize][..3].to_string(),
            ('M', _) => MONTH_NAMES[datetime.month0() as usize].to_string(),
            ('y', 4) => format!("{:04}", datetime.year()),
            ('y', 2 | 3) => {
                let mut rendered = format!("{:02}", datetime.year().rem_euclid(100));
                if run == 3 {
                    rendered.push('y');
                }
                rendered
            }
            ('h', _) if twelve_hour => pad_number(hour12, run),
            ('h' | 'H', _) => pad_number(datetime.hour(), run),
            ('m', _) => pad_number(datetime.minute(), run),
            ('s', _) => pad_number(datetime.second(), run),
            ('z', 3) => format!("{:03}", datetime.nanosecond() / 1_000_000),
            ('z', _) => (datetime.nanosecond() / 1_000_000).to_string(),
            _ => chars[index..index + run].iter().collect(),
        };
        output.push_str(&rendered);
        index += run;
    }
    output
}

fn pad_number(value: u32, width: usize) -> String {
    format!("{value:0width$}")
}
