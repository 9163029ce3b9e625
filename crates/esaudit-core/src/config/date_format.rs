//! Search engine date patterns.
//!
//! The index mapping declares date fields with an engine-side pattern such as
//! `yyyy-MM-dd HH:mm:ss`. Documents must carry their dates rendered with the
//! very same pattern, so the pattern is translated once into a chrono format
//! string and reused for every document and range bound.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::ConfigError;

/// Default date pattern for every date field in the audit index.
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd HH:mm:ss";

/// A validated engine date pattern together with its chrono translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
    chrono_pattern: String,
}

impl Default for DateFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_DATE_FORMAT.to_string(),
            chrono_pattern: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl DateFormat {
    /// Parse an engine date pattern.
    ///
    /// Supported pattern letters: `yyyy`/`yy`, `MM`/`MMM`/`MMMM`, `dd`, `HH`,
    /// `mm`, `ss` and `SSS`/`SSSSSS`/`SSSSSSSSS`. Text inside single quotes is
    /// literal, as is any non-letter character. Named engine formats such as
    /// `epoch_millis` are rejected.
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidDateFormat {
            pattern: pattern.to_string(),
            reason,
        };

        if pattern.trim().is_empty() {
            return Err(invalid("pattern is empty".to_string()));
        }
        if pattern.contains("||") {
            return Err(invalid("multiple formats are not supported".to_string()));
        }

        let chars: Vec<char> = pattern.chars().collect();
        let mut out = String::with_capacity(pattern.len() * 2);
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c == '\'' {
                // '' is an escaped quote, otherwise read up to the closing quote
                if chars.get(i + 1) == Some(&'\'') {
                    out.push('\'');
                    i += 2;
                    continue;
                }
                let close = chars[i + 1..]
                    .iter()
                    .position(|&q| q == '\'')
                    .ok_or_else(|| invalid("unterminated quoted literal".to_string()))?;
                for &lit in &chars[i + 1..i + 1 + close] {
                    push_literal(&mut out, lit);
                }
                i += close + 2;
                continue;
            }

            if !c.is_ascii_alphabetic() {
                push_literal(&mut out, c);
                i += 1;
                continue;
            }

            let run = chars[i..].iter().take_while(|&&n| n == c).count();
            let directive = match (c, run) {
                ('y', 4) | ('u', 4) => "%Y",
                ('y', 2) | ('u', 2) => "%y",
                ('M', 2) => "%m",
                ('M', 3) => "%b",
                ('M', 4) => "%B",
                ('d', 2) => "%d",
                ('H', 2) => "%H",
                ('m', 2) => "%M",
                ('s', 2) => "%S",
                ('S', 3) => "%3f",
                ('S', 6) => "%6f",
                ('S', 9) => "%9f",
                _ => {
                    let token: String = std::iter::repeat_n(c, run).collect();
                    return Err(invalid(format!("unsupported pattern token '{}'", token)));
                }
            };
            out.push_str(directive);
            i += run;
        }

        Ok(Self {
            pattern: pattern.to_string(),
            chrono_pattern: out,
        })
    }

    /// The engine-side pattern, as declared in the index mapping.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The equivalent chrono format string.
    pub fn chrono_pattern(&self) -> &str {
        &self.chrono_pattern
    }

    /// Render a timestamp with this pattern.
    pub fn format(&self, at: &DateTime<Utc>) -> String {
        at.format(&self.chrono_pattern).to_string()
    }

    /// Parse a value rendered with this pattern. Date-only patterns resolve
    /// to midnight UTC.
    pub fn parse_datetime(&self, value: &str) -> Option<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, &self.chrono_pattern) {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(value, &self.chrono_pattern)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
