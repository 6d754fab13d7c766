//! Reminder command parser.
//!
//! Input is checked in two stages:
//! 1. shape: `<16 chars of digits . : whitespace><one whitespace><message>`
//! 2. calendar: the 16-char field must be a real `dd.MM.yyyy HH:mm` value.
//!
//! Keeping the stages apart lets the message grammar be swapped without
//! touching date validation. Character classes are ASCII: `\s` means
//! `[ \t\n\x0B\x0C\r]` and a word character is `[0-9A-Za-z_]`, so Cyrillic
//! or emoji text counts as "non-word" under the strict grammar.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDateTime};
use regex::Regex;
use remindclaw_core::config::MessageGrammar;
use thiserror::Error;

/// Exact command that triggers the welcome reply.
pub const START_COMMAND: &str = "/start";

/// Pattern of the date/time field.
pub const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

static STRICT_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9.: \t\n\x0B\x0C\r]{16})[ \t\n\x0B\x0C\r]([^0-9A-Za-z_]+)$")
        .expect("strict reminder pattern is valid")
});

static RELAXED_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^([0-9.: \t\n\x0B\x0C\r]{16})[ \t\n\x0B\x0C\r](.+)$")
        .expect("relaxed reminder pattern is valid")
});

static DATE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{2}\.[0-9]{2}\.[0-9]{4} [0-9]{2}:[0-9]{2}$")
        .expect("date field pattern is valid")
});

/// What an inbound text asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    ScheduleRequest {
        due_at: NaiveDateTime,
        message: String,
    },
    Rejected(ParseRejection),
}

/// Why a text was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRejection {
    #[error("text does not match the reminder format")]
    NotRecognized,
    #[error("date/time '{0}' is not a valid calendar value")]
    InvalidCalendarValue(String),
}

/// Parse with the default (strict) message grammar.
pub fn parse(text: &str) -> Intent {
    parse_with(text, MessageGrammar::Strict)
}

/// Parse with an explicit message grammar.
pub fn parse_with(text: &str, grammar: MessageGrammar) -> Intent {
    if text == START_COMMAND {
        return Intent::Greeting;
    }

    let Some((field, message)) = match_shape(text, grammar) else {
        return Intent::Rejected(ParseRejection::NotRecognized);
    };

    match parse_due_at(field) {
        Ok(due_at) => Intent::ScheduleRequest {
            due_at,
            message: message.to_string(),
        },
        Err(rejection) => Intent::Rejected(rejection),
    }
}

/// Stage one: split `text` into the date/time field and the message.
pub fn match_shape(text: &str, grammar: MessageGrammar) -> Option<(&str, &str)> {
    let pattern = match grammar {
        MessageGrammar::Strict => &*STRICT_SHAPE,
        MessageGrammar::Relaxed => &*RELAXED_SHAPE,
    };
    let caps = pattern.captures(text)?;
    let field = caps.get(1)?.as_str();
    let message = caps.get(2)?.as_str();
    if grammar == MessageGrammar::Relaxed && message.trim().is_empty() {
        return None;
    }
    Some((field, message))
}

/// Stage two: turn the 16-char field into a naive timestamp. A field with
/// the wrong layout, an impossible date or year 0000 is an invalid value.
pub fn parse_due_at(field: &str) -> Result<NaiveDateTime, ParseRejection> {
    let invalid = || ParseRejection::InvalidCalendarValue(field.to_string());
    if !DATE_FIELD.is_match(field) {
        return Err(invalid());
    }
    let due_at = NaiveDateTime::parse_from_str(field, DATE_TIME_FORMAT).map_err(|_| invalid())?;
    if due_at.year() < 1 {
        return Err(invalid());
    }
    Ok(due_at)
}
