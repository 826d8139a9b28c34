//! `{{name}}` substitution for command templates.
//!
//! `{{timestamp}}` is built in; every other placeholder resolves against the
//! run parameters. Unknown placeholders are left verbatim.

use crate::config::Params;
use chrono::{DateTime, Local};
use regex::{Captures, Regex};
use std::sync::OnceLock;

pub const TIMESTAMP: &str = "timestamp";

/// `YYYYMMDDhhmmss`, always 14 digits.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern is valid"))
}

pub fn format_timestamp(now: &DateTime<Local>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Substitute using the current wall-clock time.
///
/// Call this right before the command runs so `{{timestamp}}` reflects
/// invocation time.
pub fn populate(template: &str, params: &Params) -> String {
    populate_at(template, params, &Local::now())
}

/// Single left-to-right pass: substituted values are never rescanned.
pub fn populate_at(template: &str, params: &Params, now: &DateTime<Local>) -> String {
    let timestamp = format_timestamp(now);

    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            if name == TIMESTAMP {
                timestamp.clone()
            } else {
                params
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            }
        })
        .into_owned()
}

/// Placeholder names in order of appearance, duplicates included.
pub fn placeholders(template: &str) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Placeholders in `template` that neither `params` nor the built-ins resolve.
pub fn unresolved(template: &str, params: &Params) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in placeholders(template) {
        if name != TIMESTAMP && !params.contains_key(&name) && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
