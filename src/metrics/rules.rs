//! Normalization rules mapping raw document text onto the closed enumerations
//!
//! Each keyword table is an ordered list of `(trigger, output)` pairs evaluated
//! front to back, so the first matching trigger decides the result.

use super::model::{DataType, Level, Period};
use crate::error::AppError;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use regex::Regex;
use std::sync::OnceLock;

/// Data type triggers, tested against the lower-cased type cell
const DATA_TYPE_RULES: &[(&str, DataType)] = &[
    ("integer", DataType::Integer),
    ("count", DataType::Integer),
    ("number", DataType::Integer),
    ("float", DataType::Float),
    ("decimal", DataType::Float),
    ("earnings", DataType::Float),
    ("json", DataType::Json),
    ("breakdown", DataType::Json),
    ("object", DataType::Json),
];

struct LevelRule {
    trigger: &'static str,
    unless: Option<&'static str>,
    level: Level,
}

/// Level triggers, tested against the lower-cased section heading
const LEVEL_RULES: &[LevelRule] = &[
    LevelRule { trigger: "post", unless: Some("page"), level: Level::Item },
    LevelRule { trigger: "video", unless: None, level: Level::Media },
    LevelRule { trigger: "monetization", unless: None, level: Level::Monetization },
    LevelRule { trigger: "earnings", unless: None, level: Level::Monetization },
    LevelRule { trigger: "reels", unless: None, level: Level::ShortForm },
    LevelRule { trigger: "story", unless: None, level: Level::Story },
];

/// Tag triggers, tested against `"{name} {description}"` lower-cased
const TAG_RULES: &[(&str, &str)] = &[
    ("impression", "impressions"),
    ("engagement", "engagement"),
    ("video", "video"),
    ("paid", "paid"),
    ("organic", "organic"),
    ("viral", "viral"),
    ("unique", "unique"),
    ("reaction", "reactions"),
    ("follow", "follows"),
    ("fan", "fans"),
    ("view", "views"),
    ("click", "clicks"),
    ("complete", "completion"),
    ("repeat", "repeat"),
    ("autoplay", "autoplay"),
    ("demographic", "demographics"),
    ("geographic", "geographic"),
    ("locale", "locale"),
    ("country", "country"),
    ("city", "city"),
    ("age", "age"),
    ("gender", "gender"),
    ("earnings", "earnings"),
    ("monetization", "monetization"),
];

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn twenty_eight_days() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"28_days?").expect("static regex"))
}

fn tag_automaton() -> &'static AhoCorasick {
    static AC: OnceLock<AhoCorasick> = OnceLock::new();
    AC.get_or_init(|| {
        AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(TAG_RULES.iter().map(|(trigger, _)| *trigger))
            .expect("static tag patterns")
    })
}

/// Map a period token onto the closed period set.
///
/// Fails with `InvalidPeriod` when no synonym applies; callers own the fallback.
pub fn normalize_period(text: &str) -> Result<Period, AppError> {
    let lowered = text.trim().to_lowercase();
    let collapsed = whitespace_run().replace_all(&lowered, "_");
    let canonical = twenty_eight_days()
        .replace_all(&collapsed, "days_28")
        .replace("monthly", "month");

    match canonical.as_str() {
        "day" => Ok(Period::Day),
        "week" => Ok(Period::Week),
        "days_28" => Ok(Period::Days28),
        "month" => Ok(Period::Month),
        "lifetime" => Ok(Period::Lifetime),
        _ => Err(AppError::InvalidPeriod(text.to_string())),
    }
}

/// Infer the value type from free-form type text. `String` is the universal fallback.
pub fn normalize_data_type(text: &str) -> DataType {
    let lowered = text.to_lowercase();
    DATA_TYPE_RULES
        .iter()
        .find(|(trigger, _)| lowered.contains(trigger))
        .map(|(_, data_type)| *data_type)
        .unwrap_or(DataType::String)
}

/// Infer the product surface from a section heading, defaulting to `top`
pub fn infer_level(section_title: &str) -> Level {
    let title = section_title.to_lowercase();
    LEVEL_RULES
        .iter()
        .find(|rule| {
            title.contains(rule.trigger) && rule.unless.map_or(true, |veto| !title.contains(veto))
        })
        .map(|rule| rule.level)
        .unwrap_or(Level::Top)
}

/// Derive descriptive tags from a metric's name and description.
///
/// Tags come out in trigger-table order, each at most once.
pub fn extract_tags(name: &str, description: &str) -> Vec<String> {
    let text = format!("{} {}", name, description);
    let mut hit = vec![false; TAG_RULES.len()];
    for m in tag_automaton().find_overlapping_iter(&text) {
        hit[m.pattern().as_usize()] = true;
    }

    let mut tags: Vec<String> = Vec::new();
    for (idx, (_, tag)) in TAG_RULES.iter().enumerate() {
        if hit[idx] && !tags.iter().any(|t| t == tag) {
            tags.push((*tag).to_string());
        }
    }
    tags
}
