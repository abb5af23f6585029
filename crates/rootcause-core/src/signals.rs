//! Text signals shared by the tracer and the classifier rules.

use regex::Regex;
use std::sync::OnceLock;

static CONFIG_ACCESS_RE: OnceLock<Regex> = OnceLock::new();
static STATE_UPDATE_RE: OnceLock<Regex> = OnceLock::new();
static NETWORK_FAILURE_RE: OnceLock<Regex> = OnceLock::new();
static SHAPE_MISMATCH_RE: OnceLock<Regex> = OnceLock::new();
static SCHEMA_TAG_RE: OnceLock<Regex> = OnceLock::new();
static CONFIG_TAG_RE: OnceLock<Regex> = OnceLock::new();
static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
static CONST_KEY_RE: OnceLock<Regex> = OnceLock::new();

fn config_access_re() -> &'static Regex {
    CONFIG_ACCESS_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:config(?:uration)?|settings?|env(?:ironment)?\s+var(?:iable)?s?|process\.env|getenv|os\.environ|feature[\s_\-]?flags?|required\s+key|secrets?)\b",
        )
        .unwrap()
    })
}

fn state_update_re() -> &'static Regex {
    STATE_UPDATE_RE.get_or_init(|| {
        Regex::new(
            r"\bset[A-Z]\w*|(?i:\b(?:setstate|dispatch(?:ed)?|state\s+(?:update|change)d?|store\s+updated?|reducer|mutation)\b)",
        )
        .unwrap()
    })
}

fn network_failure_re() -> &'static Regex {
    NETWORK_FAILURE_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:timed?\s*out|timeout|connection\s+(?:refused|reset|closed)|econnrefused|econnreset|enotfound|dns|network\s+error|unreachable)\b",
        )
        .unwrap()
    })
}

fn shape_mismatch_re() -> &'static Regex {
    SHAPE_MISMATCH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)unknown\s+variant|invalid\s+enum|unexpected\s+(?:value|type|field|shape)|not\s+one\s+of|expected\s+\w+,?\s+(?:got|found|received)|schema\s+(?:mismatch|violation|validation)|type\s+mismatch|invalid\s+type|missing\s+field|(?:cannot|failed\s+to)\s+deserialize",
        )
        .unwrap()
    })
}

fn schema_tag_re() -> &'static Regex {
    SCHEMA_TAG_RE.get_or_init(|| Regex::new(r"(?i)(?:^|[._\-])(?:schema|shape)(?:[._\-]|$)").unwrap())
}

fn config_tag_re() -> &'static Regex {
    CONFIG_TAG_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[._\-])(?:config|env|setting|settings|flag|secret)(?:[._\-]|$)").unwrap()
    })
}

fn quoted_re() -> &'static Regex {
    QUOTED_RE.get_or_init(|| Regex::new(r#"'([^'\s]{2,})'|"([^"\s]{2,})"|`([^`\s]{2,})`"#).unwrap())
}

fn const_key_re() -> &'static Regex {
    CONST_KEY_RE.get_or_init(|| Regex::new(r"\b[A-Z][A-Z0-9]*_[A-Z0-9_]+\b").unwrap())
}

/// Text reads or reports a configuration / environment lookup.
pub fn is_config_access(text: &str) -> bool {
    config_access_re().is_match(text)
}

pub fn is_state_update(text: &str) -> bool {
    state_update_re().is_match(text)
}

/// Transport-level failure wording for requests that never got a status.
pub fn is_network_failure(text: &str) -> bool {
    network_failure_re().is_match(text)
}

/// Type/shape mismatch or an enum value outside its known set.
pub fn is_shape_mismatch(text: &str) -> bool {
    shape_mismatch_re().is_match(text)
}

pub fn is_schema_tag(key: &str) -> bool {
    schema_tag_re().is_match(key)
}

pub fn is_config_tag(key: &str) -> bool {
    config_tag_re().is_match(key)
}

pub fn is_absent_value(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "null" | "undefined" | "none" | "nil" | "missing" | "unset" | "<unset>"
    )
}

/// Values the failure points at: quoted or backticked fragments and
/// `CONSTANT_STYLE` keys from the message, plus the crashing function's
/// unqualified name. Lowercased and deduplicated, in order of appearance.
pub fn implicated_tokens(message: &str, function: Option<&str>) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let token = raw.trim().to_lowercase();
        if token.len() >= 2 && !tokens.contains(&token) {
            tokens.push(token);
        }
    };

    for caps in quoted_re().captures_iter(message) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
            push(m.as_str());
        }
    }
    for m in const_key_re().find_iter(message) {
        push(m.as_str());
    }
    if let Some(func) = function {
        let name = func.rsplit(['.', ':']).next().unwrap_or(func);
        push(name.trim_end_matches("()"));
    }

    tokens
}
