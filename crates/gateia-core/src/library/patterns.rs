//! Detection patterns shared by the built-in policies.
//!
//! All patterns are heuristics. They catch common shapes of sensitive
//! content and will miss some of it.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    // =========================================================================
    // PII
    // =========================================================================

    /// Email address (RFC 5322 simplified)
    pub static ref EMAIL_PATTERN: Regex = Regex::new(
        r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"
    ).unwrap();

    /// US phone number with optional country code
    pub static ref PHONE_US_PATTERN: Regex = Regex::new(
        r"(?:\+?1[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b"
    ).unwrap();

    /// International number written with a leading `+`
    pub static ref PHONE_INTL_PATTERN: Regex = Regex::new(
        r"\+\d{1,3}[\s.-]?(?:\d{1,4}[\s.-]?){2,4}\d\b"
    ).unwrap();

    /// SSN shape. Area/group/serial ranges are checked by [`contains_ssn`].
    pub static ref SSN_PATTERN: Regex = Regex::new(
        r"\b(\d{3})[- ]?(\d{2})[- ]?(\d{4})\b"
    ).unwrap();

    /// 13 to 19 digits with optional space/dash separators
    pub static ref CREDIT_CARD_PATTERN: Regex = Regex::new(
        r"\b(?:\d[ -]*?){13,19}\b"
    ).unwrap();

    pub static ref IPV4_PATTERN: Regex = Regex::new(
        r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b"
    ).unwrap();

    /// Full (uncompressed) IPv6 form
    pub static ref IPV6_PATTERN: Regex = Regex::new(
        r"\b(?:[a-fA-F0-9]{1,4}:){7}[a-fA-F0-9]{1,4}\b"
    ).unwrap();

    /// Date of birth as YYYY-MM-DD or YYYY/MM/DD
    pub static ref DOB_PATTERN: Regex = Regex::new(
        r"\b(?:19|20)\d{2}[-/](?:0?[1-9]|1[0-2])[-/](?:0?[1-9]|[12]\d|3[01])\b"
    ).unwrap();

    // =========================================================================
    // CREDENTIALS
    // =========================================================================

    /// (display name, pattern)
    pub static ref SECRET_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("OpenAI Key", Regex::new(r"\bsk-[a-zA-Z0-9]{20,}\b").unwrap()),
        ("AWS Access Key", Regex::new(r"\bAKIA[0-9A-Z]{16}\b").unwrap()),
        ("AWS Secret Key", Regex::new(
            r"(?i)\b(?:aws|amazon)?[_-]?secret[_-]?access[_-]?key\b.{0,20}[A-Za-z0-9/+=]{40}\b"
        ).unwrap()),
        ("Private Key", Regex::new(
            r"-----BEGIN (?:RSA |EC |DSA |PGP |OPENSSH )?PRIVATE KEY-----"
        ).unwrap()),
        ("GitHub Token", Regex::new(r"\bghp_[a-zA-Z0-9]{36}\b").unwrap()),
        ("GitHub Fine-grained Token", Regex::new(r"\bgithub_pat_[a-zA-Z0-9_]{82}\b").unwrap()),
        ("Slack Token", Regex::new(r"\bxox[baprs]-[A-Za-z0-9-]{10,}\b").unwrap()),
        ("Stripe Secret Key", Regex::new(r"\bsk_live_[A-Za-z0-9]{24}\b").unwrap()),
        ("Stripe Restricted Key", Regex::new(r"\brk_live_[A-Za-z0-9]{24}\b").unwrap()),
        ("Twilio API Key", Regex::new(r"\bSK[0-9a-fA-F]{32}\b").unwrap()),
        ("Mailgun API Key", Regex::new(r"\bkey-[0-9a-fA-F]{32}\b").unwrap()),
        ("Google API Key", Regex::new(r"\bAIza[0-9A-Za-z_-]{35}\b").unwrap()),
        ("JWT", Regex::new(r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\b").unwrap()),
    ];

    // =========================================================================
    // MARKUP
    // =========================================================================

    /// (display name, pattern)
    pub static ref MARKUP_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("Script Tag", Regex::new(r"(?i)<script[\s>/]").unwrap()),
        ("Iframe Tag", Regex::new(r"(?i)<iframe[\s>/]").unwrap()),
        ("Object Tag", Regex::new(r"(?i)<object[\s>/]").unwrap()),
        ("Embed Tag", Regex::new(r"(?i)<embed[\s>/]").unwrap()),
        ("Inline Event Handler", Regex::new(r"(?i)<[a-z][^>]*[\s/]on[a-z]+\s*=").unwrap()),
        ("Javascript Protocol", Regex::new(r"(?i)javascript\s*:").unwrap()),
        ("HTML Data URL", Regex::new(r"(?i)data:\s*text/html").unwrap()),
    ];

    // =========================================================================
    // GUARANTEE LANGUAGE
    // =========================================================================

    pub static ref GUARANTEE_PHRASES: Vec<&'static str> = vec![
        "guaranteed refund", "guaranteed return", "guaranteed approval",
        "guaranteed payout", "guaranteed profit", "guaranteed results",
        "risk free", "risk-free", "no risk", "zero risk",
        "100% guaranteed", "one hundred percent guaranteed",
        "we will always refund", "we always refund", "instant refund",
        "automatic refund", "refund assured", "money back guaranteed",
        "guaranteed money back",
    ];

    /// (evidence label, pattern)
    pub static ref GUARANTEE_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("guarantee-claim", Regex::new(
            r"(?i)\bguarantee(?:d|s|ing)?\b.{0,24}\b(?:refund|return|approval|payout|profit|results)\b"
        ).unwrap()),
        ("guarantee-claim", Regex::new(
            r"(?i)\b(?:refund|return|approval|payout|profit|results)\b.{0,24}\bguarantee(?:d|s|ing)?\b"
        ).unwrap()),
        ("absolute-percentage", Regex::new(
            r"(?i)\b100\s*%|\b100\s*percent\b|\b100\s*per\s*cent\b"
        ).unwrap()),
        ("no-risk", Regex::new(r"(?i)\bno\s+risk\b|\bzero\s+risk\b|\brisk[-\s]?free\b").unwrap()),
        ("absolute-refund", Regex::new(r"(?i)\b(?:always|never)\b.{0,24}\brefund").unwrap()),
    ];
}

/// Text a built-in policy scans: strings as-is, anything else as compact JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn contains_email(content: &str) -> bool {
    EMAIL_PATTERN.is_match(content)
}

pub fn contains_phone(content: &str) -> bool {
    PHONE_US_PATTERN.is_match(content) || PHONE_INTL_PATTERN.is_match(content)
}

/// SSN shape with a valid area (not 000, 666 or 9xx), group (not 00) and
/// serial (not 0000).
pub fn contains_ssn(content: &str) -> bool {
    SSN_PATTERN.captures_iter(content).any(|caps| {
        let area = &caps[1];
        let group = &caps[2];
        let serial = &caps[3];
        area != "000" && area != "666" && !area.starts_with('9') && group != "00" && serial != "0000"
    })
}

pub fn contains_credit_card(content: &str) -> bool {
    CREDIT_CARD_PATTERN.is_match(content)
}

pub fn contains_ip(content: &str) -> bool {
    IPV4_PATTERN.is_match(content) || IPV6_PATTERN.is_match(content)
}

pub fn contains_dob(content: &str) -> bool {
    DOB_PATTERN.is_match(content)
}
