//! Query classifier (§4.1): a pure function from query text to
//! `{type, domain, complexity, requiresVerification, requiresRealtime,
//! requiresMultipleSources, controversial, keywords, confidence}`.
//!
//! Conversational queries are tested first and short-circuit verification.
//! Complexity is derived from word count plus clause/conditional markers.
//! The pattern catalog is bilingual (English/Spanish) to match the corpus's
//! preference for locale-agnostic regex classification over a single
//! hard-coded language.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Broad category of a user query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Factual,
    Research,
    Theoretical,
    Creative,
    CurrentEvents,
    Procedural,
    Conversational,
    Unknown,
}

/// Subject-matter domain hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Science,
    Mathematics,
    History,
    Technology,
    Medicine,
    Law,
    Philosophy,
    Creative,
    Logic,
    General,
    Unknown,
}

/// Estimated query complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Output of classifying a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub domain: Domain,
    pub complexity: Complexity,
    pub requires_verification: bool,
    pub requires_realtime: bool,
    pub requires_multiple_sources: bool,
    pub controversial: bool,
    pub keywords: Vec<String>,
    pub confidence: u8,
}

static CONVERSATIONAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(hi|hello|hey|thanks|thank you|ok(ay)?|bye|goodbye|hola|gracias|adi[oó]s)\b")
        .expect("invalid regex")
});

static CURRENT_EVENTS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(today|yesterday|this week|latest|current|breaking|right now|hoy|ahora|[uú]ltim[oa]s?)\b")
        .expect("invalid regex")
});

static RESEARCH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(study|studies|research|paper|evidence|meta-analysis|investigaci[oó]n|estudio)\b")
        .expect("invalid regex")
});

static THEORETICAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(why does|why is|how come|explain|theory|principle|teor[ií]a|por qu[eé])\b")
        .expect("invalid regex")
});

static PROCEDURAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(how (do|to)|steps? to|guide|tutorial|c[oó]mo (hacer|puedo))\b")
        .expect("invalid regex")
});

static CREATIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(write a|compose|imagine|poem|story|invent|escribe un|inventa)\b").expect("invalid regex")
});

static FACTUAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(what is|who is|when (was|did)|where is|qu[eé] es|qui[eé]n es)\b").expect("invalid regex")
});

static CONDITIONAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(if|unless|provided that|assuming|si\s)\b").expect("invalid regex"));

static CLAUSE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(and|but|because|although|however|therefore|pero|porque|aunque)\b").expect("invalid regex"));

static CONTROVERSIAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(controvers|debate|disput|pol[ée]mic|contested|divisive)\w*\b").expect("invalid regex")
});

static MULTI_SOURCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(compare|consensus|sources agree|different (views|opinions)|compar[ae])\b").expect("invalid regex")
});

static DOMAIN_SCIENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(physics|chemistry|biology|quantum|particle|gravity|ecosystem)\b").expect("invalid regex")
});
static DOMAIN_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(math|equation|theorem|proof|algebra|calculus|geometry)\b").expect("invalid regex"));
static DOMAIN_HISTORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(history|historical|century|ancient|empire|war of)\b").expect("invalid regex"));
static DOMAIN_TECHNOLOGY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(software|computer|algorithm|programming|internet|ai|technology)\b").expect("invalid regex")
});
static DOMAIN_MEDICINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(disease|treatment|symptom|medicine|medical|vaccine|diagnosis)\b").expect("invalid regex"));
static DOMAIN_LAW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(law|legal|court|statute|regulation|contract)\b").expect("invalid regex"));
static DOMAIN_PHILOSOPHY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(philosophy|ethics|morality|metaphysics|epistemology|existential)\b").expect("invalid regex")
});
static DOMAIN_LOGIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(logic|fallacy|syllogism|valid argument|premise)\b").expect("invalid regex"));

static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "is", "are", "was", "were", "what", "who", "when", "where", "why", "how", "and",
        "but", "for", "with", "this", "that", "does", "did", "you", "your", "can", "has", "have",
        "had", "from", "into", "about", "de", "la", "el", "que", "en", "los", "las", "una", "por",
    ]
    .into_iter()
    .collect()
});

/// Classify a query (§4.1). Pure function: no I/O, no shared state.
pub fn classify(query: &str) -> Classification {
    let trimmed = query.trim();

    if CONVERSATIONAL_PATTERN.is_match(trimmed) {
        return Classification {
            query_type: QueryType::Conversational,
            domain: Domain::General,
            complexity: Complexity::Simple,
            requires_verification: false,
            requires_realtime: false,
            requires_multiple_sources: false,
            controversial: false,
            keywords: extract_keywords(trimmed),
            confidence: 95,
        };
    }

    let query_type = classify_type(trimmed);
    let domain = classify_domain(trimmed);
    let complexity = classify_complexity(trimmed);
    let requires_realtime = CURRENT_EVENTS_PATTERN.is_match(trimmed) || query_type == QueryType::CurrentEvents;
    let controversial = CONTROVERSIAL_PATTERN.is_match(trimmed);
    let requires_multiple_sources = MULTI_SOURCE_PATTERN.is_match(trimmed) || controversial;
    let requires_verification = !matches!(query_type, QueryType::Creative | QueryType::Conversational);

    let keywords = extract_keywords(trimmed);

    let confidence = confidence_for(query_type, domain);

    Classification {
        query_type,
        domain,
        complexity,
        requires_verification,
        requires_realtime,
        requires_multiple_sources,
        controversial,
        keywords,
        confidence,
    }
}

fn classify_type(query: &str) -> QueryType {
    if CURRENT_EVENTS_PATTERN.is_match(query) {
        QueryType::CurrentEvents
    } else if RESEARCH_PATTERN.is_match(query) {
        QueryType::Research
    } else if PROCEDURAL_PATTERN.is_match(query) {
        QueryType::Procedural
    } else if CREATIVE_PATTERN.is_match(query) {
        QueryType::Creative
    } else if THEORETICAL_PATTERN.is_match(query) {
        QueryType::Theoretical
    } else if FACTUAL_PATTERN.is_match(query) {
        QueryType::Factual
    } else {
        QueryType::Unknown
    }
}

fn classify_domain(query: &str) -> Domain {
    if DOMAIN_SCIENCE.is_match(query) {
        Domain::Science
    } else if DOMAIN_MATH.is_match(query) {
        Domain::Mathematics
    } else if DOMAIN_HISTORY.is_match(query) {
        Domain::History
    } else if DOMAIN_TECHNOLOGY.is_match(query) {
        Domain::Technology
    } else if DOMAIN_MEDICINE.is_match(query) {
        Domain::Medicine
    } else if DOMAIN_LAW.is_match(query) {
        Domain::Law
    } else if DOMAIN_PHILOSOPHY.is_match(query) {
        Domain::Philosophy
    } else if DOMAIN_LOGIC.is_match(query) {
        Domain::Logic
    } else if CREATIVE_PATTERN.is_match(query) {
        Domain::Creative
    } else {
        Domain::Unknown
    }
}

fn classify_complexity(query: &str) -> Complexity {
    let word_count = query.split_whitespace().count();
    let clause_markers =
        CLAUSE_PATTERN.find_iter(query).count() + CONDITIONAL_PATTERN.find_iter(query).count();

    if word_count > 30 || clause_markers >= 3 {
        Complexity::Complex
    } else if word_count > 12 || clause_markers >= 1 {
        Complexity::Moderate
    } else {
        Complexity::Simple
    }
}

fn confidence_for(query_type: QueryType, domain: Domain) -> u8 {
    let mut confidence: u8 = 60;
    if query_type != QueryType::Unknown {
        confidence += 20;
    }
    if domain != Domain::Unknown {
        confidence += 10;
    }
    confidence.min(95)
}

/// Lowercased alphanumeric tokens minus the stopword set, length > 2.
fn extract_keywords(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_ascii_lowercase())
        .filter(|w| !STOPWORDS.contains(w.as_str()))
        .collect()
}
