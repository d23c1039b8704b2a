//! Disinformation filter: multi-signal scoring applied to unverified
//! content (§4.3). Layered, additive weights, capped at 100.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Category of disinformation detected in content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectedType {
    KnownDisinfoSource,
    SatireAsNews,
    EmotionalManipulation,
    ConspiracyLanguage,
    VagueAttribution,
    AbsoluteClaim,
    ArtificialUrgency,
    ScientificMisinformation,
    FabricatedContent,
    StaleAsCurrent,
}

/// Severity bucket derived from the aggregate risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What a caller should do with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Accept,
    Review,
    Flag,
    Block,
}

/// Result of scoring a piece of web content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisinformationAnalysis {
    pub risk_score: u8,
    pub detected_types: Vec<DetectedType>,
    pub severity: Severity,
    pub indicators: Vec<String>,
    pub recommendation: Recommendation,
    pub explanation: String,
    pub confidence: u8,
}

/// Optional metadata about content under analysis (age, declared author).
#[derive(Debug, Clone, Default)]
pub struct ContentMetadata {
    pub age_days: Option<u32>,
    pub uses_present_time_language: bool,
}

static KNOWN_DISINFO_DOMAINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "infowars.com",
        "naturalnews.com",
        "beforeitsnews.com",
        "worldtruth.tv",
    ]
    .into_iter()
    .collect()
});

static SATIRE_DOMAINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "theonion.com",
        "babylonbee.com",
        "clickhole.com",
        "thedailymash.co.uk",
    ]
    .into_iter()
    .collect()
});

static FACT_CHECKER_DOMAINS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ["snopes.com", "factcheck.org", "politifact.com", "apnews.com"]
        .into_iter()
        .collect()
});

static SUSPICIOUS_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(tk|ml|ga|cf)$|-news\d*\.(com|net|info)$").expect("invalid regex"));

static EMOTIONAL_MANIPULATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(shocking|outrageous|terrifying|heartbreaking|unbelievable|devastating)\b")
        .expect("invalid regex")
});

static CONSPIRACY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(cover[- ]?up|deep state|they don't want you to know|wake up|mainstream media won't tell you|secret agenda)\b")
        .expect("invalid regex")
});

static VAGUE_ATTRIBUTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(experts say|sources say|some say|people are saying|many believe|it is said)\b")
        .expect("invalid regex")
});

static ABSOLUTE_CLAIM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(always|never|every single|100% proven|guaranteed|undeniable fact)\b")
        .expect("invalid regex")
});

static ARTIFICIAL_URGENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(share before it's deleted|act now|they're deleting this|before it's too late|urgent)\b")
        .expect("invalid regex")
});

static SCIENTIFIC_CONSENSUS_TOPIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(vaccines cause autism|earth is flat|climate change is a hoax|evolution is fake)\b")
        .expect("invalid regex")
});

static FABRICATED_CONTENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(fabricated|fake quote|doctored|manufactured evidence)\b").expect("invalid regex")
});

/// Score `(url, content, metadata)` and classify the risk (§4.3).
pub fn analyze(url: &str, content: &str, metadata: Option<&ContentMetadata>) -> DisinformationAnalysis {
    let host = normalize_host(url);
    let mut score: u32 = 0;
    let mut detected = Vec::new();
    let mut indicators = Vec::new();

    // Source layer.
    let is_known_disinfo = KNOWN_DISINFO_DOMAINS.contains(host.as_str());
    if is_known_disinfo {
        score += 50;
        detected.push(DetectedType::KnownDisinfoSource);
        indicators.push("KNOWN_DISINFO_DOMAIN".to_string());
    }
    let is_satire = SATIRE_DOMAINS.contains(host.as_str());
    if is_satire {
        score += 30;
        detected.push(DetectedType::SatireAsNews);
        indicators.push("SATIRE_SOURCE".to_string());
    }
    if SUSPICIOUS_URL_PATTERN.is_match(&host) {
        score += 15;
        indicators.push("SUSPICIOUS_URL_PATTERN".to_string());
    }

    // Content layer.
    let emotional_n = EMOTIONAL_MANIPULATION_PATTERN.find_iter(content).count();
    if emotional_n > 0 {
        score += (5 * emotional_n).min(25) as u32;
        detected.push(DetectedType::EmotionalManipulation);
        indicators.push(format!("EMOTIONAL_MANIPULATION x{emotional_n}"));
    }
    let conspiracy_n = CONSPIRACY_PATTERN.find_iter(content).count();
    if conspiracy_n > 0 {
        score += (10 * conspiracy_n).min(40) as u32;
        detected.push(DetectedType::ConspiracyLanguage);
        indicators.push(format!("CONSPIRACY_LANGUAGE x{conspiracy_n}"));
    }
    let vague_n = VAGUE_ATTRIBUTION_PATTERN.find_iter(content).count();
    if vague_n > 2 {
        score += (3 * vague_n).min(15) as u32;
        detected.push(DetectedType::VagueAttribution);
        indicators.push(format!("VAGUE_ATTRIBUTION x{vague_n}"));
    }
    if caps_ratio(content) > 0.15 {
        score += 10;
        indicators.push("EXCESSIVE_CAPS".to_string());
    }
    if exclamation_ratio(content) > 0.3 {
        score += 8;
        indicators.push("EXCESSIVE_EXCLAMATION".to_string());
    }

    // Claims layer.
    if ABSOLUTE_CLAIM_PATTERN.is_match(content) {
        score += 15;
        detected.push(DetectedType::AbsoluteClaim);
        indicators.push("ABSOLUTE_CLAIM".to_string());
    }
    if ARTIFICIAL_URGENCY_PATTERN.is_match(content) {
        score += 12;
        detected.push(DetectedType::ArtificialUrgency);
        indicators.push("ARTIFICIAL_URGENCY".to_string());
    }

    // Scientific layer.
    let consensus_hits = SCIENTIFIC_CONSENSUS_TOPIC_PATTERN.find_iter(content).count();
    if consensus_hits > 0 {
        score += (35 * consensus_hits) as u32;
        detected.push(DetectedType::ScientificMisinformation);
        indicators.push("CONTRADICTS_SCIENTIFIC_CONSENSUS".to_string());
    }

    // Fabrication signal, needed for the severity-forcing rule below.
    if FABRICATED_CONTENT_PATTERN.is_match(content) {
        detected.push(DetectedType::FabricatedContent);
        indicators.push("FABRICATED_CONTENT".to_string());
    }

    // Temporal layer.
    if let Some(meta) = metadata {
        if let Some(age) = meta.age_days {
            if age > 365 && meta.uses_present_time_language {
                score += 25;
                detected.push(DetectedType::StaleAsCurrent);
                indicators.push("STALE_CONTENT_PRESENTED_AS_CURRENT".to_string());
            }
        }
    }

    let risk_score = score.min(100) as u8;

    let forces_critical = detected.contains(&DetectedType::FabricatedContent)
        || detected.contains(&DetectedType::ScientificMisinformation);
    let severity = if forces_critical {
        Severity::Critical
    } else if risk_score >= 70 {
        Severity::Critical
    } else if risk_score >= 45 {
        Severity::High
    } else if risk_score >= 25 {
        Severity::Medium
    } else {
        Severity::Low
    };

    let is_fact_checker = FACT_CHECKER_DOMAINS.contains(host.as_str());
    let recommendation = if is_known_disinfo {
        Recommendation::Block
    } else if is_fact_checker {
        Recommendation::Accept
    } else {
        match severity {
            Severity::Critical => Recommendation::Block,
            Severity::High => Recommendation::Flag,
            Severity::Medium => Recommendation::Review,
            Severity::Low => Recommendation::Accept,
        }
    };

    let confidence = (50 + 10 * indicators.len() as u32).min(95) as u8;

    let explanation = if indicators.is_empty() {
        "no disinformation signals detected".to_string()
    } else {
        format!("{} signal(s): {}", indicators.len(), indicators.join(", "))
    };

    DisinformationAnalysis {
        risk_score,
        detected_types: detected,
        severity,
        indicators,
        recommendation,
        explanation,
        confidence,
    }
}

fn normalize_host(url: &str) -> String {
    let without_scheme = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);
    host.trim_start_matches("www.").to_ascii_lowercase()
}

fn caps_ratio(content: &str) -> f64 {
    let letters: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64
}

fn exclamation_ratio(content: &str) -> f64 {
    let sentences = content
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let exclamations = content.matches('!').count();
    exclamations as f64 / sentences as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn neutral_content_is_accepted() {
        let result = analyze("https://example.com/article", "Water boils at 100 degrees Celsius.", None);
        assert_eq!(result.recommendation, Recommendation::Accept);
        assert_eq!(result.severity, Severity::Low);
    }

    #[test]
    fn known_disinfo_domain_forces_block() {
        let result = analyze("https://infowars.com/story", "A calm, neutral statement.", None);
        assert_eq!(result.recommendation, Recommendation::Block);
        assert!(result.detected_types.contains(&DetectedType::KnownDisinfoSource));
    }

    #[test]
    fn satire_source_is_flagged_scenario_5() {
        let result = analyze("https://theonion.com/article", "A neutral, unremarkable news story.", None);
        assert!(result.indicators.iter().any(|i| i == "SATIRE_SOURCE"));
        assert!(result.detected_types.contains(&DetectedType::SatireAsNews));
        if result.risk_score >= 25 {
            assert_ne!(result.recommendation, Recommendation::Accept);
        }
    }

    #[test]
    fn fact_checker_domain_is_accepted_even_with_mild_signals() {
        let result = analyze("https://snopes.com/fact-check", "Experts say this claim is false.", None);
        assert_eq!(result.recommendation, Recommendation::Accept);
    }

    #[test]
    fn fabricated_content_forces_critical() {
        let result = analyze(
            "https://example.com/a",
            "This quote was fabricated and doctored for effect.",
            None,
        );
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn risk_score_and_confidence_are_bounded() {
        let content = "SHOCKING cover-up! wake up! deep state! 100% proven! act now before it's deleted! vaccines cause autism! fabricated doctored manufactured evidence!";
        let result = analyze("https://infowars.com/x", content, None);
        assert!(result.risk_score <= 100);
        assert!(result.confidence >= 50 && result.confidence <= 95);
    }

    #[test]
    fn stale_content_with_present_tense_is_flagged() {
        let meta = ContentMetadata {
            age_days: Some(400),
            uses_present_time_language: true,
        };
        let result = analyze("https://example.com/old", "This is happening right now.", Some(&meta));
        assert!(result.detected_types.contains(&DetectedType::StaleAsCurrent));
    }
}
