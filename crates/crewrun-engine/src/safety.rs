//! Output safety gate: prohibited-content rejection and PII redaction.
//!
//! Every task output passes through the gate before it is committed.
//! Prohibited content rejects the output outright; detected PII is
//! rewritten in place and the output accepted in redacted form.

use regex::Regex;
use std::sync::Arc;

/// Gate decision for one task output.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Output is clean and passes through unchanged.
    Accept,
    /// PII was detected; the carried string is the redacted output.
    Redact(String),
    /// Prohibited content was detected; the carried string is the
    /// violation reason.
    Reject(String),
}

/// What the gate found, regardless of verdict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SafetyReport {
    /// PII pattern names that matched.
    pub pii_found: Vec<String>,
    /// Prohibited category that matched, if any.
    pub violation: Option<String>,
}

/// Verdict plus the detection detail behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub report: SafetyReport,
}

struct PiiRule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

struct CategoryRule {
    name: &'static str,
    pattern: Regex,
}

/// Inspects task outputs for prohibited content and PII.
///
/// Patterns are compiled once at construction; the gate is cheap to
/// clone and share across in-flight attempts.
#[derive(Clone)]
pub struct SafetyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    categories: Vec<CategoryRule>,
    pii: Vec<PiiRule>,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyGate {
    /// Build the gate with the standard rule set.
    pub fn new() -> Self {
        let categories = vec![
            CategoryRule {
                name: "violence",
                pattern: compile(r"(?i)\b(?:kill|murder|assault|attack)\s+(?:a\s+)?(?:person|people|someone|him|her|them)\b"),
            },
            CategoryRule {
                name: "weapons",
                pattern: compile(r"(?i)\b(?:build|make|construct|assemble)\s+(?:a\s+)?(?:bomb|explosive|weapon|firearm)\b"),
            },
            CategoryRule {
                name: "malware",
                pattern: compile(r"(?i)\b(?:write|create|deploy)\s+(?:a\s+)?(?:virus|malware|ransomware|keylogger)\b"),
            },
            CategoryRule {
                name: "self_harm",
                pattern: compile(r"(?i)\b(?:how\s+to\s+)?(?:harm|hurt|injure)\s+(?:yourself|myself|oneself)\b"),
            },
        ];

        let pii = vec![
            PiiRule {
                name: "email",
                pattern: compile(r"\b[A-Za-z0-9._%+-]+(@[A-Za-z0-9.-]+\.[A-Za-z]{2,})"),
                replacement: "[EMAIL]$1",
            },
            PiiRule {
                name: "ssn",
                pattern: compile(r"\b\d{3}[-.\s]\d{2}[-.\s]\d{4}\b"),
                replacement: "XXX-XX-XXXX",
            },
            PiiRule {
                name: "credit_card",
                pattern: compile(r"\b(?:\d[ -]?){13,16}\b"),
                replacement: "[CARD_REDACTED]",
            },
            PiiRule {
                name: "phone",
                pattern: compile(r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b"),
                replacement: "[PHONE_REDACTED]",
            },
            PiiRule {
                name: "ip_address",
                pattern: compile(r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
                replacement: "XXX.XXX.XXX.XXX",
            },
            PiiRule {
                name: "api_key",
                pattern: compile(r"\b[A-Za-z0-9_\-]*(?:key|token|secret)[A-Za-z0-9_\-]*[=:]\s*\S{16,}"),
                replacement: "[API_KEY_REDACTED]",
            },
        ];

        Self {
            inner: Arc::new(GateInner { categories, pii }),
        }
    }

    /// Evaluate one task output. Prohibited content wins over PII: a
    /// rejected output is never partially redacted and returned.
    pub fn evaluate(&self, content: &str) -> Evaluation {
        for rule in &self.inner.categories {
            if rule.pattern.is_match(content) {
                return Evaluation {
                    verdict: Verdict::Reject(format!("policy_violation:{}", rule.name)),
                    report: SafetyReport {
                        pii_found: Vec::new(),
                        violation: Some(rule.name.to_string()),
                    },
                };
            }
        }

        let mut redacted = content.to_string();
        let mut pii_found = Vec::new();
        for rule in &self.inner.pii {
            if rule.pattern.is_match(&redacted) {
                pii_found.push(rule.name.to_string());
                redacted = rule
                    .pattern
                    .replace_all(&redacted, rule.replacement)
                    .into_owned();
            }
        }

        if pii_found.is_empty() {
            Evaluation {
                verdict: Verdict::Accept,
                report: SafetyReport::default(),
            }
        } else {
            Evaluation {
                verdict: Verdict::Redact(redacted),
                report: SafetyReport {
                    pii_found,
                    violation: None,
                },
            }
        }
    }
}

fn compile(pattern: &str) -> Regex {
    // Patterns are fixed literals; compilation cannot fail at runtime.
    Regex::new(pattern).expect("static safety pattern")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_output_is_accepted() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("The quarterly report shows steady growth.");
        assert_eq!(eval.verdict, Verdict::Accept);
        assert!(eval.report.pii_found.is_empty());
    }

    #[test]
    fn test_prohibited_content_is_rejected() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("Step one: build a bomb in your garage.");
        assert_eq!(
            eval.verdict,
            Verdict::Reject("policy_violation:weapons".to_string())
        );
        assert_eq!(eval.report.violation.as_deref(), Some("weapons"));
    }

    #[test]
    fn test_rejection_wins_over_redaction() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("Contact bob@example.com about how to make a weapon today.");
        assert!(matches!(eval.verdict, Verdict::Reject(_)));
        assert!(eval.report.pii_found.is_empty());
    }

    #[test]
    fn test_email_keeps_domain() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("Reach me at alice.smith@corp.example.org for details.");
        match eval.verdict {
            Verdict::Redact(out) => {
                assert!(out.contains("[EMAIL]@corp.example.org"));
                assert!(!out.contains("alice.smith"));
            }
            other => panic!("expected redaction, got {other:?}"),
        }
        assert_eq!(eval.report.pii_found, vec!["email".to_string()]);
    }

    #[test]
    fn test_ssn_is_masked() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("SSN on file: 123-45-6789.");
        match eval.verdict {
            Verdict::Redact(out) => assert!(out.contains("XXX-XX-XXXX")),
            other => panic!("expected redaction, got {other:?}"),
        }
    }

    #[test]
    fn test_phone_is_redacted() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("Call (555) 867-5309 after lunch.");
        match eval.verdict {
            Verdict::Redact(out) => assert!(out.contains("[PHONE_REDACTED]")),
            other => panic!("expected redaction, got {other:?}"),
        }
    }

    #[test]
    fn test_credit_card_is_redacted() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("Charge card 4111 1111 1111 1111 for the renewal.");
        match eval.verdict {
            Verdict::Redact(out) => assert!(out.contains("[CARD_REDACTED]")),
            other => panic!("expected redaction, got {other:?}"),
        }
    }

    #[test]
    fn test_ip_address_is_masked() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("The host at 192.168.10.44 stopped responding.");
        match eval.verdict {
            Verdict::Redact(out) => {
                assert!(out.contains("XXX.XXX.XXX.XXX"));
                assert!(!out.contains("192.168.10.44"));
            }
            other => panic!("expected redaction, got {other:?}"),
        }
    }

    #[test]
    fn test_api_key_is_redacted() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("Set api_key=sk_live_abcdef1234567890XYZ in the env.");
        match eval.verdict {
            Verdict::Redact(out) => assert!(out.contains("[API_KEY_REDACTED]")),
            other => panic!("expected redaction, got {other:?}"),
        }
        assert!(eval.report.pii_found.contains(&"api_key".to_string()));
    }

    #[test]
    fn test_multiple_pii_kinds_reported() {
        let gate = SafetyGate::new();
        let eval = gate.evaluate("Email bob@x.io or call (555) 867-5309.");
        assert!(matches!(eval.verdict, Verdict::Redact(_)));
        assert!(eval.report.pii_found.len() >= 2);
    }
}
