//! Guardrail Classifier
//!
//! Pre-send safety gate for outgoing user messages. Every candidate message is
//! classified before any network call is made; the verdict decides whether the
//! turn may proceed, whether the user must explicitly confirm it, or whether it
//! is blocked outright.
//!
//! # Tiers
//!
//! Patterns are grouped into four tiers and checked most severe first. The
//! first tier with a matching pattern wins:
//!
//! | Tier        | Examples                                         | Allowed            | Confirm |
//! |-------------|--------------------------------------------------|--------------------|---------|
//! | `critical`  | namespace deletion, `--force --grace-period=0`, `-A` | only if not strict | yes |
//! | `dangerous` | deleting a deployment/service/pvc, scale to zero | yes                | yes     |
//! | `warning`   | deleting a pod, scaling, restarting, `prod`      | yes                | yes     |
//! | `safe`      | anything else                                    | yes                | no      |
//!
//! Matching is case-insensitive substring/pattern matching over the raw text.
//! The classifier is pure: same input, same verdict, no side effects.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity of an outgoing message
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No pattern matched
    Safe,
    /// Modifies cluster state in a recoverable way
    Warning,
    /// Deletes stateful or networking resources
    Dangerous,
    /// Cluster- or namespace-wide impact
    Critical,
}

impl RiskLevel {
    /// Wire/display name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Warning => "warning",
            Self::Dangerous => "dangerous",
            Self::Critical => "critical",
        }
    }

    /// Precautions worth showing next to a confirmation prompt
    #[must_use]
    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            Self::Safe => &[],
            Self::Warning => &[
                "Review the affected resources before proceeding",
                "Consider using --dry-run=client for verification",
            ],
            Self::Dangerous => &[
                "Use --dry-run=client to preview the operation",
                "Verify the target namespace and resources",
                "Consider backing up affected resources first",
            ],
            Self::Critical => &[
                "Consider using --dry-run=client first to preview changes",
                "Ensure you have recent backups before proceeding",
                "Verify you're operating on the correct cluster context",
                "Consider scheduling this during a maintenance window",
            ],
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one candidate message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    /// Whether the message may be sent at all
    pub allowed: bool,
    /// Whether the user must explicitly confirm before sending
    pub require_confirmation: bool,
    /// Winning tier
    pub risk_level: RiskLevel,
    /// Explanation of the first matching pattern (None when safe)
    pub reason: Option<String>,
}

impl GuardrailVerdict {
    /// Verdict for text that matched nothing
    #[must_use]
    pub fn safe() -> Self {
        Self {
            allowed: true,
            require_confirmation: false,
            risk_level: RiskLevel::Safe,
            reason: None,
        }
    }

    /// Whether the message must not be sent
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        !self.allowed
    }
}

/// Static description of one guardrail pattern
struct RuleSpec {
    pattern: &'static str,
    explanation: &'static str,
    /// `-A` and `-a` mean different things to kubectl
    case_sensitive: bool,
}

const fn rule(pattern: &'static str, explanation: &'static str) -> RuleSpec {
    RuleSpec {
        pattern,
        explanation,
        case_sensitive: false,
    }
}

const CRITICAL_RULES: &[RuleSpec] = &[
    rule(
        r"delete\s+(?:the\s+)?(?:namespace|ns)",
        "Deleting a namespace removes ALL resources within it permanently",
    ),
    rule(
        r"delete\s+all",
        "Deleting all resources can cause severe service disruption",
    ),
    rule(
        r"delete.*\s--all(?:\s|$)",
        "Deleting all resources can cause severe service disruption",
    ),
    rule(
        r"--force\b.*--grace-period[=\s]*0\b",
        "Force deletion bypasses graceful termination",
    ),
    rule(
        r"--grace-period[=\s]*0\b.*--force\b",
        "Force deletion bypasses graceful termination",
    ),
    rule(
        r"--all-namespaces\b",
        "Operation affects ALL namespaces in the cluster",
    ),
    RuleSpec {
        pattern: r"(?:^|\s)-A(?:\s|$)",
        explanation: "Operation affects ALL namespaces in the cluster",
        case_sensitive: true,
    },
    rule(
        r"(?:drain|delete)\s+(?:the\s+)?(?:node|no\b)",
        "Draining or deleting a node evicts every pod scheduled on it",
    ),
    rule(
        r"delete\s+(?:the\s+)?(?:(?:pv|persistentvolumes?)(?:[^c]|$)|clusterrole|crd|customresourcedefinition)",
        "Deleting cluster-scoped resources affects the whole cluster",
    ),
];

const DANGEROUS_RULES: &[RuleSpec] = &[
    rule(
        r"\bdelete\s+(?:the\s+)?(?:deployments?|deploy|statefulsets?|sts|daemonsets?|ds)\b",
        "Deleting a workload controller stops all of its pods",
    ),
    rule(
        r"\bdelete\s+(?:the\s+)?(?:pvc|persistentvolumeclaims?)\b",
        "Deleting PersistentVolumeClaims can cause data loss",
    ),
    rule(
        r"\bdelete\s+(?:the\s+)?(?:services?|svc|ingress(?:es)?|ing|networkpolic(?:y|ies)|netpol)\b",
        "Deleting networking resources breaks connectivity",
    ),
    rule(
        r"\bdelete\s+(?:the\s+)?(?:secrets?|configmaps?|cm)\b",
        "Deleting configuration can break dependent applications",
    ),
    rule(
        r"\bscale\b.*--replicas[=\s]+0\b",
        "Scaling to zero stops all pods",
    ),
    rule(
        r"\brollout\s+undo\b",
        "Rolling back can introduce previous bugs",
    ),
];

const WARNING_RULES: &[RuleSpec] = &[
    rule(
        r"\bdelete\s+(?:the\s+)?(?:pods?|po|jobs?|cronjobs?|cj)\b",
        "Deleting pods or jobs causes temporary unavailability",
    ),
    rule(
        r"\bscale\b",
        "Scaling changes the number of running pods",
    ),
    rule(
        r"\b(?:rollout\s+restart|restart)\b",
        "Restarting causes temporary pod unavailability",
    ),
    rule(
        r"\b(?:apply|patch|edit|replace)\b",
        "Applying changes modifies cluster state",
    ),
    rule(
        r"\b(?:cordon|uncordon|taint)\b",
        "Scheduling changes affect where pods can run",
    ),
    rule(
        r"\b(?:prod|production|live)\b",
        "Possible production environment detected - extra caution recommended",
    ),
];

struct GuardrailRule {
    pattern: Regex,
    explanation: &'static str,
}

impl GuardrailRule {
    fn compile(def: &RuleSpec) -> Self {
        let source = if def.case_sensitive {
            def.pattern.to_string()
        } else {
            format!("(?i){}", def.pattern)
        };
        Self {
            pattern: Regex::new(&source).expect("guardrail pattern must compile"),
            explanation: def.explanation,
        }
    }
}

fn compile_tier(defs: &[RuleSpec]) -> Vec<GuardrailRule> {
    defs.iter().map(GuardrailRule::compile).collect()
}

/// Deterministic tiered classifier for outgoing messages
pub struct GuardrailClassifier {
    strict: bool,
    /// Tiers in priority order, most severe first
    tiers: Vec<(RiskLevel, Vec<GuardrailRule>)>,
}

impl GuardrailClassifier {
    /// Create a classifier; `strict` blocks critical messages instead of
    /// asking for confirmation
    #[must_use]
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            tiers: vec![
                (RiskLevel::Critical, compile_tier(CRITICAL_RULES)),
                (RiskLevel::Dangerous, compile_tier(DANGEROUS_RULES)),
                (RiskLevel::Warning, compile_tier(WARNING_RULES)),
            ],
        }
    }

    /// Whether strict mode is on
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Toggle strict mode
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Classify a candidate outgoing message
    #[must_use]
    pub fn classify(&self, text: &str) -> GuardrailVerdict {
        for (level, rules) in &self.tiers {
            let Some(hit) = rules.iter().find(|r| r.pattern.is_match(text)) else {
                continue;
            };

            let allowed = !(self.strict && *level == RiskLevel::Critical);
            return GuardrailVerdict {
                allowed,
                require_confirmation: true,
                risk_level: *level,
                reason: Some(hit.explanation.to_string()),
            };
        }

        GuardrailVerdict::safe()
    }
}

impl Default for GuardrailClassifier {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for GuardrailClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailClassifier")
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Critical tier
    // ========================================================================

    #[test]
    fn test_namespace_deletion_is_critical_regardless_of_case() {
        let classifier = GuardrailClassifier::new(false);

        for text in [
            "delete namespace staging",
            "Please DELETE NAMESPACE staging right now",
            "kubectl Delete Namespace team-a",
            "could you delete ns payments?",
        ] {
            let verdict = classifier.classify(text);
            assert_eq!(verdict.risk_level, RiskLevel::Critical, "{text}");
            assert!(verdict.require_confirmation, "{text}");
            assert!(verdict.allowed, "{text}");
        }
    }

    #[test]
    fn test_critical_phrase_inside_longer_words() {
        let classifier = GuardrailClassifier::new(true);

        for text in [
            "delete namespace_staging",
            "kubectl delete namespace2",
            "undelete namespace foo",
            "delete nodes-pool-a",
            "kubectl delete pv/data-1",
            "delete clusterrolebinding-admin",
            "delete allocations",
        ] {
            let verdict = classifier.classify(text);
            assert_eq!(verdict.risk_level, RiskLevel::Critical, "{text}");
            assert!(verdict.require_confirmation, "{text}");
            assert!(verdict.is_blocked(), "{text}");
        }
    }

    #[test]
    fn test_strict_mode_blocks_critical() {
        let classifier = GuardrailClassifier::new(true);

        let verdict = classifier.classify("delete namespace production");
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
        assert!(verdict.require_confirmation);
        assert!(!verdict.allowed);
        assert!(verdict.is_blocked());
        assert!(verdict.reason.unwrap().contains("namespace"));
    }

    #[test]
    fn test_strict_mode_does_not_block_lower_tiers() {
        let classifier = GuardrailClassifier::new(true);

        let verdict = classifier.classify("delete deployment web");
        assert_eq!(verdict.risk_level, RiskLevel::Dangerous);
        assert!(verdict.allowed);
    }

    #[test]
    fn test_force_deletion_in_either_order() {
        let classifier = GuardrailClassifier::default();

        let a = classifier.classify("kubectl delete pod x --force --grace-period=0");
        let b = classifier.classify("kubectl delete pod x --grace-period=0 --force");
        assert_eq!(a.risk_level, RiskLevel::Critical);
        assert_eq!(b.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_all_namespaces_scope() {
        let classifier = GuardrailClassifier::default();

        assert_eq!(
            classifier.classify("get pods --all-namespaces").risk_level,
            RiskLevel::Critical
        );
        assert_eq!(
            classifier.classify("kubectl get pods -A").risk_level,
            RiskLevel::Critical
        );
        // Lowercase -a is a different flag
        assert_eq!(
            classifier.classify("kubectl logs -a").risk_level,
            RiskLevel::Safe
        );
    }

    #[test]
    fn test_delete_all() {
        let classifier = GuardrailClassifier::default();

        assert_eq!(
            classifier.classify("delete all pods in team-b").risk_level,
            RiskLevel::Critical
        );
        assert_eq!(
            classifier.classify("kubectl delete pods --all -n team-b").risk_level,
            RiskLevel::Critical
        );
    }

    // ========================================================================
    // Dangerous tier
    // ========================================================================

    #[test]
    fn test_scale_to_zero_is_dangerous() {
        let classifier = GuardrailClassifier::default();

        let verdict = classifier.classify("scale deployment foo --replicas=0");
        assert_eq!(
            verdict,
            GuardrailVerdict {
                allowed: true,
                require_confirmation: true,
                risk_level: RiskLevel::Dangerous,
                reason: Some("Scaling to zero stops all pods".to_string()),
            }
        );
    }

    #[test]
    fn test_scale_to_nonzero_is_only_warning() {
        let classifier = GuardrailClassifier::default();

        let verdict = classifier.classify("scale deployment foo --replicas=3");
        assert_eq!(verdict.risk_level, RiskLevel::Warning);
        assert!(verdict.require_confirmation);
    }

    #[test]
    fn test_stateful_and_networking_deletions() {
        let classifier = GuardrailClassifier::default();

        for text in [
            "delete statefulset db",
            "delete the deployment frontend",
            "delete svc api",
            "delete ingress public",
            "delete pvc data-0",
            "delete secret tls-cert",
        ] {
            assert_eq!(
                classifier.classify(text).risk_level,
                RiskLevel::Dangerous,
                "{text}"
            );
        }
    }

    #[test]
    fn test_pvc_is_not_confused_with_pv() {
        let classifier = GuardrailClassifier::default();

        assert_eq!(
            classifier.classify("delete pvc claim-1").risk_level,
            RiskLevel::Dangerous
        );
        assert_eq!(
            classifier.classify("delete pv volume-1").risk_level,
            RiskLevel::Critical
        );
    }

    // ========================================================================
    // Warning tier
    // ========================================================================

    #[test]
    fn test_warning_operations() {
        let classifier = GuardrailClassifier::default();

        for text in [
            "delete pod nginx-abc",
            "restart the api deployment",
            "kubectl rollout restart deploy/api",
            "apply this manifest",
            "patch the configmap",
            "check the prod cluster",
            "cordon worker-3",
        ] {
            let verdict = classifier.classify(text);
            assert_eq!(verdict.risk_level, RiskLevel::Warning, "{text}");
            assert!(verdict.allowed);
            assert!(verdict.require_confirmation);
        }
    }

    #[test]
    fn test_production_keyword_needs_word_boundary() {
        let classifier = GuardrailClassifier::default();

        assert_eq!(
            classifier.classify("show liveness checks").risk_level,
            RiskLevel::Safe
        );
        assert_eq!(
            classifier.classify("what is running in production?").risk_level,
            RiskLevel::Warning
        );
    }

    // ========================================================================
    // Safe tier and ordering
    // ========================================================================

    #[test]
    fn test_benign_input_is_safe() {
        let classifier = GuardrailClassifier::new(true);

        for text in [
            "show me pods in the default namespace",
            "why is my pod crashlooping?",
            "describe node worker-1",
            "",
        ] {
            assert_eq!(classifier.classify(text), GuardrailVerdict::safe(), "{text}");
        }
    }

    #[test]
    fn test_most_severe_tier_wins() {
        let classifier = GuardrailClassifier::default();

        // Mentions prod (warning) and namespace deletion (critical)
        let verdict = classifier.classify("delete namespace prod-payments");
        assert_eq!(verdict.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_recommendations_per_level() {
        assert!(RiskLevel::Safe.recommendations().is_empty());
        assert_eq!(RiskLevel::Warning.recommendations().len(), 2);
        assert_eq!(RiskLevel::Critical.recommendations().len(), 4);
        assert!(RiskLevel::Critical > RiskLevel::Dangerous);
    }

    #[test]
    fn test_set_strict_toggles_blocking() {
        let mut classifier = GuardrailClassifier::new(false);
        assert!(classifier.classify("delete ns a").allowed);

        classifier.set_strict(true);
        assert!(classifier.is_strict());
        assert!(!classifier.classify("delete ns a").allowed);
    }

    #[test]
    fn test_risk_level_serializes_lowercase() {
        let json = serde_json::to_string(&RiskLevel::Dangerous).unwrap();
        assert_eq!(json, "\"dangerous\"");
    }
}
