//! Optional post-enrichment ML hook.
//!
//! A deliberately narrow interface: the scorer sees assembled records
//! and may only attach an [`MlAssessment`] or nothing. It runs in
//! batches after enrichment, never blocks emission, and any internal
//! failure degrades to `ml = null` with a warning.
//!
//! The model is a logistic regression over hand-picked record features;
//! weights load from a JSON file or fall back to the built-in set.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::scan::enrich::urlscan::Verdict;
use crate::scan::errors::FatalError;
use crate::scan::permutation::Fuzzer;
use crate::scan::record::PermutationRecord;
use crate::scan::whois;

/// Records scored per batch.
pub const BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MlVerdict {
    Typosquat,
    Legitimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlAssessment {
    pub risk: u8,
    pub confidence: f64,
    pub verdict: MlVerdict,
    pub needs_review: bool,
    pub explanation: String,
}

fn default_threshold() -> f64 {
    0.5
}

/// On-disk model shape.
#[derive(Debug, Clone, Deserialize)]
struct MlModel {
    #[serde(default)]
    weights: HashMap<String, f64>,
    #[serde(default)]
    bias: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
}

pub struct MlScorer {
    model: MlModel,
    uncertainty: f64,
}

impl MlScorer {
    /// `path = None` uses the built-in weights. A present-but-broken
    /// model file is a configuration error.
    pub fn from_path(
        path: Option<&Path>,
        confidence_threshold: f64,
        uncertainty: f64,
    ) -> Result<MlScorer, FatalError> {
        let mut model = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    FatalError::config(format!("ml model {}: {}", path.display(), err))
                })?;
                serde_json::from_str::<MlModel>(&raw).map_err(|err| {
                    FatalError::config(format!("ml model {}: {}", path.display(), err))
                })?
            }
            None => builtin_model(),
        };
        if confidence_threshold > 0.0 {
            model.threshold = confidence_threshold;
        }
        Ok(MlScorer { model, uncertainty })
    }

    /// Attach assessments in batches. Strictly additive: existing
    /// fields are never touched, a failed assessment stays null.
    pub fn apply(&self, records: &mut [PermutationRecord], now: DateTime<Utc>) {
        for batch in records.chunks_mut(BATCH_SIZE) {
            for record in batch.iter_mut() {
                match self.assess(record, now) {
                    Some(assessment) => record.ml = Some(assessment),
                    None => {
                        log::warn!("ml assessment failed for {}, leaving null", record.domain);
                        record.ml = None;
                    }
                }
            }
        }
    }

    fn assess(&self, record: &PermutationRecord, now: DateTime<Utc>) -> Option<MlAssessment> {
        let features = features(record, now);
        let mut z = self.model.bias;
        let mut contributions: Vec<(&'static str, f64)> = Vec::new();
        for (name, value) in features.iter().copied() {
            let weight = self.model.weights.get(name).copied().unwrap_or(0.0);
            let contribution = weight * value;
            z += contribution;
            if contribution.abs() > f64::EPSILON {
                contributions.push((name, contribution));
            }
        }
        if !z.is_finite() {
            return None;
        }

        let p = 1.0 / (1.0 + (-z).exp());
        contributions.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let explanation = if contributions.is_empty() {
            "no contributing signals".to_string()
        } else {
            contributions
                .iter()
                .take(3)
                .map(|(name, contribution)| format!("{} ({:+.2})", name, contribution))
                .collect::<Vec<_>>()
                .join(", ")
        };

        Some(MlAssessment {
            risk: (p * 100.0).round().clamp(0.0, 100.0) as u8,
            confidence: p,
            verdict: if p >= self.model.threshold {
                MlVerdict::Typosquat
            } else {
                MlVerdict::Legitimate
            },
            needs_review: (p - 0.5).abs() <= self.uncertainty,
            explanation,
        })
    }

    /// Active-learning selection: up to `budget` records whose
    /// confidence sits closest to the decision boundary.
    pub fn select_for_review(
        &self,
        records: &[PermutationRecord],
        budget: usize,
    ) -> Vec<PermutationRecord> {
        let mut uncertain: Vec<&PermutationRecord> = records
            .iter()
            .filter(|record| {
                record
                    .ml
                    .as_ref()
                    .map_or(false, |assessment| assessment.needs_review)
            })
            .collect();
        uncertain.sort_by(|a, b| {
            let da = distance_from_boundary(a);
            let db = distance_from_boundary(b);
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        uncertain.into_iter().take(budget).cloned().collect()
    }
}

fn distance_from_boundary(record: &PermutationRecord) -> f64 {
    record
        .ml
        .as_ref()
        .map_or(f64::MAX, |assessment| (assessment.confidence - 0.5).abs())
}

fn features(record: &PermutationRecord, now: DateTime<Utc>) -> Vec<(&'static str, f64)> {
    let recent = record.whois.creation_date.map_or(0.0, |created| {
        let age = (now - created).num_days();
        if (0..=90).contains(&age) {
            1.0
        } else {
            0.0
        }
    });
    let (urlscan_malicious, urlscan_suspicious) = match &record.threat_intel.urlscan {
        Some(result) if result.verdict == Verdict::Malicious => (1.0, 0.0),
        Some(result) if result.verdict == Verdict::Suspicious => (0.0, 1.0),
        _ => (0.0, 0.0),
    };

    vec![
        ("risk_score", f64::from(record.risk_score) / 100.0),
        (
            "fuzzer_homoglyph",
            matches!(record.fuzzer, Fuzzer::Homoglyph | Fuzzer::IdnHomograph) as u8 as f64,
        ),
        (
            "fuzzer_combo",
            matches!(record.fuzzer, Fuzzer::Combo | Fuzzer::Subdomain) as u8 as f64,
        ),
        ("recent_registration", recent),
        ("urlscan_malicious", urlscan_malicious),
        ("urlscan_suspicious", urlscan_suspicious),
        (
            "http_active",
            record
                .threat_intel
                .http_probe
                .as_ref()
                .map_or(0.0, |probe| probe.active as u8 as f64),
        ),
        (
            "ct_present",
            record
                .threat_intel
                .certificate_transparency
                .as_ref()
                .map_or(0.0, |ct| (ct.count >= 1) as u8 as f64),
        ),
        (
            "mx_present",
            (!record.dns.mx.is_empty()) as u8 as f64,
        ),
        (
            "privacy_whois",
            whois::uses_privacy_service(&record.whois) as u8 as f64,
        ),
    ]
}

fn builtin_model() -> MlModel {
    let weights = [
        ("risk_score", 3.2),
        ("fuzzer_homoglyph", 1.1),
        ("fuzzer_combo", 0.7),
        ("recent_registration", 1.4),
        ("urlscan_malicious", 2.5),
        ("urlscan_suspicious", 1.2),
        ("http_active", 0.6),
        ("ct_present", 0.3),
        ("mx_present", 0.8),
        ("privacy_whois", 0.5),
    ]
    .into_iter()
    .map(|(name, weight)| (name.to_string(), weight))
    .collect();

    MlModel {
        weights,
        bias: -2.4,
        threshold: 0.5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::record::{PermutationRecord, ThreatIntel};
    use crate::scan::resolver::DnsRecords;
    use crate::scan::whois::WhoisRecord;
    use chrono::Duration;

    fn record(fuzzer: Fuzzer, risk: u8) -> PermutationRecord {
        PermutationRecord {
            seed: "example.com".to_string(),
            domain: "exmple.com".to_string(),
            fuzzer,
            registered: true,
            dns: DnsRecords::default(),
            whois: WhoisRecord::default(),
            threat_intel: ThreatIntel::default(),
            risk_score: risk,
            ml: None,
        }
    }

    fn scorer() -> MlScorer {
        MlScorer::from_path(None, 0.5, 0.1).expect("builtin model")
    }

    #[test]
    fn assessment_is_attached_and_bounded() {
        let scorer = scorer();
        let mut records = vec![record(Fuzzer::Homoglyph, 80), record(Fuzzer::TldSwap, 0)];
        scorer.apply(&mut records, Utc::now());
        for r in &records {
            let ml = r.ml.as_ref().expect("assessment attached");
            assert!(ml.risk <= 100);
            assert!((0.0..=1.0).contains(&ml.confidence));
            assert!(!ml.explanation.is_empty());
        }
    }

    #[test]
    fn higher_signals_mean_higher_confidence() {
        let scorer = scorer();
        let now = Utc::now();

        let mut hot = record(Fuzzer::Homoglyph, 90);
        hot.whois.creation_date = Some(now - Duration::days(2));
        let mut cold = record(Fuzzer::TldSwap, 0);

        scorer.apply(std::slice::from_mut(&mut hot), now);
        scorer.apply(std::slice::from_mut(&mut cold), now);

        let hot_ml = hot.ml.expect("hot assessment");
        let cold_ml = cold.ml.expect("cold assessment");
        assert!(hot_ml.confidence > cold_ml.confidence);
        assert_eq!(hot_ml.verdict, MlVerdict::Typosquat);
        assert_eq!(cold_ml.verdict, MlVerdict::Legitimate);
    }

    #[test]
    fn assessment_is_deterministic() {
        let scorer = scorer();
        let now = Utc::now();
        let mut a = record(Fuzzer::Combo, 40);
        let mut b = record(Fuzzer::Combo, 40);
        scorer.apply(std::slice::from_mut(&mut a), now);
        scorer.apply(std::slice::from_mut(&mut b), now);
        assert_eq!(a.ml, b.ml);
    }

    #[test]
    fn review_selection_respects_budget_and_band() {
        let scorer = scorer();
        let now = Utc::now();
        let mut records: Vec<PermutationRecord> = (0..20)
            .map(|i| {
                let mut r = record(Fuzzer::Omission, (i * 5) as u8);
                r.domain = format!("candidate{:02}.com", i);
                r
            })
            .collect();
        scorer.apply(&mut records, now);

        let review = scorer.select_for_review(&records, 3);
        assert!(review.len() <= 3);
        for picked in &review {
            let ml = picked.ml.as_ref().expect("assessment");
            assert!(ml.needs_review);
            assert!((ml.confidence - 0.5).abs() <= 0.1);
        }
    }

    #[test]
    fn model_file_overrides_builtin_weights() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"weights": {"risk_score": 10.0}, "bias": -5.0, "threshold": 0.9}"#,
        )
        .expect("write model");

        let scorer = MlScorer::from_path(Some(&path), 0.0, 0.1).expect("load model");
        let mut high = record(Fuzzer::Omission, 100);
        scorer.apply(std::slice::from_mut(&mut high), Utc::now());
        // z = 10*1.0 - 5.0 = 5 -> p ~ 0.993
        let ml = high.ml.expect("assessment");
        assert!(ml.confidence > 0.99);
        assert_eq!(ml.verdict, MlVerdict::Typosquat);
    }

    #[test]
    fn broken_model_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(MlScorer::from_path(Some(&path), 0.5, 0.1).is_err());
    }
}
