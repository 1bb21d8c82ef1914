//! Inventory comparison
//!
//! Compares a candidate CBOM against a reference (ground-truth) CBOM by
//! solving a global assignment over pairwise asset similarities, then
//! thresholding each assigned pair. Global assignment rather than greedy
//! nearest-neighbor: two similar reference assets must not both claim the
//! same candidate.

mod assignment;
mod similarity;

pub use similarity::name_similarity;

use crate::cbom::Cbom;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Score weights: name similarity and primitive agreement, equal parts.
const NAME_WEIGHT: f64 = 0.5;
const PRIMITIVE_WEIGHT: f64 = 0.5;

pub const DEFAULT_THRESHOLD: f64 = 0.6;

const NO_GOOD_MATCH: &str = "no good match";

/// One reference asset's outcome. `target_id` is the matched candidate
/// asset; absent means the reference asset went unmatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMatch {
    pub reference_id: String,
    pub target_id: Option<String>,
    pub similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Comparison result. Metrics are in [0,1]; zero-sized inputs yield zero
/// metrics rather than dividing by zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub matches: Vec<AssetMatch>,
    pub confirmed: usize,
    pub missed: usize,
    pub spurious: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Algorithm asset reduced to the fields similarity looks at.
#[derive(Debug, Clone)]
struct AssetView {
    id: String,
    name: String,
    primitive: Option<String>,
}

fn asset_views(cbom: &Cbom) -> Vec<AssetView> {
    cbom.algorithm_components()
        .map(|component| AssetView {
            id: component
                .bom_ref
                .clone()
                .unwrap_or_else(|| component.name.clone()),
            name: component.name.clone(),
            primitive: component
                .crypto_properties
                .as_ref()
                .and_then(|props| props.algorithm_properties.as_ref())
                .and_then(|algo| algo.primitive.clone()),
        })
        .collect()
}

fn asset_similarity(a: &AssetView, b: &AssetView) -> f64 {
    let name_score = name_similarity(&a.name, &b.name);
    // Two assets with no recorded primitive agree on it.
    let primitive_score = if a.primitive == b.primitive { 1.0 } else { 0.0 };
    NAME_WEIGHT * name_score + PRIMITIVE_WEIGHT * primitive_score
}

pub struct Matcher {
    threshold: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Match the candidate inventory against the reference inventory.
    pub fn match_inventories(&self, reference: &Cbom, candidate: &Cbom) -> MatchReport {
        let reference_assets = asset_views(reference);
        let candidate_assets = asset_views(candidate);
        tracing::debug!(
            "Matching {} candidate assets against {} reference assets",
            candidate_assets.len(),
            reference_assets.len()
        );

        let n = reference_assets.len().max(candidate_assets.len());
        if n == 0 {
            return MatchReport {
                matches: Vec::new(),
                confirmed: 0,
                missed: 0,
                spurious: 0,
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
            };
        }

        // Square matrix padded with zero similarity; padding rows and
        // columns absorb the size mismatch.
        let mut sim = Array2::<f64>::zeros((n, n));
        for (i, reference_asset) in reference_assets.iter().enumerate() {
            for (j, candidate_asset) in candidate_assets.iter().enumerate() {
                sim[[i, j]] = asset_similarity(reference_asset, candidate_asset);
            }
        }
        let cost = sim.mapv(|score| 1.0 - score);
        let assignment = assignment::solve(&cost);

        let mut matches = Vec::new();
        let mut confirmed = 0;
        for (i, reference_asset) in reference_assets.iter().enumerate() {
            let j = assignment[i];
            // Pairs involving a padding column carry no candidate; they
            // surface only through the miss count.
            if j >= candidate_assets.len() {
                continue;
            }
            let score = sim[[i, j]];
            if score >= self.threshold {
                confirmed += 1;
                matches.push(AssetMatch {
                    reference_id: reference_asset.id.clone(),
                    target_id: Some(candidate_assets[j].id.clone()),
                    similarity: score,
                    note: None,
                });
            } else {
                matches.push(AssetMatch {
                    reference_id: reference_asset.id.clone(),
                    target_id: None,
                    similarity: score,
                    note: Some(NO_GOOD_MATCH.to_string()),
                });
            }
        }

        // The assignment is injective, so confirmed matches consume
        // exactly that many candidates.
        let missed = reference_assets.len() - confirmed;
        let spurious = candidate_assets.len() - confirmed;
        let precision = ratio(confirmed, confirmed + spurious);
        let recall = ratio(confirmed, confirmed + missed);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        MatchReport {
            matches,
            confirmed,
            missed,
            spurious,
            precision,
            recall,
            f1,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbom::{AlgorithmProperties, Component, CryptoProperties};

    fn asset(id: &str, name: &str, primitive: Option<&str>) -> Component {
        Component {
            component_type: "cryptographic-asset".to_string(),
            bom_ref: Some(id.to_string()),
            name: name.to_string(),
            crypto_properties: Some(CryptoProperties {
                asset_type: "algorithm".to_string(),
                algorithm_properties: Some(AlgorithmProperties {
                    primitive: primitive.map(str::to_string),
                    parameter_set_identifier: None,
                    crypto_functions: Vec::new(),
                }),
            }),
            properties: Vec::new(),
        }
    }

    fn inventory(components: Vec<Component>) -> Cbom {
        Cbom {
            bom_format: "CycloneDX".to_string(),
            spec_version: "1.6".to_string(),
            serial_number: None,
            version: 1,
            metadata: None,
            components,
        }
    }

    #[test]
    fn test_identical_inventories_match_fully() {
        let reference = inventory(vec![
            asset("r1", "AES-128-CBC", Some("symmetric")),
            asset("r2", "RSA", Some("asymmetric")),
        ]);
        let candidate = inventory(vec![
            asset("c1", "AES-128-CBC", Some("symmetric")),
            asset("c2", "RSA", Some("asymmetric")),
        ]);

        let report = Matcher::default().match_inventories(&reference, &candidate);
        assert_eq!(report.confirmed, 2);
        assert_eq!(report.missed, 0);
        assert_eq!(report.spurious, 0);
        assert_eq!(report.precision, 1.0);
        assert_eq!(report.recall, 1.0);
        assert_eq!(report.f1, 1.0);
        assert!(report.matches.iter().all(|m| m.target_id.is_some()));
    }

    #[test]
    fn test_renamed_asset_still_matches() {
        let reference = inventory(vec![asset("r1", "AES-128-CBC", Some("symmetric"))]);
        let candidate = inventory(vec![asset("c1", "cbc_aes_128", Some("symmetric"))]);

        let report = Matcher::default().match_inventories(&reference, &candidate);
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.matches[0].similarity, 1.0);
    }

    #[test]
    fn test_empty_candidate_yields_zero_metrics() {
        let reference = inventory(vec![asset("r1", "AES", Some("symmetric"))]);
        let candidate = inventory(Vec::new());

        let report = Matcher::default().match_inventories(&reference, &candidate);
        // The reference asset pairs with padding, so no entry is recorded.
        assert!(report.matches.is_empty());
        assert_eq!(report.confirmed, 0);
        assert_eq!(report.missed, 1);
        assert_eq!(report.spurious, 0);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.f1, 0.0);
    }

    #[test]
    fn test_both_empty_yields_zero_metrics() {
        let report =
            Matcher::default().match_inventories(&inventory(Vec::new()), &inventory(Vec::new()));
        assert!(report.matches.is_empty());
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.f1, 0.0);
    }

    #[test]
    fn test_below_threshold_pair_is_annotated() {
        let reference = inventory(vec![asset("r1", "RSA", Some("asymmetric"))]);
        let candidate = inventory(vec![asset("c1", "ChaCha20", Some("symmetric"))]);

        let report = Matcher::default().match_inventories(&reference, &candidate);
        assert_eq!(report.confirmed, 0);
        assert_eq!(report.missed, 1);
        assert_eq!(report.spurious, 1);
        let entry = &report.matches[0];
        assert!(entry.target_id.is_none());
        assert_eq!(entry.note.as_deref(), Some(NO_GOOD_MATCH));
    }

    #[test]
    fn test_primitive_agreement_alone_is_not_enough() {
        // Same primitive, unrelated names: 0.5 * low + 0.5 * 1.0 < 0.6.
        let reference = inventory(vec![asset("r1", "RSA", Some("asymmetric"))]);
        let candidate = inventory(vec![asset("c1", "ECDSA-P256", Some("asymmetric"))]);

        let report = Matcher::default().match_inventories(&reference, &candidate);
        assert_eq!(report.confirmed, 0);
    }

    #[test]
    fn test_assignment_prevents_double_claiming() {
        // Both reference assets resemble the single strong candidate; the
        // assignment gives it to one and leaves the other unmatched.
        let reference = inventory(vec![
            asset("r1", "AES-128-CBC", Some("symmetric")),
            asset("r2", "AES-128-CBC", Some("symmetric")),
        ]);
        let candidate = inventory(vec![
            asset("c1", "AES-128-CBC", Some("symmetric")),
            asset("c2", "RSA", Some("asymmetric")),
        ]);

        let report = Matcher::default().match_inventories(&reference, &candidate);
        assert_eq!(report.confirmed, 1);
        let winners: Vec<_> = report
            .matches
            .iter()
            .filter_map(|m| m.target_id.as_deref())
            .collect();
        assert_eq!(winners, vec!["c1"]);
    }

    #[test]
    fn test_surplus_candidates_count_as_spurious() {
        let reference = inventory(vec![asset("r1", "AES-128-CBC", Some("symmetric"))]);
        let candidate = inventory(vec![
            asset("c1", "AES-128-CBC", Some("symmetric")),
            asset("c2", "RSA", Some("asymmetric")),
            asset("c3", "SHA256", Some("hash")),
        ]);

        let report = Matcher::default().match_inventories(&reference, &candidate);
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.spurious, 2);
        assert!((report.precision - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.recall, 1.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // Same primitive (0.5) plus a weak name component crosses 0.6
        // only when the combined score reaches the threshold exactly.
        let reference = inventory(vec![asset("r1", "AES", Some("symmetric"))]);
        let candidate = inventory(vec![asset("c1", "AES", Some("symmetric"))]);

        let report = Matcher::new(1.0).match_inventories(&reference, &candidate);
        assert_eq!(report.confirmed, 1);
    }

    #[test]
    fn test_missing_bom_ref_falls_back_to_name() {
        let mut component = asset("unused", "AES", Some("symmetric"));
        component.bom_ref = None;
        let reference = inventory(vec![component]);
        let candidate = inventory(vec![asset("c1", "AES", Some("symmetric"))]);

        let report = Matcher::default().match_inventories(&reference, &candidate);
        assert_eq!(report.matches[0].reference_id, "AES");
    }

    #[test]
    fn test_report_serializes_to_json() {
        let reference = inventory(vec![asset("r1", "AES", Some("symmetric"))]);
        let candidate = inventory(vec![asset("c1", "AES", Some("symmetric"))]);
        let report = Matcher::default().match_inventories(&reference, &candidate);

        let json = serde_json::to_string(&report).unwrap();
        let parsed: MatchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.confirmed, report.confirmed);
        assert_eq!(parsed.matches.len(), 1);
        // Confirmed entries omit the note field entirely.
        assert!(!json.contains("note"));
    }
}
