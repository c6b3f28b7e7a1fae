use std::fmt;

use crate::error::{EvalError, FieldErrors};

mod backend;
mod calculation;
mod parse;
#[cfg(test)]
mod tests;

pub use backend::{EvaluationBackend, TrecBackend};
pub use calculation::{CachedMeasure, InMemoryMeasureCache, MeasureCache, MeasureCalculator};
pub use parse::parse_measure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcgGain {
    /// Gain equals the relevance grade.
    Log2,
    /// Gain is `2^grade - 1`.
    ExpLog2,
}

impl DcgGain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log2 => "log2",
            Self::ExpLog2 => "exp-log2",
        }
    }
}

/// An evaluation measure together with its parameters.
///
/// The canonical name (see [`Measure::canonical_name`]) is the cache key and
/// the identifier understood by [`parse_measure`].
#[derive(Debug, Clone, PartialEq)]
pub enum Measure {
    AveragePrecision {
        rel: i32,
        cutoff: Option<u32>,
        judged_only: bool,
    },
    Precision {
        rel: i32,
        cutoff: u32,
        judged_only: bool,
    },
    Recall {
        rel: i32,
        cutoff: u32,
        judged_only: bool,
    },
    ReciprocalRank {
        rel: i32,
        cutoff: Option<u32>,
        judged_only: bool,
    },
    RPrecision {
        rel: i32,
        judged_only: bool,
    },
    Ndcg {
        dcg: DcgGain,
        cutoff: Option<u32>,
        judged_only: bool,
    },
    InterpolatedPrecision {
        rel: i32,
        recall: f64,
        judged_only: bool,
    },
    BinaryPreference {
        rel: i32,
    },
    Judged {
        cutoff: u32,
    },
    NumQ,
    NumRel {
        rel: i32,
    },
    NumRet {
        rel: Option<i32>,
    },
    Accuracy {
        rel: i32,
        cutoff: u32,
    },
    AlphaDcg {
        alpha: f64,
        rel: i32,
        cutoff: u32,
        judged_only: bool,
    },
    AlphaNdcg {
        alpha: f64,
        rel: i32,
        cutoff: u32,
        judged_only: bool,
    },
    IntentAwareAveragePrecision {
        rel: i32,
        judged_only: bool,
    },
    BejeweledPlayerModel {
        t: f64,
        min_rel: i32,
        max_rel: i32,
        cutoff: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
}

impl Measure {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AveragePrecision { .. } => "Average Precision",
            Self::Precision { .. } => "Precision",
            Self::Recall { .. } => "Recall",
            Self::ReciprocalRank { .. } => "Reciprocal Rank",
            Self::RPrecision { .. } => "R-Precision",
            Self::Ndcg { .. } => "nDCG",
            Self::InterpolatedPrecision { .. } => "Interpolated Precision",
            Self::BinaryPreference { .. } => "Binary Preference",
            Self::Judged { .. } => "Judged",
            Self::NumQ => "Number of Queries",
            Self::NumRel { .. } => "Number of Relevant Documents",
            Self::NumRet { .. } => "Number of Results",
            Self::Accuracy { .. } => "Accuracy",
            Self::AlphaDcg { .. } => "Alpha DCG",
            Self::AlphaNdcg { .. } => "Alpha nDCG",
            Self::IntentAwareAveragePrecision { .. } => "Intent-aware Average Precision",
            Self::BejeweledPlayerModel { .. } => "Bejeweled Player Model",
        }
    }

    pub fn canonical_name(&self) -> String {
        match self {
            Self::AveragePrecision {
                rel,
                cutoff,
                judged_only,
            } => format!(
                "AP(rel={rel},judged_only={}){}",
                py_bool(*judged_only),
                at_cutoff(*cutoff)
            ),
            Self::Precision {
                rel,
                cutoff,
                judged_only,
            } => format!("P(rel={rel},judged_only={})@{cutoff}", py_bool(*judged_only)),
            Self::Recall {
                rel,
                cutoff,
                judged_only,
            } => format!("R(rel={rel},judged_only={})@{cutoff}", py_bool(*judged_only)),
            Self::ReciprocalRank {
                rel,
                cutoff,
                judged_only,
            } => format!(
                "RR(rel={rel},judged_only={}){}",
                py_bool(*judged_only),
                at_cutoff(*cutoff)
            ),
            Self::RPrecision { rel, judged_only } => {
                format!("Rprec(rel={rel},judged_only={})", py_bool(*judged_only))
            }
            Self::Ndcg {
                dcg,
                cutoff,
                judged_only,
            } => format!(
                "nDCG(dcg={},judged_only={}){}",
                dcg.as_str(),
                py_bool(*judged_only),
                at_cutoff(*cutoff)
            ),
            Self::InterpolatedPrecision {
                rel,
                recall,
                judged_only,
            } => format!(
                "IPrec(rel={rel},judged_only={})@{}",
                py_bool(*judged_only),
                py_float(*recall)
            ),
            Self::BinaryPreference { rel } => format!("Bpref(rel={rel})"),
            Self::Judged { cutoff } => format!("Judged@{cutoff}"),
            Self::NumQ => "NumQ".to_string(),
            Self::NumRel { rel } => format!("NumRel(rel={rel})"),
            Self::NumRet { rel: None } => "NumRet".to_string(),
            Self::NumRet { rel: Some(rel) } => format!("NumRet(rel={rel})"),
            Self::Accuracy { rel, cutoff } => format!("Accuracy(rel={rel})@{cutoff}"),
            Self::AlphaDcg {
                alpha,
                rel,
                cutoff,
                judged_only,
            } => format!(
                "alpha_DCG(alpha={},rel={rel},judged_only={})@{cutoff}",
                py_float(*alpha),
                py_bool(*judged_only)
            ),
            Self::AlphaNdcg {
                alpha,
                rel,
                cutoff,
                judged_only,
            } => format!(
                "alpha_nDCG(alpha={},rel={rel},judged_only={})@{cutoff}",
                py_float(*alpha),
                py_bool(*judged_only)
            ),
            Self::IntentAwareAveragePrecision { rel, judged_only } => {
                format!("AP_IA(rel={rel},judged_only={})", py_bool(*judged_only))
            }
            Self::BejeweledPlayerModel {
                t,
                min_rel,
                max_rel,
                cutoff,
            } => format!(
                "BPM(T={},min_rel={min_rel},max_rel={max_rel})@{cutoff}",
                py_float(*t)
            ),
        }
    }

    pub fn aggregation(&self) -> Aggregation {
        match self {
            Self::NumQ | Self::NumRel { .. } | Self::NumRet { .. } => Aggregation::Sum,
            _ => Aggregation::Mean,
        }
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        let mut errors = FieldErrors::new();

        let (rel, cutoff) = match self {
            Self::AveragePrecision { rel, cutoff, .. } | Self::ReciprocalRank { rel, cutoff, .. } => {
                (Some(*rel), *cutoff)
            }
            Self::Precision { rel, cutoff, .. }
            | Self::Recall { rel, cutoff, .. }
            | Self::Accuracy { rel, cutoff } => (Some(*rel), Some(*cutoff)),
            Self::AlphaDcg {
                rel, cutoff, alpha, ..
            }
            | Self::AlphaNdcg {
                rel, cutoff, alpha, ..
            } => {
                if !(0.0..=1.0).contains(alpha) {
                    errors.add("alpha", "must be between 0 and 1");
                }
                (Some(*rel), Some(*cutoff))
            }
            Self::RPrecision { rel, .. }
            | Self::BinaryPreference { rel }
            | Self::NumRel { rel }
            | Self::IntentAwareAveragePrecision { rel, .. } => (Some(*rel), None),
            Self::NumRet { rel } => (*rel, None),
            Self::InterpolatedPrecision { rel, recall, .. } => {
                if !(0.0..=1.0).contains(recall) {
                    errors.add("recall", "must be between 0 and 1");
                }
                (Some(*rel), None)
            }
            Self::Ndcg { cutoff, .. } => (None, *cutoff),
            Self::Judged { cutoff } => (None, Some(*cutoff)),
            Self::BejeweledPlayerModel {
                min_rel,
                max_rel,
                cutoff,
                t,
            } => {
                if *min_rel > *max_rel {
                    errors.add("min_rel", "must not exceed max_rel");
                }
                if !t.is_finite() {
                    errors.add("T", "must be a finite number");
                }
                (None, Some(*cutoff))
            }
            Self::NumQ => (None, None),
        };

        if rel.is_some_and(|rel| rel < 1) {
            errors.add("rel", "must be at least 1");
        }
        if cutoff.is_some_and(|cutoff| cutoff < 1) {
            errors.add("cutoff", "must be at least 1");
        }

        errors.into_result()
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Floats always carry a decimal point (`1.0`, `0.1`).
fn py_float(value: f64) -> String {
    let rendered = value.to_string();
    if rendered.contains(['.', 'e', 'E']) || !value.is_finite() {
        rendered
    } else {
        format!("{rendered}.0")
    }
}

fn at_cutoff(cutoff: Option<u32>) -> String {
    cutoff.map(|cutoff| format!("@{cutoff}")).unwrap_or_default()
}
