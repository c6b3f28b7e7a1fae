use std::collections::BTreeMap;

use regex::Regex;

use super::{DcgGain, Measure};
use crate::error::EvalError;

/// Parses a measure name such as `AP(rel=1,judged_only=False)@100`.
///
/// Omitted parameters take their defaults (`rel=1`, `judged_only=False`,
/// `dcg=log2`), so `P@10` and `P(rel=1,judged_only=False)@10` name the same
/// measure. The returned measure has been validated.
pub fn parse_measure(name: &str) -> Result<Measure, EvalError> {
    let pattern = Regex::new(r"^([A-Za-z_]+)(?:\(([^()]*)\))?(?:@([^@()]+))?$")
        .map_err(|error| EvalError::UnsupportedMeasure(error.to_string()))?;
    let trimmed = name.trim();
    let captures = pattern
        .captures(trimmed)
        .ok_or_else(|| EvalError::UnsupportedMeasure(trimmed.to_string()))?;

    let kind = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let mut params = Params::parse(trimmed, captures.get(2).map(|m| m.as_str()))?;
    let at = captures.get(3).map(|m| m.as_str().trim());

    let measure = match kind {
        "AP" => Measure::AveragePrecision {
            rel: params.rel()?,
            judged_only: params.judged_only()?,
            cutoff: optional_cutoff(trimmed, at)?,
        },
        "P" => Measure::Precision {
            rel: params.rel()?,
            judged_only: params.judged_only()?,
            cutoff: required_cutoff(trimmed, at)?,
        },
        "R" => Measure::Recall {
            rel: params.rel()?,
            judged_only: params.judged_only()?,
            cutoff: required_cutoff(trimmed, at)?,
        },
        "RR" => Measure::ReciprocalRank {
            rel: params.rel()?,
            judged_only: params.judged_only()?,
            cutoff: optional_cutoff(trimmed, at)?,
        },
        "Rprec" => {
            no_cutoff(trimmed, at)?;
            Measure::RPrecision {
                rel: params.rel()?,
                judged_only: params.judged_only()?,
            }
        }
        "nDCG" => Measure::Ndcg {
            dcg: params.dcg()?,
            judged_only: params.judged_only()?,
            cutoff: optional_cutoff(trimmed, at)?,
        },
        "IPrec" => Measure::InterpolatedPrecision {
            rel: params.rel()?,
            judged_only: params.judged_only()?,
            recall: at
                .and_then(|value| value.parse::<f64>().ok())
                .ok_or_else(|| EvalError::UnsupportedMeasure(trimmed.to_string()))?,
        },
        "Bpref" => {
            no_cutoff(trimmed, at)?;
            Measure::BinaryPreference { rel: params.rel()? }
        }
        "Judged" => Measure::Judged {
            cutoff: required_cutoff(trimmed, at)?,
        },
        "NumQ" => {
            no_cutoff(trimmed, at)?;
            Measure::NumQ
        }
        "NumRel" => {
            no_cutoff(trimmed, at)?;
            Measure::NumRel { rel: params.rel()? }
        }
        "NumRet" => {
            no_cutoff(trimmed, at)?;
            Measure::NumRet {
                rel: params.optional_int("rel")?,
            }
        }
        "Accuracy" => Measure::Accuracy {
            rel: params.rel()?,
            cutoff: required_cutoff(trimmed, at)?,
        },
        "alpha_DCG" => Measure::AlphaDcg {
            alpha: params.float_or("alpha", 0.5)?,
            rel: params.rel()?,
            judged_only: params.judged_only()?,
            cutoff: required_cutoff(trimmed, at)?,
        },
        "alpha_nDCG" => Measure::AlphaNdcg {
            alpha: params.float_or("alpha", 0.5)?,
            rel: params.rel()?,
            judged_only: params.judged_only()?,
            cutoff: required_cutoff(trimmed, at)?,
        },
        "AP_IA" => {
            no_cutoff(trimmed, at)?;
            Measure::IntentAwareAveragePrecision {
                rel: params.rel()?,
                judged_only: params.judged_only()?,
            }
        }
        "BPM" => Measure::BejeweledPlayerModel {
            t: params.float_or("T", 1.0)?,
            min_rel: params.optional_int("min_rel")?.unwrap_or(0),
            max_rel: params.optional_int("max_rel")?.unwrap_or(1),
            cutoff: required_cutoff(trimmed, at)?,
        },
        _ => return Err(EvalError::UnsupportedMeasure(trimmed.to_string())),
    };

    params.finish()?;
    measure.validate()?;
    Ok(measure)
}

struct Params<'a> {
    name: &'a str,
    values: BTreeMap<&'a str, &'a str>,
}

impl<'a> Params<'a> {
    fn parse(name: &'a str, raw: Option<&'a str>) -> Result<Self, EvalError> {
        let mut values = BTreeMap::new();
        for pair in raw.unwrap_or_default().split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| EvalError::UnsupportedMeasure(name.to_string()))?;
            if values.insert(key.trim(), value.trim()).is_some() {
                return Err(EvalError::UnsupportedMeasure(name.to_string()));
            }
        }
        Ok(Self { name, values })
    }

    fn malformed(&self) -> EvalError {
        EvalError::UnsupportedMeasure(self.name.to_string())
    }

    fn optional_int(&mut self, key: &str) -> Result<Option<i32>, EvalError> {
        match self.values.remove(key) {
            None => Ok(None),
            Some(value) => value.parse::<i32>().map(Some).map_err(|_| self.malformed()),
        }
    }

    fn rel(&mut self) -> Result<i32, EvalError> {
        Ok(self.optional_int("rel")?.unwrap_or(1))
    }

    fn judged_only(&mut self) -> Result<bool, EvalError> {
        match self.values.remove("judged_only") {
            None | Some("False") | Some("false") => Ok(false),
            Some("True") | Some("true") => Ok(true),
            Some(_) => Err(self.malformed()),
        }
    }

    fn dcg(&mut self) -> Result<DcgGain, EvalError> {
        match self.values.remove("dcg") {
            None | Some("log2") => Ok(DcgGain::Log2),
            Some("exp-log2") => Ok(DcgGain::ExpLog2),
            Some(_) => Err(self.malformed()),
        }
    }

    fn float_or(&mut self, key: &str, default: f64) -> Result<f64, EvalError> {
        match self.values.remove(key) {
            None => Ok(default),
            Some(value) => value.parse::<f64>().map_err(|_| self.malformed()),
        }
    }

    /// Any parameter left over is not understood by the measure kind.
    fn finish(self) -> Result<(), EvalError> {
        if self.values.is_empty() {
            Ok(())
        } else {
            Err(self.malformed())
        }
    }
}

fn parse_cutoff(name: &str, value: &str) -> Result<u32, EvalError> {
    // Negative or zero cutoffs parse here and are rejected by validation.
    value
        .parse::<i64>()
        .ok()
        .and_then(|cutoff| u32::try_from(cutoff.max(0)).ok())
        .ok_or_else(|| EvalError::UnsupportedMeasure(name.to_string()))
}

fn optional_cutoff(name: &str, at: Option<&str>) -> Result<Option<u32>, EvalError> {
    at.map(|value| parse_cutoff(name, value)).transpose()
}

fn required_cutoff(name: &str, at: Option<&str>) -> Result<u32, EvalError> {
    match at {
        Some(value) => parse_cutoff(name, value),
        None => Err(EvalError::UnsupportedMeasure(name.to_string())),
    }
}

fn no_cutoff(name: &str, at: Option<&str>) -> Result<(), EvalError> {
    match at {
        Some(_) => Err(EvalError::UnsupportedMeasure(name.to_string())),
        None => Ok(()),
    }
}
