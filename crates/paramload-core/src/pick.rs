//! Pick policies: choosing one value from a parameter's candidates
//!
//! A policy consumes a lazy [`Candidates`] sequence and returns one value. It
//! must record, exactly once, a provenance congruent with that value through
//! [`Candidates::set_provenance`].

use crate::value::Provenance;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A candidate value and where it came from
pub type Candidate = (Value, Provenance);

/// Lazy, fallible sequence of candidates
pub type CandidateIter<'a> = Box<dyn Iterator<Item = Result<Candidate>> + 'a>;

/// The candidates of one parameter, plus the provenance slot a policy fills in
pub struct Candidates<'a> {
    param: String,
    inner: CandidateIter<'a>,
    provenance: Option<Provenance>,
}

impl<'a> Candidates<'a> {
    pub fn new(param: impl Into<String>, inner: CandidateIter<'a>) -> Self {
        Self {
            param: param.into(),
            inner,
            provenance: None,
        }
    }

    /// Label of the parameter the candidates belong to
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Values-only view; provenance is dropped
    pub fn values(&mut self) -> impl Iterator<Item = Result<Value>> + '_ {
        self.inner.by_ref().map(|item| item.map(|(value, _)| value))
    }

    /// Record the provenance of the picked value; may be called only once
    pub fn set_provenance(&mut self, provenance: Provenance) -> Result<()> {
        if self.provenance.is_some() {
            return Err(Error::usage(format!(
                "pick for {} set its provenance twice",
                self.param
            )));
        }
        self.provenance = Some(provenance);
        Ok(())
    }

    /// The provenance recorded by the policy, if any
    pub fn into_provenance(self) -> Option<Provenance> {
        self.provenance
    }
}

impl Iterator for Candidates<'_> {
    type Item = Result<Candidate>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Signature of a custom pick policy
pub type PickFn = Arc<dyn Fn(&mut Candidates<'_>) -> Result<Value> + Send + Sync>;

/// How a parameter's final value is chosen
#[derive(Clone)]
pub enum Pick {
    /// The first candidate, or `default` when there is none
    First(Option<Value>),
    /// Every candidate, as a list
    List,
    /// Union of every mapping-valued candidate
    MergeDicts { keep_last: bool },
    Custom(PickFn),
}

impl Default for Pick {
    fn default() -> Self {
        Self::First(None)
    }
}

impl Pick {
    pub fn custom<F>(pick: F) -> Self
    where
        F: Fn(&mut Candidates<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(pick))
    }

    pub fn pick(&self, candidates: &mut Candidates<'_>) -> Result<Value> {
        match self {
            Self::First(default) => match (first(candidates), default) {
                (Err(Error::NoValueFound { .. }), Some(default)) => {
                    candidates.set_provenance(Provenance::skeleton(default))?;
                    Ok(default.clone())
                }
                (result, _) => result,
            },
            Self::List => list(candidates),
            Self::MergeDicts { keep_last } => merge_dicts(candidates, *keep_last),
            Self::Custom(pick) => pick(candidates),
        }
    }
}

impl fmt::Debug for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First(default) => f.debug_tuple("First").field(default).finish(),
            Self::List => f.write_str("List"),
            Self::MergeDicts { keep_last } => f
                .debug_struct("MergeDicts")
                .field("keep_last", keep_last)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Take the head of the sequence; later candidates are never produced
pub fn first(candidates: &mut Candidates<'_>) -> Result<Value> {
    match candidates.next() {
        Some(item) => {
            let (value, provenance) = item?;
            candidates.set_provenance(provenance)?;
            Ok(value)
        }
        None => Err(Error::NoValueFound {
            param: candidates.param().to_string(),
        }),
    }
}

/// Collect every candidate into a list, with a parallel list of provenances
pub fn list(candidates: &mut Candidates<'_>) -> Result<Value> {
    let mut values = Vec::new();
    let mut provenances = Vec::new();
    for item in candidates.by_ref() {
        let (value, provenance) = item?;
        values.push(value);
        provenances.push(provenance);
    }
    candidates.set_provenance(Provenance::List(provenances))?;
    Ok(Value::Array(values))
}

/// Merge mapping-valued candidates key by key.
///
/// On a key collision the earlier candidate wins unless `keep_last` is set.
/// Each key's provenance is that of the candidate that set its final value.
pub fn merge_dicts(candidates: &mut Candidates<'_>, keep_last: bool) -> Result<Value> {
    let mut merged = Map::new();
    let mut provenances = BTreeMap::new();

    while let Some(item) = candidates.next() {
        let (value, provenance) = item?;
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::InvalidValue {
                    param: candidates.param().to_string(),
                    message: format!("expected a mapping, got {}", other),
                });
            }
        };
        for (key, value) in map {
            if keep_last || !merged.contains_key(&key) {
                provenances.insert(key.clone(), provenance.clone());
                merged.insert(key, value);
            }
        }
    }

    candidates.set_provenance(Provenance::Map(provenances))?;
    Ok(Value::Object(merged))
}
