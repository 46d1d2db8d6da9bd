//! Search filters over instance data hashes
//!
//! Filters come from request options named `facts.<fact>[.<op>]` or
//! `meta.timestamp[.<op>]`. Every predicate must hold for an instance to
//! match. Options that do not start with `facts.` or `meta.` are ignored.

use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{IndirectorError, Result};
use crate::model::{parse_time, Instance};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FromStr for Op {
    type Err = IndirectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Op::Eq),
            "ne" => Ok(Op::Ne),
            "lt" => Ok(Op::Lt),
            "le" => Ok(Op::Le),
            "gt" => Ok(Op::Gt),
            "ge" => Ok(Op::Ge),
            other => Err(IndirectorError::Validation(format!(
                "Unknown search operator: {}",
                other
            ))),
        }
    }
}

impl Op {
    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Op::Eq => ordering == Equal,
            Op::Ne => ordering != Equal,
            Op::Lt => ordering == Less,
            Op::Le => ordering != Greater,
            Op::Gt => ordering == Greater,
            Op::Ge => ordering != Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Subject {
    Fact(String),
    Timestamp,
}

/// A single predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    subject: Subject,
    op: Op,
    value: String,
}

impl Predicate {
    /// Whether the predicate holds for an instance
    pub fn matches(&self, instance: &Instance) -> bool {
        match &self.subject {
            Subject::Fact(name) => match instance.fact(name) {
                Some(actual) => compare_fact(actual, self.op, &self.value),
                None => false,
            },
            Subject::Timestamp => match (instance.timestamp(), parse_time(&self.value)) {
                (Some(actual), Some(bound)) => self.op.holds(actual.cmp(&bound)),
                _ => false,
            },
        }
    }
}

fn fact_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_fact(actual: &Value, op: Op, expected: &str) -> bool {
    let actual = fact_string(actual);
    match op {
        Op::Eq => actual == expected,
        Op::Ne => actual != expected,
        _ => match (actual.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(a), Ok(b)) => a.partial_cmp(&b).map(|o| op.holds(o)).unwrap_or(false),
            _ => false,
        },
    }
}

/// Conjunction of predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Parse filters out of request parameters
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self> {
        let mut predicates = Vec::new();
        for (name, value) in params {
            if let Some(rest) = name.strip_prefix("facts.") {
                let (fact, op) = split_op(rest)?;
                if fact.is_empty() {
                    return Err(IndirectorError::Validation(format!(
                        "Search filter '{}' names no fact",
                        name
                    )));
                }
                predicates.push(Predicate {
                    subject: Subject::Fact(fact.to_string()),
                    op,
                    value: value.clone(),
                });
            } else if let Some(rest) = name.strip_prefix("meta.") {
                let (field, op) = split_op(rest)?;
                if field != "timestamp" {
                    return Err(IndirectorError::Validation(format!(
                        "Unknown metadata filter: {}",
                        field
                    )));
                }
                predicates.push(Predicate {
                    subject: Subject::Timestamp,
                    op,
                    value: value.clone(),
                });
            }
        }
        Ok(Self { predicates })
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        self.predicates.iter().all(|p| p.matches(instance))
    }

    /// Keep the matching instances
    pub fn apply(&self, instances: Vec<Instance>) -> Vec<Instance> {
        if self.is_empty() {
            return instances;
        }
        instances.into_iter().filter(|i| self.matches(i)).collect()
    }
}

// A trailing `.eq`/`.ne`/... segment is the operator; fact names may contain dots.
fn split_op(rest: &str) -> Result<(&str, Op)> {
    match rest.rsplit_once('.') {
        Some((head, tail)) if is_op_like(tail) => Ok((head, tail.parse()?)),
        _ => Ok((rest, Op::Eq)),
    }
}

fn is_op_like(segment: &str) -> bool {
    segment.len() == 2 && segment.chars().all(|c| c.is_ascii_lowercase())
}
