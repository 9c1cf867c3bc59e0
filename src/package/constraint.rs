//! Composer version constraints.
//!
//! Composer writes alternatives as `^1.1 || ^2.0` and conjunctions as
//! `>=1.0 <2.0` or `>=1.0, <2.0`. Each alternative is translated to a
//! [`VersionReq`], and a version satisfies the constraint if it matches any
//! of them.

use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version constraint `{constraint}`: {message}")]
pub struct ConstraintError {
    pub constraint: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Constraint {
    source: String,
    alternatives: Vec<VersionReq>,
}

impl Constraint {
    pub fn parse(constraint: &str) -> Result<Self, ConstraintError> {
        let error = |message: String| ConstraintError {
            constraint: constraint.to_owned(),
            message,
        };

        let alternatives = constraint
            .split('|')
            .filter(|branch| !branch.trim().is_empty())
            .map(|branch| {
                let req = translate(branch).ok_or_else(|| {
                    error(format!("empty alternative in `{}`", branch.trim()))
                })?;
                VersionReq::parse(&req).map_err(|err| error(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if alternatives.is_empty() {
            return Err(error("no alternatives".into()));
        }

        Ok(Self {
            source: constraint.trim().to_owned(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Rewrites one alternative into `semver` syntax, or returns `None` if it
/// has no terms.
fn translate(branch: &str) -> Option<String> {
    // stability flags such as `@dev` do not affect which versions match
    let branch = match branch.find('@') {
        Some(at) => &branch[..at],
        None => branch,
    };

    let tokens: Vec<&str> = branch
        .split([' ', '\t', ','])
        .filter(|token| !token.is_empty())
        .collect();

    let mut terms = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        // `1.0 - 2.0`
        if tokens.get(idx + 1) == Some(&"-") {
            if let Some(upper) = tokens.get(idx + 2) {
                terms.push(format!(">={}", strip_v(tokens[idx])));
                terms.push(format!("<={}", strip_v(upper)));
                idx += 3;
                continue;
            }
        }

        terms.push(term(tokens[idx]));
        idx += 1;
    }

    match terms.is_empty() {
        true => None,
        false => Some(terms.join(", ")),
    }
}

fn term(token: &str) -> String {
    let split = token
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '!' | '^' | '~'))
        .unwrap_or(token.len());
    let (op, version) = token.split_at(split);
    let version = strip_v(version);

    match op {
        // a bare version is exact, unlike in `semver`
        "" if version.starts_with(|c: char| c.is_ascii_digit())
            && !version.contains('*') =>
        {
            format!("={version}")
        }
        "==" => format!("={version}"),
        // `~1.2` allows every later 1.x release
        "~" => match version.split('.').collect::<Vec<_>>()[..] {
            [major, _] => match major.parse::<u64>() {
                Ok(major) => format!(">={version}, <{}", major + 1),
                Err(_) => format!("~{version}"),
            },
            _ => format!("~{version}"),
        },
        _ => format!("{op}{version}"),
    }
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix(['v', 'V'])
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(version)
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Constraint {
    type Error = ConstraintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Constraint> for String {
    fn from(constraint: Constraint) -> Self {
        constraint.source
    }
}
