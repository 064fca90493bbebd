//! Bind fixture loading and management.
//!
//! A fixture case names the port a server asks for, the environment it runs
//! under and what the kernel should end up binding. Ports may be given as
//! numbers or as the `$FREE_PORT` placeholder, which the runner replaces with
//! a port that is free on the host when the case starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use portremap_core::redirect::{API_PORT, API_PORT_VAR, DATABASE_PORT, DATABASE_PORT_VAR};

use crate::diagnostics::RedirectLine;
use crate::error::HarnessError;

/// Placeholder for a port allocated when the case runs.
pub const FREE_PORT: &str = "$FREE_PORT";

/// A port number, or a placeholder resolved at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Fixed(u16),
    Placeholder(String),
}

impl PortValue {
    fn free() -> Self {
        Self::Placeholder(FREE_PORT.to_string())
    }

    fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    fn resolve(&self, case: &str, free_port: Option<u16>) -> Result<u16, HarnessError> {
        match self {
            Self::Fixed(port) => Ok(*port),
            Self::Placeholder(p) if p == FREE_PORT => free_port.ok_or_else(|| HarnessError::Fixture {
                case: case.to_string(),
                message: "free port requested but none allocated".to_string(),
            }),
            Self::Placeholder(p) => Err(HarnessError::Fixture {
                case: case.to_string(),
                message: format!("unknown port placeholder '{p}'"),
            }),
        }
    }
}

/// A single bind fixture case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindCase {
    /// Case identifier.
    pub name: String,
    /// Port passed to `bind`.
    pub requested_port: PortValue,
    /// Environment of the probe process. The override variables are always
    /// cleared first, so an absent key means "unset".
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Port the kernel should assign; `null` accepts any successful bind.
    pub expected_port: Option<PortValue>,
    /// Diagnostic lines expected on stderr, as `[from, to]` pairs.
    #[serde(default)]
    pub expected_redirects: Vec<(u16, PortValue)>,
}

/// A [`BindCase`] with every placeholder replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCase {
    pub name: String,
    pub requested_port: u16,
    pub env: Vec<(String, String)>,
    pub expected_port: Option<u16>,
    pub expected_redirects: Vec<RedirectLine>,
}

impl BindCase {
    /// Whether running the case needs a freshly allocated port.
    #[must_use]
    pub fn needs_free_port(&self) -> bool {
        self.requested_port.is_placeholder()
            || self.env.values().any(|v| v.contains(FREE_PORT))
            || self.expected_port.as_ref().is_some_and(PortValue::is_placeholder)
            || self.expected_redirects.iter().any(|(_, to)| to.is_placeholder())
    }

    /// Substitutes `free_port` for every placeholder.
    pub fn resolve(&self, free_port: Option<u16>) -> Result<ResolvedCase, HarnessError> {
        let name = self.name.as_str();
        let free_text = free_port.map(|p| p.to_string());
        let env = self
            .env
            .iter()
            .map(|(key, value)| -> Result<(String, String), HarnessError> {
                if !value.contains(FREE_PORT) {
                    return Ok((key.clone(), value.clone()));
                }
                let port = free_text.as_deref().ok_or_else(|| HarnessError::Fixture {
                    case: self.name.clone(),
                    message: format!("{key} uses {FREE_PORT} but none was allocated"),
                })?;
                Ok((key.clone(), value.replace(FREE_PORT, port)))
            })
            .collect::<Result<Vec<_>, HarnessError>>()?;

        let expected_redirects = self
            .expected_redirects
            .iter()
            .map(|(from, to)| -> Result<RedirectLine, HarnessError> {
                Ok(RedirectLine {
                    from: *from,
                    to: to.resolve(name, free_port)?,
                })
            })
            .collect::<Result<Vec<_>, HarnessError>>()?;

        Ok(ResolvedCase {
            name: self.name.clone(),
            requested_port: self.requested_port.resolve(name, free_port)?,
            env,
            expected_port: self
                .expected_port
                .as_ref()
                .map(|p| p.resolve(name, free_port))
                .transpose()?,
            expected_redirects,
        })
    }
}

/// A collection of bind fixture cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindFixtureSet {
    /// Schema version.
    pub version: String,
    /// Interposed symbol family.
    pub family: String,
    /// UTC timestamp of capture.
    pub captured_at: String,
    pub cases: Vec<BindCase>,
}

impl BindFixtureSet {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    /// The default end-to-end suite for the two redirect rules.
    #[must_use]
    pub fn builtin() -> Self {
        let env = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        };
        let case = |name: &str,
                    requested: PortValue,
                    vars: &[(&str, &str)],
                    expected: Option<PortValue>,
                    redirects: Vec<(u16, PortValue)>| BindCase {
            name: name.to_string(),
            requested_port: requested,
            env: env(vars),
            expected_port: expected,
            expected_redirects: redirects,
        };
        let db = PortValue::Fixed(DATABASE_PORT);
        let api = PortValue::Fixed(API_PORT);

        Self {
            version: "v1".to_string(),
            family: "bind".to_string(),
            captured_at: "2026-10-19T00:00:00Z".to_string(),
            cases: vec![
                case(
                    "database_port_redirected",
                    db.clone(),
                    &[(DATABASE_PORT_VAR, FREE_PORT)],
                    Some(PortValue::free()),
                    vec![(DATABASE_PORT, PortValue::free())],
                ),
                case(
                    "api_port_redirected",
                    api.clone(),
                    &[(API_PORT_VAR, FREE_PORT)],
                    Some(PortValue::free()),
                    vec![(API_PORT, PortValue::free())],
                ),
                case(
                    "database_port_without_override",
                    db.clone(),
                    &[],
                    Some(db.clone()),
                    vec![],
                ),
                case(
                    "database_override_ignored_for_api_port",
                    api.clone(),
                    &[(DATABASE_PORT_VAR, FREE_PORT)],
                    Some(api.clone()),
                    vec![],
                ),
                case(
                    "api_override_out_of_range",
                    api.clone(),
                    &[(API_PORT_VAR, "70000")],
                    Some(api.clone()),
                    vec![],
                ),
                case(
                    "api_override_not_numeric",
                    api.clone(),
                    &[(API_PORT_VAR, "abc")],
                    Some(api.clone()),
                    vec![],
                ),
                case(
                    "database_override_empty",
                    db.clone(),
                    &[(DATABASE_PORT_VAR, "")],
                    Some(db),
                    vec![],
                ),
                case(
                    "unrecognized_port_untouched",
                    PortValue::free(),
                    &[(DATABASE_PORT_VAR, "1"), (API_PORT_VAR, "1")],
                    Some(PortValue::free()),
                    vec![],
                ),
                case(
                    "ephemeral_port_untouched",
                    PortValue::Fixed(0),
                    &[(DATABASE_PORT_VAR, "1"), (API_PORT_VAR, "1")],
                    None,
                    vec![],
                ),
            ],
        }
    }
}
