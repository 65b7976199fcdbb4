//! Configuration-as-code rendering.
//!
//! The controller image ships a template of its Jenkins configuration. At
//! startup the controller environment is mapped to template variables and
//! the template is rendered with [`CascRenderer`]. Rendering is strict: a
//! variable the template uses but the environment lacks is an error.
//!
//! Controller variables are carried under lowercase environment keys; the
//! container's own settings and the ambient process environment are not.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;

use crate::components::controller::ControllerEnvironment;

const TEMPLATE_NAME: &str = "casc";

/// Environment keys whose template variable is not just the uppercased key.
pub const RENAMED_VARIABLES: [(&str, &str); 3] = [
    ("cluster_arn", "ECS_CLUSTER_ARN"),
    ("agent_log_group", "LOG_GROUP"),
    ("agent_log_stream_prefix", "LOG_STREAM_PREFIX"),
];

/// Container settings that are not template variables.
const CONTAINER_ONLY: [&str; 3] = ["JAVA_OPTS", "CASC_JENKINS_CONFIG", "TZ"];

#[derive(Debug, Error)]
pub enum CascError {
    #[error("invalid template: {0}")]
    Template(String),

    #[error("failed to render template: {0}")]
    Render(String),

    #[error("environment variable {0} is not set")]
    MissingVariable(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Template variable for an environment key.
pub fn variable_name(env_key: &str) -> String {
    RENAMED_VARIABLES
        .iter()
        .find(|(key, _)| *key == env_key)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| env_key.to_ascii_uppercase())
}

fn is_controller_key(key: &str) -> bool {
    key.starts_with(|c: char| c.is_ascii_lowercase())
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Values substituted into the template, keyed by variable name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CascVariables(BTreeMap<String, String>);

impl CascVariables {
    /// Maps `(env key, value)` pairs to variables.
    pub fn from_environment<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .filter(|(key, _)| !CONTAINER_ONLY.contains(&key.as_ref()))
                .map(|(key, value)| (variable_name(key.as_ref()), value.into()))
                .collect(),
        )
    }

    /// Variables for a synthesized controller. Values only known at deploy
    /// time render as `${LogicalId}` / `${LogicalId.Attr}` placeholders.
    pub fn from_controller(environment: &ControllerEnvironment) -> Self {
        Self::from_environment(environment.iter().map(|(k, v)| (k, v.to_string())))
    }

    /// Reads every key of `environment` through `lookup`, as the controller
    /// container does at startup.
    pub fn from_lookup<F>(
        environment: &ControllerEnvironment,
        lookup: F,
    ) -> Result<Self, CascError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut entries = Vec::with_capacity(environment.len());
        for key in environment.keys() {
            let value =
                lookup(key).ok_or_else(|| CascError::MissingVariable(key.to_string()))?;
            entries.push((key, value));
        }
        Ok(Self::from_environment(entries))
    }

    /// Variables from a process environment, without a synthesized stack.
    ///
    /// Only lowercase keys are controller variables, so `PATH`, `HOME` and
    /// the container settings are skipped. Variables the template needs but
    /// the environment lacks surface as strict rendering errors.
    pub fn from_process_environment<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self::from_environment(vars.into_iter().filter(|(key, _)| is_controller_key(key)))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A compiled configuration-as-code template.
///
/// Values are substituted verbatim. The output is YAML, so HTML escaping
/// would corrupt URLs and private keys; quoting is left to the template.
pub struct CascRenderer {
    handlebars: Handlebars<'static>,
}

impl CascRenderer {
    pub fn new(template: &str) -> Result<Self, CascError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| CascError::Template(e.to_string()))?;
        Ok(Self { handlebars })
    }

    pub fn from_file(path: &Path) -> Result<Self, CascError> {
        let template = fs::read_to_string(path).map_err(|source| CascError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(&template)
    }

    pub fn render(&self, variables: &CascVariables) -> Result<String, CascError> {
        self.handlebars
            .render(TEMPLATE_NAME, variables)
            .map_err(|e| CascError::Render(e.to_string()))
    }
}
