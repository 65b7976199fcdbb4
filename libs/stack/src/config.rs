//! Stack configuration.
//!
//! Settings come from a key/value file (the `[DEFAULT]` section of an INI
//! file by default) overlaid with `JECS_<KEY>` environment variables.
//! Credentials come only from the process environment. Both are loaded once
//! into an immutable [`StackConfig`] that every component borrows.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use config::{Config, Environment, File};
use jecs_iam::arn::AccountScope;
use jecs_networking::Ipv4Cidr;
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

use crate::components::agents::AgentSpec;
use crate::components::controller::CONTRACT_KEYS;
use crate::ConfigError;

/// Prefix of environment variables overriding settings keys.
pub const ENV_PREFIX: &str = "JECS";

/// Longest accepted stack name.
pub const MAX_STACK_NAME_LEN: usize = 32;

/// Tags applied to every taggable resource unless the settings file has a
/// `[TAGS]` section.
pub const DEFAULT_TAGS: [(&str, &str); 3] = [
    ("Department", "501"),
    ("DevTeam", "Voyager"),
    ("Environment", "Development"),
];

fn default_max_azs() -> u8 {
    2
}

fn default_timezone() -> String {
    "America/Vancouver".to_string()
}

fn default_namespace() -> String {
    "jenkins".to_string()
}

fn default_true() -> bool {
    true
}

fn default_instance_type() -> String {
    "t3.xlarge".to_string()
}

fn default_min_capacity() -> u32 {
    1
}

fn default_max_capacity() -> u32 {
    4
}

fn default_image_tag() -> String {
    "latest".to_string()
}

/// What happens to the shared filesystem when the stack is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    /// Delete the filesystem and its data with the stack.
    #[default]
    Destroy,
    /// Keep the filesystem after the stack is gone.
    Retain,
}

/// Settings file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Settings {
    /// Stack name (`[a-z][a-z0-9-]*`).
    #[validate(length(min = 1, max = 32))]
    pub stack_name: String,

    /// Deployment region.
    #[validate(length(min = 1))]
    pub region: String,

    /// Account ID to pin ARNs to. Resolved at deploy time when unset.
    #[serde(default)]
    pub account: Option<String>,

    /// VPC CIDR block.
    pub cidr: String,

    /// Availability zones to spread subnets across.
    #[serde(default = "default_max_azs")]
    #[validate(range(min = 1, max = 6))]
    pub max_azs: u8,

    /// Controller task CPU units.
    pub fargate_cpu: u32,

    /// Controller task memory.
    pub fargate_memory_limit_mib: u32,

    /// URL agents use to reach the controller.
    #[validate(url)]
    pub jenkins_url: String,

    #[serde(default = "default_timezone")]
    #[validate(length(min = 1))]
    pub timezone: String,

    #[serde(default = "default_namespace")]
    #[validate(length(min = 1))]
    pub service_discovery_namespace: String,

    /// Provision the EC2 autoscaling pool.
    #[serde(default = "default_true")]
    pub ec2_capacity: bool,

    #[serde(default = "default_instance_type")]
    #[validate(length(min = 1))]
    pub ec2_instance_type: String,

    #[serde(default = "default_min_capacity")]
    pub ec2_min_capacity: u32,

    #[serde(default = "default_max_capacity")]
    pub ec2_max_capacity: u32,

    /// Provision the image build project.
    #[serde(default = "default_true")]
    pub codebuild: bool,

    /// Tag of agent images pulled from the stack's repositories.
    #[serde(default = "default_image_tag")]
    #[validate(length(min = 1, max = 128))]
    pub image_tag: String,

    #[serde(default)]
    pub filesystem_removal_policy: RemovalPolicy,
}

impl Settings {
    /// Settings with every optional key at its default.
    pub fn new(
        stack_name: impl Into<String>,
        region: impl Into<String>,
        cidr: impl Into<String>,
        fargate_cpu: u32,
        fargate_memory_limit_mib: u32,
        jenkins_url: impl Into<String>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            region: region.into(),
            account: None,
            cidr: cidr.into(),
            max_azs: default_max_azs(),
            fargate_cpu,
            fargate_memory_limit_mib,
            jenkins_url: jenkins_url.into(),
            timezone: default_timezone(),
            service_discovery_namespace: default_namespace(),
            ec2_capacity: true,
            ec2_instance_type: default_instance_type(),
            ec2_min_capacity: default_min_capacity(),
            ec2_max_capacity: default_max_capacity(),
            codebuild: true,
            image_tag: default_image_tag(),
            filesystem_removal_policy: RemovalPolicy::default(),
        }
    }

    /// Loads settings from `path`, overlaid with `JECS_<KEY>` variables.
    ///
    /// `env` replaces the process environment when set.
    pub fn load(
        path: &Path,
        env: Option<HashMap<String, String>>,
    ) -> Result<(Self, Option<BTreeMap<String, String>>), ConfigError> {
        let file: SettingsFile = Config::builder()
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;

        let mut builder = Config::builder();
        for (key, value) in file.default {
            builder = builder.set_default(key, value)?;
        }

        let mut settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).source(env))
            .build()?
            .try_deserialize()?;
        settings.account = settings.account.filter(|a| !a.is_empty());

        Ok((settings, file.tags))
    }

    /// Validates every key and returns the parsed VPC CIDR.
    pub fn check(&self) -> Result<Ipv4Cidr, ConfigError> {
        self.validate()?;
        validate_stack_name(&self.stack_name)?;

        if let Some(account) = &self.account {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::InvalidAccount(account.clone()));
            }
        }

        let cidr: Ipv4Cidr = self.cidr.parse()?;
        cidr.validate_vpc()?;
        if !cidr.is_private() {
            warn!(cidr = %cidr, "vpc cidr is outside the private address ranges");
        }

        if !is_valid_fargate_size(self.fargate_cpu, self.fargate_memory_limit_mib) {
            return Err(ConfigError::FargateSizing {
                cpu: self.fargate_cpu,
                memory_mib: self.fargate_memory_limit_mib,
            });
        }

        if self.ec2_capacity
            && (self.ec2_min_capacity < 1 || self.ec2_min_capacity > self.ec2_max_capacity)
        {
            return Err(ConfigError::Capacity {
                min: self.ec2_min_capacity,
                max: self.ec2_max_capacity,
            });
        }

        Ok(cidr)
    }
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(alias = "DEFAULT")]
    default: HashMap<String, config::Value>,
    #[serde(default, alias = "TAGS")]
    tags: Option<BTreeMap<String, String>>,
}

/// Stack names are lowercase so that derived repository names are valid.
pub fn validate_stack_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidStackName {
        name: name.to_string(),
        reason,
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("must not be empty"));
    };
    if name.len() > MAX_STACK_NAME_LEN {
        return Err(invalid("must be at most 32 characters"));
    }
    if !first.is_ascii_lowercase() {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "may only contain lowercase letters, digits and hyphens",
        ));
    }
    if name.ends_with('-') {
        return Err(invalid("must not end with a hyphen"));
    }
    Ok(())
}

/// Whether Fargate accepts this CPU/memory pairing.
pub fn is_valid_fargate_size(cpu: u32, memory_mib: u32) -> bool {
    let stepped = |min: u32, max: u32, step: u32| {
        (min..=max).contains(&memory_mib) && memory_mib % step == 0
    };
    match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => stepped(1024, 4096, 1024),
        1024 => stepped(2048, 8192, 1024),
        2048 => stepped(4096, 16384, 1024),
        4096 => stepped(8192, 30720, 1024),
        8192 => stepped(16384, 61440, 4096),
        16384 => stepped(32768, 122880, 8192),
        _ => false,
    }
}

/// GitHub App credential bundle handed to the controller.
#[derive(Clone, PartialEq, Eq)]
pub struct GithubCredentials {
    pub credential_id: String,
    pub app_id: String,
    pub private_key: String,
    pub owner: String,
}

impl fmt::Debug for GithubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubCredentials")
            .field("credential_id", &self.credential_id)
            .field("app_id", &self.app_id)
            .field("private_key", &"<redacted>")
            .field("owner", &self.owner)
            .finish()
    }
}

/// Secrets read from the process environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub admin_username: String,
    pub admin_password: String,
    pub jenkins_public_url: String,
    pub github: GithubCredentials,
}

impl Credentials {
    /// Variables that must be set (and non-empty).
    pub const REQUIRED_ENV: [&'static str; 7] = [
        "ADMIN_USERNAME",
        "ADMIN_PASSWORD",
        "JENKINS_PUBLIC_URL",
        "GH_CREDENTIAL_ID",
        "GH_CREDENTIAL_APP_ID",
        "GH_CREDENTIAL_PRIVATE_KEY",
        "GH_CREDENTIAL_OWNER",
    ];

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads credentials through `lookup`; the first missing variable is
    /// reported.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        Ok(Self {
            admin_username: get("ADMIN_USERNAME")?,
            admin_password: get("ADMIN_PASSWORD")?,
            jenkins_public_url: get("JENKINS_PUBLIC_URL")?,
            github: GithubCredentials {
                credential_id: get("GH_CREDENTIAL_ID")?,
                app_id: get("GH_CREDENTIAL_APP_ID")?,
                private_key: get("GH_CREDENTIAL_PRIVATE_KEY")?,
                owner: get("GH_CREDENTIAL_OWNER")?,
            },
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<redacted>")
            .field("jenkins_public_url", &self.jenkins_public_url)
            .field("github", &self.github)
            .finish()
    }
}

/// The validated, immutable configuration of one stack.
#[derive(Debug, Clone)]
pub struct StackConfig {
    settings: Settings,
    credentials: Credentials,
    cidr: Ipv4Cidr,
    tags: BTreeMap<String, String>,
    agents: Vec<AgentSpec>,
}

impl StackConfig {
    /// Validates settings and applies the default tags and agents.
    pub fn new(settings: Settings, credentials: Credentials) -> Result<Self, ConfigError> {
        let cidr = settings.check()?;
        let config = Self {
            settings,
            credentials,
            cidr,
            tags: DEFAULT_TAGS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            agents: AgentSpec::defaults(),
        };
        Ok(config)
    }

    /// Loads settings from `path` and credentials from the process
    /// environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let (settings, tags) = Settings::load(path, None)?;
        let config = Self::new(settings, Credentials::from_env()?)?;
        Ok(match tags {
            Some(tags) => config.with_tags(tags),
            None => config,
        })
    }

    #[must_use]
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    /// Replaces the agent set. Names must be unique and at least one agent
    /// is required.
    pub fn with_agents(mut self, agents: Vec<AgentSpec>) -> Result<Self, ConfigError> {
        if agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        let mut names = BTreeSet::new();
        let mut env_keys: BTreeSet<&str> = CONTRACT_KEYS.into_iter().collect();
        for agent in &agents {
            agent.validate()?;
            if !names.insert(agent.name()) {
                return Err(ConfigError::DuplicateAgent(agent.name().to_string()));
            }
            if !env_keys.insert(agent.env_key()) {
                return Err(ConfigError::InvalidAgent {
                    name: agent.name().to_string(),
                    reason: format!("environment key {:?} is already in use", agent.env_key()),
                });
            }
        }
        self.agents = agents;
        Ok(self)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn stack_name(&self) -> &str {
        &self.settings.stack_name
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn agents(&self) -> &[AgentSpec] {
        &self.agents
    }

    /// Region and account used to build ARN patterns.
    pub fn account_scope(&self) -> AccountScope {
        AccountScope::new(self.settings.region.clone(), self.settings.account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn settings() -> Settings {
        Settings::new(
            "jenkins",
            "us-west-2",
            "10.0.0.0/16",
            1024,
            2048,
            "http://controller.jenkins:8080",
        )
    }

    #[rstest]
    #[case("jenkins", true)]
    #[case("ci-staging", true)]
    #[case("a1", true)]
    #[case("", false)]
    #[case("Jenkins", false)]
    #[case("1ci", false)]
    #[case("ci_prod", false)]
    #[case("ci/prod", false)]
    #[case("ci-", false)]
    #[case("abcdefghijklmnopqrstuvwxyzabcdefg", false)]
    fn test_stack_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_stack_name(name).is_ok(), valid, "{name}");
    }

    #[rstest]
    #[case(256, 512, true)]
    #[case(256, 4096, false)]
    #[case(1024, 2048, true)]
    #[case(1024, 2500, false)]
    #[case(2048, 4096, true)]
    #[case(4096, 30720, true)]
    #[case(8192, 20480, true)]
    #[case(8192, 17408, false)]
    #[case(300, 1024, false)]
    fn test_fargate_sizes(#[case] cpu: u32, #[case] memory: u32, #[case] valid: bool) {
        assert_eq!(is_valid_fargate_size(cpu, memory), valid);
    }

    #[test]
    fn test_check_defaults() {
        let cidr = settings().check().unwrap();
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_check_rejects_bad_values() {
        let mut s = settings();
        s.cidr = "10.0.0.1/16".into();
        assert!(matches!(s.check(), Err(ConfigError::Cidr(_))));

        let mut s = settings();
        s.fargate_memory_limit_mib = 1000;
        assert!(matches!(s.check(), Err(ConfigError::FargateSizing { .. })));

        let mut s = settings();
        s.jenkins_url = "not a url".into();
        assert!(matches!(s.check(), Err(ConfigError::Invalid(_))));

        let mut s = settings();
        s.ec2_min_capacity = 5;
        assert!(matches!(s.check(), Err(ConfigError::Capacity { min: 5, max: 4 })));

        let mut s = settings();
        s.account = Some("12345".into());
        assert!(matches!(s.check(), Err(ConfigError::InvalidAccount(_))));
    }

    #[test]
    fn test_capacity_ignored_without_pool() {
        let mut s = settings();
        s.ec2_capacity = false;
        s.ec2_min_capacity = 0;
        assert!(s.check().is_ok());
    }

    #[test]
    fn test_credentials_require_every_variable() {
        let env = jecs_testing::credential_env();
        let creds = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(creds.admin_username, "admin");

        for missing in Credentials::REQUIRED_ENV {
            let err = Credentials::from_lookup(|k| {
                if k == missing {
                    None
                } else {
                    env.get(k).cloned()
                }
            })
            .unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnv(name) if name == missing));
        }
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let env = jecs_testing::credential_env();
        let creds = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap();
        let printed = format!("{creds:?}");
        assert!(!printed.contains(&creds.admin_password));
        assert!(!printed.contains(&creds.github.private_key));
    }

    #[test]
    fn test_default_tags_and_agents() {
        let env = jecs_testing::credential_env();
        let creds = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap();
        let config = StackConfig::new(settings(), creds).unwrap();
        assert_eq!(config.tags()["DevTeam"], "Voyager");
        assert_eq!(config.agents().len(), 3);

        assert!(matches!(
            config.clone().with_agents(Vec::new()),
            Err(ConfigError::NoAgents)
        ));
        let dup = vec![AgentSpec::simple(), AgentSpec::simple()];
        assert!(matches!(
            config.with_agents(dup),
            Err(ConfigError::DuplicateAgent(_))
        ));
    }

    #[rstest]
    #[case(AgentSpec::image("other", "simple_agent_image", "docker/agents/other"))]
    #[case(AgentSpec::image("other", "stack_name", "docker/agents/other"))]
    fn test_agent_env_keys_must_be_free(#[case] extra: AgentSpec) {
        let env = jecs_testing::credential_env();
        let creds = Credentials::from_lookup(|k| env.get(k).cloned()).unwrap();
        let config = StackConfig::new(settings(), creds).unwrap();
        let err = config
            .with_agents(vec![AgentSpec::simple(), extra])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAgent { name, .. } if name == "other"));
    }
}
