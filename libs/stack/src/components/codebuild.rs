//! Image build project with push rights limited to the stack's repositories.

use jecs_graph::ResourceGraph;
use jecs_iam::arn::repository_pattern;
use jecs_iam::{PolicyDocument, PolicyStatement, TrustPolicy};
use jecs_id::{Expr, LogGroupArn, LogGroupName, ProjectArn, ProjectName, RoleArn};
use serde::Serialize;
use serde_json::json;
use tracing::info_span;

use super::agents::AgentDescriptor;
use super::{Scope, AGENTS, CODEBUILD};
use crate::{StackConfig, SynthError};

/// Build image used by the project.
pub const BUILD_IMAGE: &str = "aws/codebuild/standard:7.0";

/// Environment variable listing the repositories the build may push to.
pub const IMAGE_REPOSITORIES_VAR: &str = "IMAGE_REPOSITORIES";

/// Days the build log group keeps events.
pub const BUILD_LOG_RETENTION_DAYS: u32 = 30;

/// Pull and push actions on a repository.
pub const REPOSITORY_ACTIONS: [&str; 7] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:BatchGetImage",
    "ecr:GetDownloadUrlForLayer",
    "ecr:InitiateLayerUpload",
    "ecr:UploadLayerPart",
    "ecr:CompleteLayerUpload",
    "ecr:PutImage",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBuildDescriptor {
    project_name: ProjectName,
    project_arn: ProjectArn,
    service_role_arn: RoleArn,
    log_group: LogGroupName,
}

impl CodeBuildDescriptor {
    pub fn project_name(&self) -> &ProjectName {
        &self.project_name
    }

    pub fn project_arn(&self) -> &ProjectArn {
        &self.project_arn
    }

    pub fn service_role_arn(&self) -> &RoleArn {
        &self.service_role_arn
    }

    pub fn log_group(&self) -> &LogGroupName {
        &self.log_group
    }
}

pub struct CodeBuildBuilder<'c> {
    config: &'c StackConfig,
    agents: Option<&'c AgentDescriptor>,
}

impl<'c> CodeBuildBuilder<'c> {
    pub fn new(config: &'c StackConfig) -> Self {
        Self {
            config,
            agents: None,
        }
    }

    #[must_use]
    pub fn agents(mut self, agents: &'c AgentDescriptor) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn build(self, graph: &mut ResourceGraph) -> Result<CodeBuildDescriptor, SynthError> {
        let agents = self.agents.ok_or(SynthError::missing(CODEBUILD, AGENTS))?;
        let _span = info_span!("component", name = CODEBUILD).entered();

        let stack = self.config.stack_name();
        let mut scope = Scope::new(CODEBUILD, graph);

        let log_group = scope.declare(
            "LogGroup",
            "AWS::Logs::LogGroup",
            json!({ "RetentionInDays": BUILD_LOG_RETENTION_DAYS }),
        )?;

        let service_role = scope.declare(
            "ServiceRole",
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": TrustPolicy::service("codebuild.amazonaws.com")
            }),
        )?;

        let policy = service_policy(self.config, &LogGroupArn::of(&log_group))?;
        let service_policy = scope.declare(
            "ServiceRolePolicy",
            "AWS::IAM::Policy",
            json!({
                "PolicyName": format!("{stack}-codebuild"),
                "PolicyDocument": policy,
                "Roles": [Expr::Ref(service_role.clone())]
            }),
        )?;

        let repositories: Vec<&str> = agents.repositories().map(|r| r.name()).collect();
        let buildspec = json!({
            "version": "0.2",
            "phases": { "build": { "commands": ["exit 1"] } }
        });
        let log_group = LogGroupName::of(&log_group);

        let project_id = scope.id("Project")?;
        let mut project = scope
            .resource(
                project_id,
                "AWS::CodeBuild::Project",
                json!({
                    "Name": project_name(stack),
                    "ServiceRole": RoleArn::of(&service_role),
                    "Source": { "Type": "NO_SOURCE", "BuildSpec": buildspec.to_string() },
                    "Artifacts": { "Type": "NO_ARTIFACTS" },
                    "Environment": {
                        "Type": "LINUX_CONTAINER",
                        "ComputeType": "BUILD_GENERAL1_SMALL",
                        "Image": BUILD_IMAGE,
                        "PrivilegedMode": true,
                        "EnvironmentVariables": [{
                            "Name": IMAGE_REPOSITORIES_VAR,
                            "Type": "PLAINTEXT",
                            "Value": repositories.join(",")
                        }]
                    },
                    "LogsConfig": {
                        "CloudWatchLogs": { "Status": "ENABLED", "GroupName": log_group }
                    }
                }),
            )
            .with_depends_on(&service_policy);
        for repository in agents.repositories() {
            project = project.with_depends_on(repository.uri().resource());
        }
        let project = scope.add(project)?;

        Ok(CodeBuildDescriptor {
            project_name: ProjectName::of(&project),
            project_arn: ProjectArn::of(&project),
            service_role_arn: RoleArn::of(&service_role),
            log_group,
        })
    }
}

/// `<stack>-build`.
pub fn project_name(stack: &str) -> String {
    format!("{stack}-build")
}

/// Registry token exchange, push/pull on the stack's repositories and
/// writes to the build log group.
pub fn service_policy(
    config: &StackConfig,
    log_group: &LogGroupArn,
) -> Result<PolicyDocument, SynthError> {
    let scope = config.account_scope();
    let document = PolicyDocument::new(vec![
        PolicyStatement::allow()
            .with_sid("RegistryToken")
            .with_actions(["ecr:GetAuthorizationToken"])
            .with_resources([Expr::wildcard()]),
        PolicyStatement::allow()
            .with_sid("StackRepositories")
            .with_actions(REPOSITORY_ACTIONS)
            .with_resources([repository_pattern(&scope, config.stack_name())]),
        PolicyStatement::allow()
            .with_sid("BuildLogs")
            .with_actions(["logs:CreateLogStream", "logs:PutLogEvents"])
            .with_resources([log_group]),
    ])?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::agents::AgentsBuilder;
    use crate::components::network::NetworkBuilder;
    use crate::testing::stack_config;
    use jecs_id::LogicalId;

    #[test]
    fn test_requires_agents() {
        let config = stack_config();
        let mut graph = ResourceGraph::new();
        assert!(matches!(
            CodeBuildBuilder::new(&config).build(&mut graph),
            Err(SynthError::MissingDependency {
                component: "codebuild",
                dependency: "agents"
            })
        ));
    }

    #[test]
    fn test_project() {
        let config = stack_config();
        let mut graph = ResourceGraph::new();
        let network = NetworkBuilder::new(&config).build(&mut graph).unwrap();
        let agents = AgentsBuilder::new(&config)
            .network(&network)
            .build(&mut graph)
            .unwrap();
        let codebuild = CodeBuildBuilder::new(&config)
            .agents(&agents)
            .build(&mut graph)
            .unwrap();

        assert_eq!(codebuild.project_name().to_string(), "${CodebuildProject}");
        let project = graph
            .get(&LogicalId::parse("CodebuildProject").unwrap())
            .unwrap();
        let props = project.properties();
        assert_eq!(props["Name"], "jenkins-build");
        assert_eq!(props["Source"]["Type"], "NO_SOURCE");
        assert_eq!(props["Environment"]["PrivilegedMode"], true);
        assert_eq!(
            props["Environment"]["EnvironmentVariables"][0]["Value"],
            "jenkins/simple,jenkins/postgres12-jnlp,jenkins/postgres12-postgres,jenkins/java11"
        );

        let buildspec: serde_json::Value =
            serde_json::from_str(props["Source"]["BuildSpec"].as_str().unwrap()).unwrap();
        assert_eq!(buildspec["phases"]["build"]["commands"], json!(["exit 1"]));
        assert!(project.depends_on().contains(&LogicalId::parse("AgentsSimpleRepository").unwrap()));
        graph.validate().unwrap();
        assert!(graph.component_depends_on(CODEBUILD, AGENTS));
    }

    #[test]
    fn test_service_policy_scopes_pushes_to_stack() {
        let config = stack_config();
        let log_group = LogGroupArn::of(&LogicalId::parse("CodebuildLogGroup").unwrap());
        let policy = service_policy(&config, &log_group).unwrap();

        let token = policy.statement("RegistryToken").unwrap();
        assert!(token.resources()[0].is_wildcard());

        let push = policy.statement("StackRepositories").unwrap();
        assert!(push.actions().iter().any(|a| a == "ecr:PutImage"));
        assert_eq!(
            push.resources(),
            [Expr::sub(
                "arn:aws:ecr:us-west-2:${AWS::AccountId}:repository/jenkins/*"
            )]
        );
    }
}
