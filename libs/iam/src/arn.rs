//! ARN patterns for stack-scoped grants.
//!
//! Task definition families and ECR repositories owned by a stack are named
//! with a delimiter that cannot appear in a stack name (`_` for families,
//! `/` for repositories). A grant on `<stack>_*` therefore never matches
//! another stack's resources, even when one stack name is a prefix of the
//! other (`ci` vs `ci-staging`).

use jecs_id::Expr;

/// Separates the stack name from the family suffix.
pub const FAMILY_DELIMITER: char = '_';

/// Separates the stack namespace from the repository suffix.
pub const REPOSITORY_DELIMITER: char = '/';

/// Region and (optionally pinned) account of a stack.
///
/// Without a pinned account, ARNs are emitted as `Fn::Sub` strings over
/// `${AWS::AccountId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountScope {
    region: String,
    account: Option<String>,
}

impl AccountScope {
    pub fn new(region: impl Into<String>, account: Option<String>) -> Self {
        Self {
            region: region.into(),
            account,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// `arn:aws:<service>:<region>:<account>:<resource>`.
    pub fn arn(&self, service: &str, resource: &str) -> Expr {
        match &self.account {
            Some(account) => Expr::Literal(format!(
                "arn:aws:{}:{}:{}:{}",
                service, self.region, account, resource
            )),
            None => Expr::Sub(format!(
                "arn:aws:{}:{}:${{AWS::AccountId}}:{}",
                service, self.region, resource
            )),
        }
    }
}

/// Task definition family owned by `stack`.
pub fn task_family(stack: &str, name: &str) -> String {
    format!("{}{}{}", stack, FAMILY_DELIMITER, name)
}

/// Every task definition family owned by `stack`.
pub fn task_definition_pattern(scope: &AccountScope, stack: &str) -> Expr {
    scope.arn(
        "ecs",
        &format!("task-definition/{}{}*", stack, FAMILY_DELIMITER),
    )
}

/// Any task in the account and region; narrow with an `ecs:cluster` condition.
pub fn task_pattern(scope: &AccountScope) -> Expr {
    scope.arn("ecs", "task/*")
}

/// ECR repository owned by `stack`.
pub fn repository_name(stack: &str, name: &str) -> String {
    format!("{}{}{}", stack, REPOSITORY_DELIMITER, name)
}

/// Every ECR repository owned by `stack`.
pub fn repository_pattern(scope: &AccountScope, stack: &str) -> Expr {
    scope.arn(
        "ecr",
        &format!("repository/{}{}*", stack, REPOSITORY_DELIMITER),
    )
}

/// An AWS managed policy ARN, e.g. `service-role/AmazonECSTaskExecutionRolePolicy`.
pub fn aws_managed_policy(name: &str) -> Expr {
    Expr::Sub(format!("arn:${{AWS::Partition}}:iam::aws:policy/{}", name))
}

/// Whether two resource patterns can match a common ARN.
///
/// Exact strings and trailing-`*` globs are compared precisely; anything
/// else is assumed to overlap.
pub fn patterns_overlap(a: &str, b: &str) -> bool {
    let inner_star = |p: &str| p.trim_end_matches('*').contains('*');
    if inner_star(a) || inner_star(b) {
        return true;
    }

    match (a.strip_suffix('*'), b.strip_suffix('*')) {
        (Some(pa), Some(pb)) => pa.starts_with(pb) || pb.starts_with(pa),
        (Some(pa), None) => b.starts_with(pa),
        (None, Some(pb)) => a.starts_with(pb),
        (None, None) => a == b,
    }
}
