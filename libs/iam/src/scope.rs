//! Least-privilege scope rules.
//!
//! Some actions are only safe when narrowed: handing out `iam:PassRole` on
//! `*` lets the holder escalate to any role, and `ecs:RunTask` on `*` lets it
//! launch task definitions owned by other stacks. Every statement is checked
//! against [`SCOPE_RULES`] before a document is built.

use jecs_id::Expr;

use crate::{Effect, IamError, PolicyStatement};

/// How tightly an action's resources must be scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRequirement {
    /// Resources must be listed explicitly; no `*` anywhere.
    AllowList,
    /// Resources may be patterns but never a bare `*`.
    Scoped,
    /// Patterned resources must carry a narrowing condition.
    ConditionedPattern,
}

/// A scope rule for one action.
#[derive(Debug, Clone, Copy)]
pub struct ScopeRule {
    pub action: &'static str,
    pub requirement: ScopeRequirement,
}

/// Actions whose resources must be narrowed.
pub const SCOPE_RULES: &[ScopeRule] = &[
    ScopeRule {
        action: "iam:PassRole",
        requirement: ScopeRequirement::AllowList,
    },
    ScopeRule {
        action: "ecs:RunTask",
        requirement: ScopeRequirement::Scoped,
    },
    ScopeRule {
        action: "ecs:StartTask",
        requirement: ScopeRequirement::Scoped,
    },
    ScopeRule {
        action: "ecs:StopTask",
        requirement: ScopeRequirement::ConditionedPattern,
    },
    ScopeRule {
        action: "ecs:ListContainerInstances",
        requirement: ScopeRequirement::Scoped,
    },
    ScopeRule {
        action: "ecr:PutImage",
        requirement: ScopeRequirement::Scoped,
    },
    ScopeRule {
        action: "ecr:InitiateLayerUpload",
        requirement: ScopeRequirement::Scoped,
    },
];

/// Case-insensitive action glob match (`*` only as a suffix).
pub fn action_matches(pattern: &str, action: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let action = action.to_ascii_lowercase();
    match pattern.strip_suffix('*') {
        Some(prefix) => action.starts_with(prefix),
        None => pattern == action,
    }
}

/// Checks an `Allow` statement against [`SCOPE_RULES`].
pub fn check_scope(statement: &PolicyStatement) -> Result<(), IamError> {
    if statement.effect() == Effect::Deny {
        return Ok(());
    }

    for rule in SCOPE_RULES {
        if !statement
            .actions()
            .iter()
            .any(|a| action_matches(a, rule.action))
        {
            continue;
        }

        let resources = statement.resources();
        let unscoped = resources.iter().any(Expr::is_wildcard);
        let patterned = resources.iter().any(has_wildcard);

        let error = match rule.requirement {
            ScopeRequirement::AllowList if patterned => Some(if unscoped {
                IamError::UnscopedAction {
                    sid: statement.label(),
                    action: rule.action.to_string(),
                }
            } else {
                IamError::WildcardInAllowList {
                    sid: statement.label(),
                    action: rule.action.to_string(),
                }
            }),
            ScopeRequirement::Scoped | ScopeRequirement::ConditionedPattern if unscoped => {
                Some(IamError::UnscopedAction {
                    sid: statement.label(),
                    action: rule.action.to_string(),
                })
            }
            ScopeRequirement::ConditionedPattern
                if patterned && statement.conditions().is_empty() =>
            {
                Some(IamError::MissingCondition {
                    sid: statement.label(),
                    action: rule.action.to_string(),
                })
            }
            _ => None,
        };

        if let Some(error) = error {
            return Err(error);
        }
    }

    Ok(())
}

fn has_wildcard(resource: &Expr) -> bool {
    match resource {
        Expr::Literal(s) | Expr::Sub(s) => s.contains('*'),
        Expr::Join(_, parts) => parts.iter().any(has_wildcard),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Condition;
    use jecs_id::{LogicalId, RoleArn};
    use rstest::rstest;

    fn role(id: &str) -> RoleArn {
        RoleArn::of(&LogicalId::parse(id).unwrap())
    }

    #[rstest]
    #[case("iam:PassRole", "iam:PassRole", true)]
    #[case("iam:*", "iam:PassRole", true)]
    #[case("*", "ecs:RunTask", true)]
    #[case("ECS:runtask", "ecs:RunTask", true)]
    #[case("ecs:Run", "ecs:RunTask", false)]
    #[case("codebuild:List*", "ecs:ListContainerInstances", false)]
    fn test_action_matches(#[case] pattern: &str, #[case] action: &str, #[case] expected: bool) {
        assert_eq!(action_matches(pattern, action), expected);
    }

    #[test]
    fn test_pass_role_requires_allow_list() {
        let ok = PolicyStatement::allow()
            .with_actions(["iam:PassRole"])
            .with_resources([role("AgentTaskRole"), role("AgentExecutionRole")]);
        assert!(ok.validate().is_ok());

        let wildcard = PolicyStatement::allow()
            .with_actions(["iam:PassRole"])
            .with_resources(["*"]);
        assert!(matches!(
            wildcard.validate(),
            Err(IamError::UnscopedAction { .. })
        ));

        let pattern = PolicyStatement::allow()
            .with_actions(["iam:*"])
            .with_resources(["arn:aws:iam::123456789012:role/agent-*"]);
        assert!(matches!(
            pattern.validate(),
            Err(IamError::WildcardInAllowList { .. })
        ));
    }

    #[test]
    fn test_run_task_must_be_scoped() {
        let unscoped = PolicyStatement::allow()
            .with_actions(["ecs:RunTask"])
            .with_resources(["*"]);
        assert!(matches!(
            unscoped.validate(),
            Err(IamError::UnscopedAction { .. })
        ));

        let scoped = PolicyStatement::allow()
            .with_actions(["ecs:RunTask"])
            .with_resources(["arn:aws:ecs:us-west-2:123456789012:task-definition/ci_*"]);
        assert!(scoped.validate().is_ok());
    }

    #[test]
    fn test_stop_task_pattern_needs_condition() {
        let bare = PolicyStatement::allow()
            .with_actions(["ecs:StopTask"])
            .with_resources(["arn:aws:ecs:us-west-2:123456789012:task/*"]);
        assert!(matches!(
            bare.validate(),
            Err(IamError::MissingCondition { .. })
        ));

        let conditioned = bare.with_condition(Condition::arn_equals(
            "ecs:cluster",
            "arn:aws:ecs:us-west-2:123456789012:cluster/ci",
        ));
        assert!(conditioned.validate().is_ok());
    }

    #[test]
    fn test_deny_statements_are_not_scope_checked() {
        let deny = PolicyStatement::deny()
            .with_actions(["iam:PassRole"])
            .with_resources(["*"]);
        assert!(deny.validate().is_ok());
    }
}
