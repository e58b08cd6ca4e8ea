/*!
 * # Policy Enforcer
 *
 * Authorization rules loaded from a CSV of
 *
 * ```text
 * p, role, resource, action
 * g, user, role
 * ```
 *
 * `*` in a `p` rule matches any resource or action. `g` rules give a user
 * (by email or internal id) extra roles on top of the role in their token.
 * Rules live behind an `RwLock` and are swapped wholesale by [`PolicyEnforcer::reload`].
 */

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
};

use futures::StreamExt;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Policy bundled with the binary, used when no file is configured.
pub const DEFAULT_POLICY: &str = include_str!("../../config/policy.csv");

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Rule {
    role: String,
    resource: String,
    action: String,
}

impl Rule {
    fn matches(&self, resource: &str, action: &str) -> bool {
        (self.resource == "*" || self.resource == resource)
            && (self.action == "*" || self.action == action)
    }
}

#[derive(Debug, Default, Clone)]
struct PolicySet {
    rules: Vec<Rule>,
    groupings: HashMap<String, HashSet<String>>,
}

impl PolicySet {
    fn parse(csv: &str) -> Result<Self, PolicyError> {
        let mut set = PolicySet::default();
        for (idx, raw) in csv.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                ["p", role, resource, action] => {
                    if !super::permissions::is_known_resource(resource) {
                        return Err(PolicyError::Parse {
                            line: idx + 1,
                            message: format!("unknown resource `{}`", resource),
                        });
                    }
                    set.rules.push(Rule {
                        role: role.to_string(),
                        resource: resource.to_string(),
                        action: action.to_string(),
                    })
                }
                ["g", user, role] => {
                    set.groupings
                        .entry(user.to_string())
                        .or_default()
                        .insert(role.to_string());
                }
                _ => {
                    return Err(PolicyError::Parse {
                        line: idx + 1,
                        message: format!("unrecognized rule `{}`", line),
                    })
                }
            }
        }
        Ok(set)
    }

    fn allows(&self, subjects: &[&str], role: &str, resource: &str, action: &str) -> bool {
        let mut roles: HashSet<&str> = HashSet::new();
        roles.insert(role);
        for subject in subjects {
            if let Some(extra) = self.groupings.get(*subject) {
                roles.extend(extra.iter().map(String::as_str));
            }
        }
        self.rules
            .iter()
            .any(|rule| roles.contains(rule.role.as_str()) && rule.matches(resource, action))
    }
}

/// Where rules are (re)loaded from.
#[derive(Debug, Clone)]
pub enum PolicySource {
    File(PathBuf),
    Inline(String),
}

impl PolicySource {
    async fn read(&self) -> Result<String, PolicyError> {
        match self {
            PolicySource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
            PolicySource::Inline(csv) => Ok(csv.clone()),
        }
    }
}

pub struct PolicyEnforcer {
    source: PolicySource,
    policy: RwLock<PolicySet>,
}

impl PolicyEnforcer {
    pub async fn load(source: PolicySource) -> Result<Self, PolicyError> {
        let policy = PolicySet::parse(&source.read().await?)?;
        info!(rules = policy.rules.len(), "policy loaded");
        Ok(Self {
            source,
            policy: RwLock::new(policy),
        })
    }

    pub fn from_csv(csv: &str) -> Result<Self, PolicyError> {
        Ok(Self {
            source: PolicySource::Inline(csv.to_string()),
            policy: RwLock::new(PolicySet::parse(csv)?),
        })
    }

    /// The file in `path`, or the bundled policy.
    pub async fn from_config(path: Option<&str>) -> Result<Self, PolicyError> {
        match path {
            Some(path) => Self::load(PolicySource::File(PathBuf::from(path))).await,
            None => Self::from_csv(DEFAULT_POLICY),
        }
    }

    /// Re-reads the source. A bad file leaves the current rules in place.
    pub async fn reload(&self) -> Result<(), PolicyError> {
        let fresh = PolicySet::parse(&self.source.read().await?)?;
        let count = fresh.rules.len();
        *self.policy.write().await = fresh;
        info!(rules = count, "policy reloaded");
        Ok(())
    }

    /// True when `role`, or a role granted to one of `subjects`, may perform
    /// `action` on `resource`.
    pub async fn enforce(&self, subjects: &[&str], role: &str, resource: &str, action: &str) -> bool {
        let allowed = self
            .policy
            .read()
            .await
            .allows(subjects, role, resource, action);
        debug!(role, resource, action, allowed, "policy decision");
        allowed
    }
}

/// Reloads the enforcer whenever a message arrives on `channel`.
pub fn spawn_reload_subscriber(
    enforcer: Arc<PolicyEnforcer>,
    redis: Arc<redis::Client>,
    channel: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let connection = match redis.get_async_connection().await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(error = %err, "policy reload subscriber disabled, redis unavailable");
                return;
            }
        };
        let mut pubsub = connection.into_pubsub();
        if let Err(err) = pubsub.subscribe(&channel).await {
            warn!(error = %err, channel = %channel, "policy channel subscribe failed");
            return;
        }
        info!(channel = %channel, "listening for policy reloads");

        let mut messages = pubsub.on_message();
        while messages.next().await.is_some() {
            if let Err(err) = enforcer.reload().await {
                error!(error = %err, "policy reload failed, keeping previous rules");
            }
        }
        warn!("policy reload subscription ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLICY: &str = "\
# role rules
p, owner, *, *
p, cashier, orders, create
p, cashier, orders, read
p, manager, reports, *
g, auditor@kasir.test, manager
";

    #[tokio::test]
    async fn owner_wildcard_allows_everything() {
        let enforcer = PolicyEnforcer::from_csv(POLICY).unwrap();
        assert!(enforcer.enforce(&[], "owner", "purchase_orders", "receive").await);
    }

    #[tokio::test]
    async fn cashier_is_limited_to_listed_actions() {
        let enforcer = PolicyEnforcer::from_csv(POLICY).unwrap();
        assert!(enforcer.enforce(&[], "cashier", "orders", "create").await);
        assert!(!enforcer.enforce(&[], "cashier", "orders", "cancel").await);
        assert!(!enforcer.enforce(&[], "cashier", "reports", "read").await);
    }

    #[tokio::test]
    async fn grouping_adds_roles_for_a_user() {
        let enforcer = PolicyEnforcer::from_csv(POLICY).unwrap();
        assert!(
            enforcer
                .enforce(&["auditor@kasir.test"], "cashier", "reports", "read")
                .await
        );
        assert!(!enforcer.enforce(&["other@kasir.test"], "cashier", "reports", "read").await);
    }

    #[test]
    fn malformed_rule_is_reported_with_its_line() {
        let err = PolicySet::parse("p, owner, *, *\nx, nope").unwrap_err();
        assert!(matches!(err, PolicyError::Parse { line: 2, .. }));
    }

    #[test]
    fn rules_for_unknown_resources_are_rejected() {
        let err = PolicySet::parse("p, cashier, warehouses, read").unwrap_err();
        assert!(matches!(err, PolicyError::Parse { line: 1, .. }));
    }

    #[tokio::test]
    async fn reload_picks_up_file_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "p, cashier, orders, read").unwrap();
        let enforcer = PolicyEnforcer::load(PolicySource::File(file.path().to_path_buf()))
            .await
            .unwrap();
        assert!(!enforcer.enforce(&[], "cashier", "orders", "create").await);

        writeln!(file, "p, cashier, orders, create").unwrap();
        enforcer.reload().await.unwrap();
        assert!(enforcer.enforce(&[], "cashier", "orders", "create").await);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_rules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "p, cashier, orders, read").unwrap();
        let enforcer = PolicyEnforcer::load(PolicySource::File(file.path().to_path_buf()))
            .await
            .unwrap();

        writeln!(file, "garbage").unwrap();
        assert!(enforcer.reload().await.is_err());
        assert!(enforcer.enforce(&[], "cashier", "orders", "read").await);
    }

    #[test]
    fn bundled_policy_parses() {
        assert!(PolicySet::parse(DEFAULT_POLICY).is_ok());
    }
}
