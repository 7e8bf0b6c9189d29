//! Listener rule allocation.
//!
//! Every deployed service gets a target group plus listener rules
//! routing traffic to it. Rules are path-based by default; a deploy
//! spec may instead carry explicit host/path conditions, optionally
//! guarded by identity-provider auth. Priorities are allocated above
//! the highest priority currently present on any listener, so a batch
//! of new rules never collides with existing ones.

use std::sync::Arc;

use convoy_cloud::{
    CloudProvider, ListenerProtocol, RuleAction, RuleDescription, RuleMatch,
    TargetGroupAttributes, TargetGroupPlan,
};
use convoy_state::{DeploySpec, RuleCondition};
use tracing::debug;

use crate::error::RoutingResult;

/// Gap left above the current highest priority when allocating.
const PRIORITY_GAP: u64 = 10;

pub struct RuleAllocator<C> {
    cloud: Arc<C>,
    /// DNS domain appended to hostname conditions.
    domain: String,
}

impl<C: CloudProvider> RuleAllocator<C> {
    pub fn new(cloud: Arc<C>, domain: impl Into<String>) -> Self {
        Self {
            cloud,
            domain: domain.into(),
        }
    }

    /// Create the service's target group and apply its post-creation
    /// attributes. Health check fields left unset in the spec fall
    /// back to provider defaults.
    pub async fn create_target_group(
        &self,
        service_name: &str,
        spec: &DeploySpec,
    ) -> RoutingResult<String> {
        let plan = TargetGroupPlan {
            service_name: service_name.to_string(),
            protocol: spec.service_protocol.clone(),
            port: spec.service_port,
            health_check: spec.health_check.clone(),
        };
        let target_group_ref = self.cloud.create_target_group(&plan).await?;

        if spec.deregistration_delay_secs.is_some() || spec.stickiness.enabled {
            let attributes = TargetGroupAttributes {
                deregistration_delay_secs: spec.deregistration_delay_secs,
                stickiness_enabled: spec.stickiness.enabled,
                stickiness_duration_secs: spec.stickiness.duration_secs,
            };
            self.cloud
                .modify_target_group_attributes(&target_group_ref, &attributes)
                .await?;
        }
        debug!(service = %service_name, %target_group_ref, "target group created");
        Ok(target_group_ref)
    }

    /// Highest rule priority across all listeners of the load
    /// balancer; 0 when no prioritized rules exist.
    pub async fn highest_priority(&self, load_balancer: &str) -> RoutingResult<u64> {
        let mut highest = 0;
        for listener in self.cloud.list_listeners(load_balancer).await? {
            for rule in self.cloud.list_rules(&listener.listener_ref).await? {
                if let Some(priority) = rule.priority {
                    highest = highest.max(priority);
                }
            }
        }
        Ok(highest)
    }

    /// Create the listener rules for a service and return the
    /// listeners they landed on.
    pub async fn allocate(
        &self,
        service_name: &str,
        spec: &DeploySpec,
        target_group_ref: &str,
        load_balancer: &str,
    ) -> RoutingResult<Vec<String>> {
        let highest = self.highest_priority(load_balancer).await?;
        if spec.rule_conditions.is_empty() {
            self.allocate_default(service_name, target_group_ref, load_balancer, highest)
                .await
        } else {
            self.allocate_conditions(spec, target_group_ref, load_balancer, highest)
                .await
        }
    }

    /// Default allocation: `/{service}` and `/{service}/*` on every
    /// listener, just above the current highest priority.
    async fn allocate_default(
        &self,
        service_name: &str,
        target_group_ref: &str,
        load_balancer: &str,
        highest: u64,
    ) -> RoutingResult<Vec<String>> {
        debug!(service = %service_name, highest, "allocating default path rules");
        let forward = [RuleAction::Forward {
            target_group_ref: target_group_ref.to_string(),
        }];
        let exact = [RuleMatch::PathPattern(format!("/{service_name}"))];
        let prefix = [RuleMatch::PathPattern(format!("/{service_name}/*"))];

        let mut used = Vec::new();
        for listener in self.cloud.list_listeners(load_balancer).await? {
            self.cloud
                .create_rule(
                    &listener.listener_ref,
                    highest + PRIORITY_GAP,
                    &exact,
                    &forward,
                )
                .await?;
            self.cloud
                .create_rule(
                    &listener.listener_ref,
                    highest + PRIORITY_GAP + 1,
                    &prefix,
                    &forward,
                )
                .await?;
            used.push(listener.listener_ref);
        }
        Ok(used)
    }

    /// Explicit-condition allocation. Conditions are applied longest
    /// path first; all listeners of one condition share a priority,
    /// and the offset advances by the condition's listener count. A
    /// plain HTTP listener whose condition carries identity-provider
    /// auth gets an HTTPS redirect instead of a forward.
    async fn allocate_conditions(
        &self,
        spec: &DeploySpec,
        target_group_ref: &str,
        load_balancer: &str,
        highest: u64,
    ) -> RoutingResult<Vec<String>> {
        let listeners = self.cloud.list_listeners(load_balancer).await?;
        let mut conditions = spec.rule_conditions.clone();
        conditions.sort_by_key(|c| {
            std::cmp::Reverse(c.path_pattern.as_deref().unwrap_or_default().len())
        });

        let mut used = Vec::new();
        let mut new_rules: u64 = 0;
        for condition in &conditions {
            let matches = self.rule_matches(condition);
            let priority = highest + PRIORITY_GAP + new_rules;

            for listener in listeners
                .iter()
                .filter(|l| condition.listeners.iter().any(|p| protocol_is(l.protocol, p)))
            {
                let actions = if listener.protocol == ListenerProtocol::Http
                    && condition.auth.is_some()
                {
                    debug!(
                        listener = %listener.listener_ref,
                        "auth requires https, emitting redirect rule"
                    );
                    vec![RuleAction::RedirectToHttps]
                } else {
                    let mut actions = Vec::new();
                    if let Some(auth) = &condition.auth {
                        actions.push(RuleAction::AuthenticateIdp {
                            user_pool: auth.user_pool.clone(),
                            client_name: auth.client_name.clone(),
                            domain: auth.domain.clone(),
                        });
                    }
                    actions.push(RuleAction::Forward {
                        target_group_ref: target_group_ref.to_string(),
                    });
                    actions
                };
                self.cloud
                    .create_rule(&listener.listener_ref, priority, &matches, &actions)
                    .await?;
                used.push(listener.listener_ref.clone());
            }
            new_rules += condition.listeners.len() as u64;
        }
        Ok(used)
    }

    /// Delete every rule routing to the target group, across all
    /// listeners of the load balancer. Redirect rules carry no target
    /// group ref, so they are matched by sharing conditions with a
    /// deleted auth rule, mirroring how they were created. Returns the
    /// number of rules removed.
    pub async fn deallocate(
        &self,
        target_group_ref: &str,
        load_balancer: &str,
    ) -> RoutingResult<usize> {
        let mut to_delete = Vec::new();
        let mut auth_conditions: Vec<Vec<RuleMatch>> = Vec::new();
        let mut redirects: Vec<RuleDescription> = Vec::new();
        for listener in self.cloud.list_listeners(load_balancer).await? {
            for rule in self.cloud.list_rules(&listener.listener_ref).await? {
                let forwards_here = rule.actions.iter().any(|a| {
                    matches!(a, RuleAction::Forward { target_group_ref: tg } if tg == target_group_ref)
                });
                if forwards_here {
                    if rule
                        .actions
                        .iter()
                        .any(|a| matches!(a, RuleAction::AuthenticateIdp { .. }))
                    {
                        auth_conditions.push(rule.conditions.clone());
                    }
                    to_delete.push(rule.rule_ref);
                } else if rule.actions == [RuleAction::RedirectToHttps] {
                    redirects.push(rule);
                }
            }
        }
        for redirect in redirects {
            if auth_conditions.contains(&redirect.conditions) {
                to_delete.push(redirect.rule_ref);
            }
        }
        let removed = to_delete.len();
        for rule_ref in &to_delete {
            self.cloud.delete_rule(rule_ref).await?;
        }
        debug!(%target_group_ref, removed, "listener rules deallocated");
        Ok(removed)
    }

    /// Find the rule on a listener that forwards to (or redirects for)
    /// the target group under exactly the given condition. Reads
    /// metadata only.
    pub async fn find_rule(
        &self,
        listener_ref: &str,
        target_group_ref: &str,
        condition: &RuleCondition,
    ) -> RoutingResult<Option<RuleDescription>> {
        let expected = self.rule_matches(condition);
        for rule in self.cloud.list_rules(listener_ref).await? {
            let action_matches = rule.actions.iter().any(|a| match a {
                RuleAction::Forward { target_group_ref: tg } => tg == target_group_ref,
                RuleAction::RedirectToHttps => true,
                RuleAction::AuthenticateIdp { .. } => false,
            });
            if action_matches && expected.iter().all(|m| rule.conditions.contains(m)) {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    /// Translate a deploy condition into provider rule matches.
    /// Hostnames are qualified with the allocator's domain.
    fn rule_matches(&self, condition: &RuleCondition) -> Vec<RuleMatch> {
        let mut matches = Vec::new();
        if let Some(path) = &condition.path_pattern {
            matches.push(RuleMatch::PathPattern(path.clone()));
        }
        if let Some(hostname) = &condition.hostname {
            matches.push(RuleMatch::HostHeader(format!(
                "{hostname}.{}",
                self.domain
            )));
        }
        matches
    }
}

fn protocol_is(protocol: ListenerProtocol, name: &str) -> bool {
    match protocol {
        ListenerProtocol::Http => name.eq_ignore_ascii_case("http"),
        ListenerProtocol::Https => name.eq_ignore_ascii_case("https"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_cloud::fake::FakeCloud;
    use convoy_state::IdpAuth;

    fn allocator(cloud: Arc<FakeCloud>) -> RuleAllocator<FakeCloud> {
        RuleAllocator::new(cloud, "example.com")
    }

    fn spec_with_conditions(conditions: Vec<RuleCondition>) -> DeploySpec {
        DeploySpec {
            cluster: "production".into(),
            service_port: 8080,
            service_protocol: "http".into(),
            desired_count: 1,
            rule_conditions: conditions,
            ..Default::default()
        }
    }

    fn seed_listeners(cloud: &FakeCloud) {
        cloud.script_listener("lb-prod", "listener/http", ListenerProtocol::Http);
        cloud.script_listener("lb-prod", "listener/https", ListenerProtocol::Https);
    }

    #[tokio::test]
    async fn default_rules_on_all_listeners() {
        let cloud = Arc::new(FakeCloud::new());
        seed_listeners(&cloud);
        let allocator = allocator(cloud.clone());

        let used = allocator
            .allocate("web", &spec_with_conditions(vec![]), "tg/web", "lb-prod")
            .await
            .unwrap();
        assert_eq!(used, vec!["listener/http", "listener/https"]);

        for listener in ["listener/http", "listener/https"] {
            let rules = cloud.rules_for(listener);
            assert_eq!(rules.len(), 2);
            assert_eq!(rules[0].priority, Some(10));
            assert_eq!(
                rules[0].conditions,
                vec![RuleMatch::PathPattern("/web".into())]
            );
            assert_eq!(rules[1].priority, Some(11));
            assert_eq!(
                rules[1].conditions,
                vec![RuleMatch::PathPattern("/web/*".into())]
            );
        }
    }

    #[tokio::test]
    async fn batch_priorities_exceed_existing_highest() {
        let cloud = Arc::new(FakeCloud::new());
        seed_listeners(&cloud);
        cloud.script_rule(
            "listener/https",
            RuleDescription {
                rule_ref: "rule/preexisting".into(),
                priority: Some(42),
                conditions: vec![RuleMatch::PathPattern("/other".into())],
                actions: vec![RuleAction::Forward {
                    target_group_ref: "tg/other".into(),
                }],
            },
        );
        let allocator = allocator(cloud.clone());

        allocator
            .allocate("web", &spec_with_conditions(vec![]), "tg/web", "lb-prod")
            .await
            .unwrap();

        let priorities: Vec<u64> = cloud
            .rules_for("listener/http")
            .iter()
            .filter_map(|r| r.priority)
            .collect();
        assert!(priorities.iter().all(|p| *p > 42));
        assert_eq!(priorities, vec![52, 53]);
    }

    #[tokio::test]
    async fn conditions_sorted_longest_path_first_share_priority_per_condition() {
        let cloud = Arc::new(FakeCloud::new());
        seed_listeners(&cloud);
        let allocator = allocator(cloud.clone());

        let spec = spec_with_conditions(vec![
            RuleCondition {
                listeners: vec!["http".into(), "https".into()],
                path_pattern: Some("/api".into()),
                ..Default::default()
            },
            RuleCondition {
                listeners: vec!["https".into()],
                path_pattern: Some("/api/internal/*".into()),
                hostname: Some("api".into()),
                ..Default::default()
            },
        ]);

        allocator
            .allocate("api", &spec, "tg/api", "lb-prod")
            .await
            .unwrap();

        // The longer path wins the lower priority slot, on https only.
        let https = cloud.rules_for("listener/https");
        assert_eq!(https.len(), 2);
        assert_eq!(https[0].priority, Some(10));
        assert!(https[0]
            .conditions
            .contains(&RuleMatch::PathPattern("/api/internal/*".into())));
        assert!(https[0]
            .conditions
            .contains(&RuleMatch::HostHeader("api.example.com".into())));
        // The second condition's priority advanced by the first's
        // listener count.
        assert_eq!(https[1].priority, Some(11));

        let http = cloud.rules_for("listener/http");
        assert_eq!(http.len(), 1);
        assert_eq!(http[0].priority, Some(11));
    }

    #[tokio::test]
    async fn auth_over_plain_http_becomes_redirect() {
        let cloud = Arc::new(FakeCloud::new());
        seed_listeners(&cloud);
        let allocator = allocator(cloud.clone());

        let spec = spec_with_conditions(vec![RuleCondition {
            listeners: vec!["http".into(), "https".into()],
            hostname: Some("admin".into()),
            auth: Some(IdpAuth {
                client_name: "admin-client".into(),
                user_pool: "pool-1".into(),
                domain: "auth.example.com".into(),
            }),
            ..Default::default()
        }]);

        allocator
            .allocate("admin", &spec, "tg/admin", "lb-prod")
            .await
            .unwrap();

        let http = cloud.rules_for("listener/http");
        assert_eq!(http.len(), 1);
        assert_eq!(http[0].actions, vec![RuleAction::RedirectToHttps]);

        let https = cloud.rules_for("listener/https");
        assert_eq!(https.len(), 1);
        assert!(matches!(
            https[0].actions[0],
            RuleAction::AuthenticateIdp { .. }
        ));
        assert!(matches!(https[0].actions[1], RuleAction::Forward { .. }));
    }

    #[tokio::test]
    async fn deallocate_removes_forward_and_paired_redirect_rules() {
        let cloud = Arc::new(FakeCloud::new());
        seed_listeners(&cloud);
        cloud.script_rule(
            "listener/https",
            RuleDescription {
                rule_ref: "rule/other".into(),
                priority: Some(5),
                conditions: vec![RuleMatch::PathPattern("/other".into())],
                actions: vec![RuleAction::Forward {
                    target_group_ref: "tg/other".into(),
                }],
            },
        );
        let allocator = allocator(cloud.clone());

        // Auth over http emits a redirect rule with no target group.
        let spec = spec_with_conditions(vec![RuleCondition {
            listeners: vec!["http".into(), "https".into()],
            hostname: Some("admin".into()),
            auth: Some(IdpAuth {
                client_name: "admin-client".into(),
                user_pool: "pool-1".into(),
                domain: "auth.example.com".into(),
            }),
            ..Default::default()
        }]);
        allocator
            .allocate("admin", &spec, "tg/admin", "lb-prod")
            .await
            .unwrap();
        assert_eq!(cloud.rules_for("listener/http").len(), 1);
        assert_eq!(cloud.rules_for("listener/https").len(), 2);

        let removed = allocator.deallocate("tg/admin", "lb-prod").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cloud.rules_for("listener/http").is_empty());

        // Rules for other target groups are untouched.
        let remaining = cloud.rules_for("listener/https");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].rule_ref, "rule/other");
    }

    #[tokio::test]
    async fn find_rule_matches_exact_conditions_only() {
        let cloud = Arc::new(FakeCloud::new());
        seed_listeners(&cloud);
        let allocator = allocator(cloud.clone());

        let spec = spec_with_conditions(vec![RuleCondition {
            listeners: vec!["https".into()],
            path_pattern: Some("/api".into()),
            hostname: Some("api".into()),
            ..Default::default()
        }]);
        allocator
            .allocate("api", &spec, "tg/api", "lb-prod")
            .await
            .unwrap();

        let found = allocator
            .find_rule("listener/https", "tg/api", &spec.rule_conditions[0])
            .await
            .unwrap();
        assert!(found.is_some());

        let other = RuleCondition {
            listeners: vec!["https".into()],
            path_pattern: Some("/nope".into()),
            ..Default::default()
        };
        let missing = allocator
            .find_rule("listener/https", "tg/api", &other)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn target_group_attributes_applied_when_configured() {
        let cloud = Arc::new(FakeCloud::new());
        let allocator = allocator(cloud.clone());

        let mut spec = spec_with_conditions(vec![]);
        let tg = allocator.create_target_group("web", &spec).await.unwrap();
        assert_eq!(tg, "tg/web");
        assert_eq!(cloud.call_count("modify_target_group_attributes"), 0);

        spec.stickiness.enabled = true;
        allocator.create_target_group("web", &spec).await.unwrap();
        assert_eq!(cloud.call_count("modify_target_group_attributes"), 1);
    }
}
