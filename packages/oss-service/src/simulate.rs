use serde::{Deserialize, Serialize};
use uuid::Uuid;

use oss_domain::{
	normalize,
	routing::{RouteInput, allowlist_matches, rule_matches},
};
use oss_storage::routing;

use crate::{OssService, Result, route::predicates_of};

#[derive(Clone, Debug, Deserialize)]
pub struct RoutingSimulationRequest {
	pub recipient: String,
	pub sender_email: String,
	pub direction: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchedRuleView {
	pub routing_rule_id: Uuid,
	pub name: String,
	pub priority: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct AppliedActionsView {
	pub assign_queue_id: Option<Uuid>,
	pub assign_user_id: Option<Uuid>,
	pub set_status: Option<String>,
	pub drop: bool,
	pub auto_close: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoutingSimulationResult {
	pub allowlisted: bool,
	pub would_mark_spam: bool,
	pub matched_rule: Option<MatchedRuleView>,
	pub applied_actions: AppliedActionsView,
	pub explanation: String,
}

impl OssService {
	/// The routing evaluator without the commit: same allowlist, same rule
	/// order, same predicates as `ticket_apply_routing`.
	pub async fn simulate_routing(
		&self,
		organization_id: Uuid,
		req: RoutingSimulationRequest,
	) -> Result<RoutingSimulationResult> {
		let recipient = req.recipient.trim().to_lowercase();
		let sender_email = req.sender_email.trim().to_lowercase();
		let sender_domain = normalize::email_domain(&sender_email).unwrap_or_default().to_string();
		let direction = req.direction.trim().to_lowercase();
		let patterns =
			routing::list_enabled_allowlist_patterns(&self.db.pool, organization_id).await?;

		if !allowlist_matches(&patterns, &recipient) {
			let shown = if recipient.is_empty() { "unknown" } else { recipient.as_str() };

			return Ok(RoutingSimulationResult {
				allowlisted: false,
				would_mark_spam: true,
				matched_rule: None,
				applied_actions: AppliedActionsView {
					assign_queue_id: None,
					assign_user_id: None,
					set_status: Some("spam".to_string()),
					drop: false,
					auto_close: false,
				},
				explanation: format!(
					"Recipient {shown:?} is not allowlisted, so routing would mark the ticket as spam."
				),
			});
		}

		let rules = routing::list_enabled_rules(&self.db.pool, organization_id).await?;
		let input = RouteInput {
			recipient: &recipient,
			sender_email: &sender_email,
			sender_domain: &sender_domain,
			direction: direction.parse().ok(),
		};

		for rule in &rules {
			if !rule_matches(&predicates_of(rule), &input) {
				continue;
			}

			return Ok(RoutingSimulationResult {
				allowlisted: true,
				would_mark_spam: false,
				matched_rule: Some(MatchedRuleView {
					routing_rule_id: rule.routing_rule_id,
					name: rule.name.clone(),
					priority: rule.priority,
				}),
				applied_actions: AppliedActionsView {
					assign_queue_id: rule.action_assign_queue_id,
					assign_user_id: rule.action_assign_user_id,
					set_status: rule.action_set_status.clone(),
					drop: rule.action_drop,
					auto_close: rule.action_auto_close,
				},
				explanation: format!(
					"Matched rule {:?} (priority {}) for recipient {recipient:?}, sender {sender_email:?}, direction {direction:?}.",
					rule.name, rule.priority
				),
			});
		}

		Ok(RoutingSimulationResult {
			allowlisted: true,
			would_mark_spam: false,
			matched_rule: None,
			applied_actions: AppliedActionsView {
				assign_queue_id: None,
				assign_user_id: None,
				set_status: None,
				drop: false,
				auto_close: false,
			},
			explanation: format!(
				"No enabled routing rule matched recipient {recipient:?}, sender {sender_email:?}, direction {direction:?}."
			),
		})
	}
}
