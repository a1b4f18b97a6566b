use rand::{thread_rng, Rng};

use super::{percentage, Strategy};
use crate::{
    models::{Parameters, DEFAULT_STICKINESS},
    normalize::normalize_percentage,
    Context,
};

/// `true` if `identifier` hashes into the first `percentage` buckets of `group_id`.
fn in_rollout(identifier: &str, group_id: &str, percentage: f64) -> bool {
    percentage > 0.0 && f64::from(normalize_percentage(identifier, group_id)) <= percentage
}

fn group_id(parameters: &Parameters) -> &str {
    parameters
        .get("groupId")
        .map(String::as_str)
        .unwrap_or_default()
}

fn random_percentile() -> u32 {
    thread_rng().gen_range(1..=100)
}

/// Percentage rollout with configurable stickiness.
///
/// Parameters: `rollout` (falling back to `percentage`), `stickiness` and `groupId`.
/// - `"default"` stickiness uses `userId`, then `sessionId`, then a random value.
/// - `"random"` ignores the context.
/// - Any other value names a context field. A caller without it never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleRolloutStrategy;

impl Strategy for FlexibleRolloutStrategy {
    fn name(&self) -> &str {
        "flexibleRollout"
    }

    fn is_enabled(&self, parameters: &Parameters, context: &Context) -> bool {
        let Some(rollout) =
            percentage(parameters, "rollout").or_else(|| percentage(parameters, "percentage"))
        else {
            return false;
        };
        let group_id = group_id(parameters);

        let stickiness = parameters
            .get("stickiness")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STICKINESS);

        let identifier = match stickiness {
            DEFAULT_STICKINESS => context
                .get_field("userId")
                .or_else(|| context.get_field("sessionId"))
                .map(|id| id.into_owned())
                .unwrap_or_else(|| random_percentile().to_string()),
            "random" => random_percentile().to_string(),
            field => match context.get_field(field) {
                Some(id) => id.into_owned(),
                None => return false,
            },
        };

        in_rollout(&identifier, group_id, rollout)
    }
}

/// Percentage rollout sticky on `userId`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradualRolloutUserIdStrategy;

impl Strategy for GradualRolloutUserIdStrategy {
    fn name(&self) -> &str {
        "gradualRolloutUserId"
    }

    fn is_enabled(&self, parameters: &Parameters, context: &Context) -> bool {
        let (Some(user_id), Some(rollout)) = (
            context.get_field("userId"),
            percentage(parameters, "percentage"),
        ) else {
            return false;
        };
        in_rollout(&user_id, group_id(parameters), rollout)
    }
}

/// Percentage rollout sticky on `sessionId`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradualRolloutSessionIdStrategy;

impl Strategy for GradualRolloutSessionIdStrategy {
    fn name(&self) -> &str {
        "gradualRolloutSessionId"
    }

    fn is_enabled(&self, parameters: &Parameters, context: &Context) -> bool {
        let (Some(session_id), Some(rollout)) = (
            context.get_field("sessionId"),
            percentage(parameters, "percentage"),
        ) else {
            return false;
        };
        in_rollout(&session_id, group_id(parameters), rollout)
    }
}

/// Non-sticky percentage rollout.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradualRolloutRandomStrategy;

impl Strategy for GradualRolloutRandomStrategy {
    fn name(&self) -> &str {
        "gradualRolloutRandom"
    }

    fn is_enabled(&self, parameters: &Parameters, _context: &Context) -> bool {
        percentage(parameters, "percentage")
            .is_some_and(|rollout| f64::from(random_percentile()) <= rollout)
    }
}
