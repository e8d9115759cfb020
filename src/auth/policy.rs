//! Policy Generator
//! Mission: Turn a verified principal into an execute-api access decision

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const POLICY_VERSION: &str = "2012-10-17";
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// How the triggering resource is mapped into the decision.
///
/// `StageWildcard` widens the grant to every method and path of the stage so
/// the router can cache one decision per stage. A leaked token is then good
/// for the whole stage, so enabling it needs explicit sign-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceScope {
    Exact,
    StageWildcard,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("resource identifier has no api-id/stage segment: {0}")]
    MalformedResource(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Resource")]
    pub resource: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statement: Vec<Statement>,
}

/// Authorizer response consumed by the enforcing router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

#[cfg(test)]
impl AccessDecision {
    pub fn effect(&self) -> Option<Effect> {
        self.policy_document.statement.first().map(|s| s.effect)
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.policy_document
            .statement
            .iter()
            .flat_map(|s| s.resource.iter().map(String::as_str))
    }
}

pub struct PolicyGenerator;

impl PolicyGenerator {
    pub fn generate(
        principal_id: &str,
        effect: Effect,
        resource: &str,
        scope: ResourceScope,
        context: Option<Map<String, Value>>,
    ) -> Result<AccessDecision, PolicyError> {
        let resource = match scope {
            ResourceScope::Exact => resource.to_string(),
            ResourceScope::StageWildcard => widen_to_stage(resource)?,
        };

        Ok(AccessDecision {
            principal_id: principal_id.to_string(),
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement: vec![Statement {
                    action: INVOKE_ACTION.to_string(),
                    effect,
                    resource: vec![resource],
                }],
            },
            context,
        })
    }
}

/// Rewrite `arn:...:<api-id>/<stage>/<method>/<path..>` into
/// `arn:...:<api-id>/<stage>/*/*`.
pub fn widen_to_stage(resource: &str) -> Result<String, PolicyError> {
    let malformed = || PolicyError::MalformedResource(resource.to_string());

    // api-id/stage/... lives after the fifth ':' of the ARN
    let (prefix, path) = match resource.match_indices(':').nth(4) {
        Some((idx, _)) => (&resource[..idx], &resource[idx + 1..]),
        None => return Err(malformed()),
    };

    let mut segments = path.split('/');
    let api_id = segments.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;
    let stage = segments.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;

    Ok(format!("{}:{}/{}/*/*", prefix, api_id, stage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARN: &str = "arn:aws:execute-api:us-east-1:123:abcde/prod/GET/projects/42";

    #[test]
    fn test_widen_to_stage() {
        assert_eq!(
            widen_to_stage(ARN).unwrap(),
            "arn:aws:execute-api:us-east-1:123:abcde/prod/*/*"
        );
    }

    #[test]
    fn test_widen_without_method_still_keeps_stage() {
        assert_eq!(
            widen_to_stage("arn:aws:execute-api:eu-west-1:9:api/dev").unwrap(),
            "arn:aws:execute-api:eu-west-1:9:api/dev/*/*"
        );
    }

    #[test]
    fn test_widen_rejects_missing_stage() {
        assert!(widen_to_stage("arn:aws:execute-api:us-east-1:123:abcde").is_err());
        assert!(widen_to_stage("abcde/prod/GET").is_err());
        assert!(widen_to_stage("").is_err());
    }

    #[test]
    fn test_exact_mode_keeps_resource_verbatim() {
        let decision =
            PolicyGenerator::generate("u-1", Effect::Allow, ARN, ResourceScope::Exact, None)
                .unwrap();

        assert_eq!(decision.resources().collect::<Vec<_>>(), vec![ARN]);
        assert_eq!(decision.effect(), Some(Effect::Allow));
    }

    #[test]
    fn test_decision_wire_shape() {
        let mut context = Map::new();
        context.insert("userId".into(), json!("u-1"));
        context.insert("email".into(), json!("ana@x.com"));

        let decision = PolicyGenerator::generate(
            "u-1",
            Effect::Allow,
            ARN,
            ResourceScope::StageWildcard,
            Some(context),
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "principalId": "u-1",
                "policyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Action": "execute-api:Invoke",
                        "Effect": "Allow",
                        "Resource": ["arn:aws:execute-api:us-east-1:123:abcde/prod/*/*"]
                    }]
                },
                "context": {"userId": "u-1", "email": "ana@x.com"}
            })
        );
    }

    #[test]
    fn test_deny_effect_serializes() {
        let decision =
            PolicyGenerator::generate("u-1", Effect::Deny, ARN, ResourceScope::Exact, None)
                .unwrap();
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["policyDocument"]["Statement"][0]["Effect"], "Deny");
        assert!(json.get("context").is_none());
    }
}
