//! Data model for feature definitions and the snapshot that carries them.
//!
//! Wire-facing types deserialize leniently: a feature with fields of the wrong type is still
//! accepted with best-effort defaults, and the violations are collected so the
//! [`Repository`](crate::repository::Repository) can report them. A feature that cannot be read at
//! all is isolated with [`TryParse`] so the rest of the snapshot remains usable.
use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::Error;

/// Strategy parameters. Scalar wire values (numbers, booleans) are converted to strings.
pub type Parameters = HashMap<String, String>;

/// Stickiness value that selects the built-in `userId → sessionId → …` fallback chain.
pub const DEFAULT_STICKINESS: &str = "default";

/// Strategies whose `groupId` parameter defaults to the feature name.
const ROLLOUT_STRATEGIES: [&str; 3] = [
    "flexibleRollout",
    "gradualRolloutUserId",
    "gradualRolloutSessionId",
];

/// Constraint operators.
///
/// Any operator this crate does not know deserializes to [`Operator::Unknown`], which always
/// evaluates to `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum Operator {
    In,
    NotIn,
    StrStartsWith,
    StrEndsWith,
    StrContains,
    NumEq,
    NumGt,
    NumGte,
    NumLt,
    NumLte,
    DateBefore,
    DateAfter,
    SemverEq,
    SemverGt,
    SemverLt,
    #[serde(other)]
    Unknown,
}

/// A single predicate over one context field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    /// Context field the constraint reads.
    pub context_name: String,
    /// Comparison to apply.
    pub operator: Operator,
    /// Operand list for set-membership and string operators.
    #[serde(default, deserialize_with = "scalar_list")]
    pub values: Vec<String>,
    /// Operand for numeric, date and semver operators.
    #[serde(
        default,
        deserialize_with = "scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
    /// Negate the operator's result.
    #[serde(default, deserialize_with = "null_as_default")]
    pub inverted: bool,
    /// Compare string operands case-insensitively.
    #[serde(default, deserialize_with = "null_as_default")]
    pub case_insensitive: bool,
}

impl Constraint {
    /// Create a constraint over `context_name` with a list of operand values.
    pub fn new(
        context_name: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Constraint {
        Constraint {
            context_name: context_name.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
            value: None,
            inverted: false,
            case_insensitive: false,
        }
    }

    /// Create a constraint over `context_name` with a single operand value.
    pub fn single(
        context_name: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Constraint {
        Constraint {
            context_name: context_name.into(),
            operator,
            values: Vec::new(),
            value: Some(value.into()),
            inverted: false,
            case_insensitive: false,
        }
    }

    /// Negate the result of this constraint.
    pub fn inverted(mut self) -> Constraint {
        self.inverted = true;
        self
    }

    /// Compare string operands case-insensitively.
    pub fn case_insensitive(mut self) -> Constraint {
        self.case_insensitive = true;
        self
    }
}

/// A named, reusable bundle of constraints referenced by id from strategy bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    #[allow(missing_docs)]
    pub id: i64,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Constraints that must all hold.
    #[serde(default, deserialize_with = "null_as_default")]
    pub constraints: Vec<Constraint>,
}

/// One rule attached to a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyBinding {
    /// Name of the strategy to run.
    pub name: String,
    #[allow(missing_docs)]
    #[serde(default, deserialize_with = "parameters")]
    pub parameters: Parameters,
    /// Constraints ANDed with the strategy decision.
    #[serde(default, deserialize_with = "null_as_default")]
    pub constraints: Vec<Constraint>,
    /// Ids of segments whose constraints are ANDed with the strategy decision.
    #[serde(default, deserialize_with = "null_as_default")]
    pub segments: Vec<i64>,
    /// A disabled binding never matches.
    #[serde(default, deserialize_with = "null_as_default")]
    pub disabled: bool,
    /// Variants that take precedence over the feature's variants when this binding matches.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub variants: Vec<VariantDefinition>,
}

impl StrategyBinding {
    /// Create a binding for the named strategy without parameters or constraints.
    pub fn new(name: impl Into<String>) -> StrategyBinding {
        StrategyBinding {
            name: name.into(),
            parameters: Parameters::new(),
            constraints: Vec::new(),
            segments: Vec::new(),
            disabled: false,
            variants: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> StrategyBinding {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> StrategyBinding {
        self.constraints.push(constraint);
        self
    }

    /// Reference a segment.
    pub fn with_segment(mut self, segment_id: i64) -> StrategyBinding {
        self.segments.push(segment_id);
        self
    }
}

/// Payload attached to a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Payload type, e.g. `string` or `json`.
    #[serde(rename = "type")]
    pub payload_type: String,
    #[allow(missing_docs)]
    pub value: String,
}

/// Forces a variant for callers whose context field matches one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Override {
    #[allow(missing_docs)]
    pub context_name: String,
    #[allow(missing_docs)]
    #[serde(default, deserialize_with = "scalar_list")]
    pub values: Vec<String>,
}

/// A weighted experiment arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantDefinition {
    #[allow(missing_docs)]
    pub name: String,
    /// Relative weight. Zero-weight variants are never selected by weighting.
    #[serde(default)]
    pub weight: u32,
    /// Context field used to seed the selection, or `"default"`.
    #[serde(default = "default_stickiness", deserialize_with = "stickiness")]
    pub stickiness: String,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[allow(missing_docs)]
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub overrides: Vec<Override>,
}

impl VariantDefinition {
    /// Create a variant with default stickiness, no payload and no overrides.
    pub fn new(name: impl Into<String>, weight: u32) -> VariantDefinition {
        VariantDefinition {
            name: name.into(),
            weight,
            stickiness: default_stickiness(),
            payload: None,
            overrides: Vec::new(),
        }
    }
}

/// Requirement that a parent feature be in a given state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDependency {
    /// Name of the parent feature.
    pub feature: String,
    /// Expected parent state. Absent means `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// When set, the parent's selected variant must be one of these.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<String>>,
}

/// A feature toggle.
///
/// Deserialization never fails on wrongly-typed `enabled`, `strategies`, `variants` or
/// `dependencies`; see the module documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawFeature")]
pub struct FeatureDefinition {
    #[allow(missing_docs)]
    pub name: String,
    /// Master switch, consulted directly when the feature has no strategies.
    pub enabled: bool,
    #[allow(missing_docs)]
    pub strategies: Vec<StrategyBinding>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantDefinition>,
    #[allow(missing_docs)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<FeatureDependency>,
    /// Shape violations found while deserializing. Drained when the feature is installed.
    #[serde(skip)]
    pub(crate) shape_errors: Vec<String>,
}

impl FeatureDefinition {
    /// Create an enabled or disabled feature without strategies.
    pub fn new(name: impl Into<String>, enabled: bool) -> FeatureDefinition {
        FeatureDefinition {
            name: name.into(),
            enabled,
            strategies: Vec::new(),
            variants: Vec::new(),
            dependencies: Vec::new(),
            shape_errors: Vec::new(),
        }
    }

    /// Attach a strategy binding.
    pub fn with_strategy(mut self, strategy: StrategyBinding) -> FeatureDefinition {
        self.strategies.push(strategy);
        self
    }

    /// Attach a variant.
    pub fn with_variant(mut self, variant: VariantDefinition) -> FeatureDefinition {
        self.variants.push(variant);
        self
    }

    /// Attach a parent dependency.
    pub fn with_dependency(mut self, dependency: FeatureDependency) -> FeatureDefinition {
        self.dependencies.push(dependency);
        self
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeature {
    name: String,
    #[serde(default)]
    enabled: Value,
    #[serde(default)]
    strategies: Value,
    #[serde(default)]
    variants: Value,
    #[serde(default)]
    dependencies: Value,
}

impl From<RawFeature> for FeatureDefinition {
    fn from(raw: RawFeature) -> FeatureDefinition {
        let mut shape_errors = Vec::new();

        let strategies = match raw.strategies {
            Value::Array(items) => parse_items::<StrategyBinding>(items, "strategies")
                .map_err(|err| shape_errors.push(err))
                .ok(),
            other => {
                shape_errors.push(format!(
                    "feature.strategies should be an array, but was {}",
                    json_type(&other)
                ));
                None
            }
        };

        let variants = match raw.variants {
            Value::Null => Vec::new(),
            Value::Array(items) => parse_items(items, "variants").unwrap_or_else(|err| {
                shape_errors.push(err);
                Vec::new()
            }),
            other => {
                shape_errors.push(format!(
                    "feature.variants should be an array, but was {}",
                    json_type(&other)
                ));
                Vec::new()
            }
        };

        let dependencies = match raw.dependencies {
            Value::Null => Vec::new(),
            Value::Array(items) => parse_items(items, "dependencies").unwrap_or_else(|err| {
                shape_errors.push(err);
                Vec::new()
            }),
            other => {
                shape_errors.push(format!(
                    "feature.dependencies should be an array, but was {}",
                    json_type(&other)
                ));
                Vec::new()
            }
        };

        let enabled = match raw.enabled {
            Value::Bool(enabled) => enabled,
            other => {
                shape_errors.push(format!(
                    "feature.enabled should be a boolean, but was {}",
                    json_type(&other)
                ));
                false
            }
        };

        // Unreadable rules must not degrade into a plain "enabled" toggle.
        let enabled = enabled && strategies.is_some();

        FeatureDefinition {
            name: raw.name,
            enabled,
            strategies: strategies.unwrap_or_default(),
            variants,
            dependencies,
            shape_errors,
        }
    }
}

fn parse_items<T: serde::de::DeserializeOwned>(
    items: Vec<Value>,
    field: &str,
) -> Result<Vec<T>, String> {
    items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|err| format!("feature.{field} contains an invalid entry ({err})"))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(Value),
}

impl<T> From<T> for TryParse<T> {
    fn from(value: T) -> TryParse<T> {
        TryParse::Parsed(value)
    }
}

/// Wire form of a snapshot, as produced by a bootstrap provider, a remote source or a backup
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFeatures {
    #[allow(missing_docs)]
    #[serde(default = "default_version")]
    pub version: u32,
    #[allow(missing_docs)]
    #[serde(default)]
    pub features: Vec<TryParse<FeatureDefinition>>,
    #[allow(missing_docs)]
    #[serde(default)]
    pub segments: Vec<TryParse<Segment>>,
}

impl ClientFeatures {
    /// Create a wire snapshot from already-built definitions.
    pub fn new(features: Vec<FeatureDefinition>, segments: Vec<Segment>) -> ClientFeatures {
        ClientFeatures {
            version: default_version(),
            features: features.into_iter().map(TryParse::from).collect(),
            segments: segments.into_iter().map(TryParse::from).collect(),
        }
    }

    /// Returns `true` if there are no feature entries.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Build an installable [`Snapshot`], returning every shape problem found along the way.
    ///
    /// Problems never prevent the conversion: unparseable entries are dropped and wrongly-typed
    /// fields are replaced with defaults. Rollout bindings without a `groupId` parameter get the
    /// feature name.
    pub fn into_snapshot(self) -> (Snapshot, Vec<Error>) {
        let mut problems = Vec::new();

        let mut features = HashMap::with_capacity(self.features.len());
        for entry in self.features {
            match entry {
                TryParse::Parsed(mut feature) => {
                    let shape_errors = std::mem::take(&mut feature.shape_errors);
                    if !shape_errors.is_empty() {
                        problems.push(Error::InvalidFeature {
                            feature: feature.name.clone(),
                            reason: shape_errors.join(", "),
                        });
                    }
                    default_group_ids(&mut feature);
                    features.insert(feature.name.clone(), feature);
                }
                TryParse::ParseFailed(value) => {
                    problems.push(Error::UnparseableFeature(describe_entry(&value)));
                }
            }
        }

        let mut segments = HashMap::with_capacity(self.segments.len());
        for entry in self.segments {
            match entry {
                TryParse::Parsed(segment) => {
                    segments.insert(segment.id, segment);
                }
                TryParse::ParseFailed(value) => {
                    problems.push(Error::UnparseableFeature(format!(
                        "segment {}",
                        describe_entry(&value)
                    )));
                }
            }
        }

        let snapshot = Snapshot {
            version: self.version,
            features,
            segments,
        };
        (snapshot, problems)
    }
}

fn describe_entry(value: &Value) -> String {
    value
        .get("name")
        .or_else(|| value.get("id"))
        .map(|name| name.to_string())
        .unwrap_or_else(|| "<unnamed>".to_owned())
}

fn default_group_ids(feature: &mut FeatureDefinition) {
    for binding in &mut feature.strategies {
        if ROLLOUT_STRATEGIES.contains(&binding.name.as_str()) {
            binding
                .parameters
                .entry("groupId".to_owned())
                .or_insert_with(|| feature.name.clone());
        }
    }
}

/// The unit the repository swaps atomically: every feature and segment known at one point in
/// time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ClientFeatures", into = "ClientFeatures")]
pub struct Snapshot {
    #[allow(missing_docs)]
    pub version: u32,
    /// Features keyed by name.
    pub features: HashMap<String, FeatureDefinition>,
    /// Segments keyed by id.
    pub segments: HashMap<i64, Segment>,
}

impl Snapshot {
    /// Look up a feature by name.
    pub fn get_feature(&self, name: &str) -> Option<&FeatureDefinition> {
        self.features.get(name)
    }

    /// Look up a segment by id.
    pub fn get_segment(&self, id: i64) -> Option<&Segment> {
        self.segments.get(&id)
    }

    /// Returns `true` if the snapshot holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<ClientFeatures> for Snapshot {
    fn from(value: ClientFeatures) -> Snapshot {
        value.into_snapshot().0
    }
}

impl From<Snapshot> for ClientFeatures {
    fn from(value: Snapshot) -> ClientFeatures {
        let mut features = value.features.into_values().collect::<Vec<_>>();
        features.sort_by(|a, b| a.name.cmp(&b.name));
        let mut segments = value.segments.into_values().collect::<Vec<_>>();
        segments.sort_by_key(|segment| segment.id);

        ClientFeatures {
            version: value.version,
            ..ClientFeatures::new(features, segments)
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_stickiness() -> String {
    DEFAULT_STICKINESS.to_owned()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn stickiness<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default_stickiness))
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Value::deserialize(deserializer).map(scalar_to_string)?)
}

fn scalar_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values.into_iter().filter_map(scalar_to_string).collect())
}

fn parameters<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Parameters, D::Error> {
    let raw = Option::<HashMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| scalar_to_string(value).map(|value| (key, value)))
        .collect())
}
