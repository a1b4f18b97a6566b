use std::{borrow::Cow, collections::HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evaluation context: who is asking and under which circumstances.
///
/// A context is immutable for the duration of an evaluation call. The [`Client`](crate::Client)
/// builds a fresh one on every call by merging its static context (`app_name`, `environment`)
/// with the context supplied by the caller.
///
/// # Examples
/// ```
/// # use toggle_engine::Context;
/// let context = Context::new()
///     .with_user_id("user-42")
///     .with_property("country", "NO");
/// assert_eq!(context.get_field("country").as_deref(), Some("NO"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Identifier of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Identifier of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// IP address of the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    /// Name of the application performing the evaluation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    /// Environment the application runs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Point in time used by date constraints. Defaults to now when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<DateTime<Utc>>,
    /// Arbitrary custom fields.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Context {
        Context::default()
    }

    /// Update `user_id`.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Context {
        self.user_id = Some(user_id.into());
        self
    }

    /// Update `session_id`.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Context {
        self.session_id = Some(session_id.into());
        self
    }

    /// Update `remote_address`.
    pub fn with_remote_address(mut self, remote_address: impl Into<String>) -> Context {
        self.remote_address = Some(remote_address.into());
        self
    }

    /// Update `app_name`.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Context {
        self.app_name = Some(app_name.into());
        self
    }

    /// Update `environment`.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Context {
        self.environment = Some(environment.into());
        self
    }

    /// Update `current_time`.
    pub fn with_current_time(mut self, current_time: DateTime<Utc>) -> Context {
        self.current_time = Some(current_time);
        self
    }

    /// Set a custom property.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Context {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Resolve a field by its wire name.
    ///
    /// Well-known fields (`userId`, `sessionId`, `remoteAddress`, `appName`, `environment`,
    /// `currentTime`) are looked up first. If the field is absent (or empty), the lookup falls back
    /// to `properties[name]`. Empty strings are treated as absent.
    pub fn get_field(&self, name: &str) -> Option<Cow<'_, str>> {
        let top_level = match name {
            "userId" => self.user_id.as_deref().map(Cow::Borrowed),
            "sessionId" => self.session_id.as_deref().map(Cow::Borrowed),
            "remoteAddress" => self.remote_address.as_deref().map(Cow::Borrowed),
            "appName" => self.app_name.as_deref().map(Cow::Borrowed),
            "environment" => self.environment.as_deref().map(Cow::Borrowed),
            "currentTime" => self.current_time.map(|t| Cow::Owned(t.to_rfc3339())),
            _ => None,
        };

        top_level
            .filter(|value| !value.is_empty())
            .or_else(|| {
                self.properties
                    .get(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| Cow::Borrowed(value.as_str()))
            })
    }

    /// Merge a long-lived static context with a per-call context. Fields set on `call` win;
    /// properties are unioned with `call` taking precedence on conflicts.
    pub fn merged(base: &Context, call: &Context) -> Context {
        let mut properties = base.properties.clone();
        properties.extend(
            call.properties
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        Context {
            user_id: call.user_id.clone().or_else(|| base.user_id.clone()),
            session_id: call.session_id.clone().or_else(|| base.session_id.clone()),
            remote_address: call
                .remote_address
                .clone()
                .or_else(|| base.remote_address.clone()),
            app_name: call.app_name.clone().or_else(|| base.app_name.clone()),
            environment: call.environment.clone().or_else(|| base.environment.clone()),
            current_time: call.current_time.or(base.current_time),
            properties,
        }
    }
}
