/// Auth email hook payloads
///
/// The identity provider has shipped two payload layouts over time:
///
/// - **current**: a top-level `email_data` object with positional
///   `token` / `token_hash` / `token_new` / `token_hash_new` fields whose
///   meaning depends on `email_action_type`
/// - **legacy**: a top-level `email` object whose fields are already keyed by
///   role (`new_token`, `old_token_hash`, ...)
///
/// Both may carry a `user` snapshot. Every leaf is optional except
/// `email_action_type`, which must be one of the known values. Anything else
/// is rejected rather than coerced.
use crate::error::{HookError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider action vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailActionType {
    Signup,
    Recovery,
    Magiclink,
    EmailChange,
    Invite,
    Reauthentication,
    /// OTP sign-in email
    Email,
    IdentityLinkedNotification,
    IdentityUnlinkedNotification,
    MfaFactorEnrolledNotification,
    MfaFactorUnenrolledNotification,
    PasswordChangedNotification,
    EmailChangedNotification,
    PhoneChangedNotification,
}

impl EmailActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Recovery => "recovery",
            Self::Magiclink => "magiclink",
            Self::EmailChange => "email_change",
            Self::Invite => "invite",
            Self::Reauthentication => "reauthentication",
            Self::Email => "email",
            Self::IdentityLinkedNotification => "identity_linked_notification",
            Self::IdentityUnlinkedNotification => "identity_unlinked_notification",
            Self::MfaFactorEnrolledNotification => "mfa_factor_enrolled_notification",
            Self::MfaFactorUnenrolledNotification => "mfa_factor_unenrolled_notification",
            Self::PasswordChangedNotification => "password_changed_notification",
            Self::EmailChangedNotification => "email_changed_notification",
            Self::PhoneChangedNotification => "phone_changed_notification",
        }
    }
}

/// Locale hints stored on the provider's user record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub locale: Option<String>,
    pub language: Option<String>,
}

/// User snapshot attached to a hook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: Option<String>,
    pub email: Option<String>,
    pub new_email: Option<String>,
    /// RFC 3339 creation timestamp
    pub created_at: Option<String>,
    pub identities: Option<Vec<Value>>,
    pub user_metadata: Option<UserMetadata>,
}

impl UserSnapshot {
    pub fn locale_hints(&self) -> [Option<&str>; 2] {
        match &self.user_metadata {
            Some(meta) => [meta.locale.as_deref(), meta.language.as_deref()],
            None => [None, None],
        }
    }
}

/// `email_data` of the current payload layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailData {
    pub email_action_type: EmailActionType,
    pub token: Option<String>,
    pub token_hash: Option<String>,
    pub token_new: Option<String>,
    pub token_hash_new: Option<String>,
    pub redirect_to: Option<String>,
    pub site_url: Option<String>,
    pub old_email: Option<String>,
    pub new_email: Option<String>,
    pub locale: Option<String>,
}

/// `email` of the legacy payload layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEmail {
    pub email_action_type: EmailActionType,
    pub token: Option<String>,
    pub token_hash: Option<String>,
    pub new_token: Option<String>,
    pub new_token_hash: Option<String>,
    pub old_token: Option<String>,
    pub old_token_hash: Option<String>,
    pub redirect_to: Option<String>,
    pub site_url: Option<String>,
    pub old_email: Option<String>,
    pub new_email: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPayload {
    pub email_data: EmailData,
    pub user: Option<UserSnapshot>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPayload {
    pub email: LegacyEmail,
    pub user: Option<UserSnapshot>,
    pub locale: Option<String>,
}

/// A validated hook payload in one of the two known layouts
#[derive(Debug, Clone, PartialEq)]
pub enum RawAuthEvent {
    Current(CurrentPayload),
    Legacy(LegacyPayload),
}

impl RawAuthEvent {
    /// Validate an untyped JSON value.
    ///
    /// `email_data` wins when a payload carries both top-level keys.
    pub fn parse(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| HookError::SchemaInvalid("payload is not a JSON object".to_string()))?;

        if object.contains_key("email_data") {
            CurrentPayload::deserialize(value)
                .map(RawAuthEvent::Current)
                .map_err(|e| HookError::SchemaInvalid(format!("email_data payload: {}", e)))
        } else if object.contains_key("email") {
            LegacyPayload::deserialize(value)
                .map(RawAuthEvent::Legacy)
                .map_err(|e| HookError::SchemaInvalid(format!("legacy email payload: {}", e)))
        } else {
            Err(HookError::SchemaInvalid(
                "payload carries neither `email_data` nor `email`".to_string(),
            ))
        }
    }

    /// Validate a raw request body
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)?;
        Self::parse(&value)
    }

    pub fn action_type(&self) -> EmailActionType {
        match self {
            RawAuthEvent::Current(payload) => payload.email_data.email_action_type,
            RawAuthEvent::Legacy(payload) => payload.email.email_action_type,
        }
    }

    pub fn user(&self) -> Option<&UserSnapshot> {
        match self {
            RawAuthEvent::Current(payload) => payload.user.as_ref(),
            RawAuthEvent::Legacy(payload) => payload.user.as_ref(),
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            RawAuthEvent::Current(_) => "current",
            RawAuthEvent::Legacy(_) => "legacy",
        }
    }
}
