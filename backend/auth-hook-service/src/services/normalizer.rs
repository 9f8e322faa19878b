/// Auth event normalization
///
/// Turns a validated [`RawAuthEvent`] into a provider-agnostic
/// [`NormalizedEvent`]:
///
/// - the provider action is mapped to a [`CanonicalAction`], including the
///   signup/magic-link disambiguation for existing users
/// - positional token fields are remapped to named roles
/// - the redirect/site URL is reduced to its origin
/// - recipient addresses and locale are resolved
///
/// Normalization reads wall-clock time only through [`Clock`], so the same
/// input and clock reading always produce the same event.
use crate::error::{HookError, Result};
use crate::models::{EmailActionType, EmailData, LegacyEmail, Locale, RawAuthEvent, UserSnapshot};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of "now" for normalization
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// What kind of auth email to send, independent of provider vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalAction {
    Confirmation,
    Recovery,
    Magiclink,
    EmailChange,
    Invite,
    Reauthentication,
    IdentityLinkedNotification,
    IdentityUnlinkedNotification,
    MfaFactorEnrolledNotification,
    MfaFactorUnenrolledNotification,
    PasswordChangedNotification,
    EmailChangedNotification,
    PhoneChangedNotification,
}

impl CanonicalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Recovery => "recovery",
            Self::Magiclink => "magiclink",
            Self::EmailChange => "email_change",
            Self::Invite => "invite",
            Self::Reauthentication => "reauthentication",
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

impl From<EmailActionType> for CanonicalAction {
    fn from(raw: EmailActionType) -> Self {
        match raw {
            EmailActionType::Signup => Self::Confirmation,
            EmailActionType::Recovery => Self::Recovery,
            EmailActionType::Magiclink | EmailActionType::Email => Self::Magiclink,
            EmailActionType::EmailChange => Self::EmailChange,
            EmailActionType::Invite => Self::Invite,
            EmailActionType::Reauthentication => Self::Reauthentication,
            EmailActionType::IdentityLinkedNotification => Self::IdentityLinkedNotification,
            EmailActionType::IdentityUnlinkedNotification => Self::IdentityUnlinkedNotification,
            EmailActionType::MfaFactorEnrolledNotification => Self::MfaFactorEnrolledNotification,
            EmailActionType::MfaFactorUnenrolledNotification => {
                Self::MfaFactorUnenrolledNotification
            }
            EmailActionType::PasswordChangedNotification => Self::PasswordChangedNotification,
            EmailActionType::EmailChangedNotification => Self::EmailChangedNotification,
            EmailActionType::PhoneChangedNotification => Self::PhoneChangedNotification,
        }
    }
}

/// Named role of a token after remapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    Otp,
    TokenHash,
    NewEmailOtp,
    NewEmailTokenHash,
    OldEmailOtp,
    OldEmailTokenHash,
}

/// Role to token value. Only non-empty tokens are stored.
pub type TokenSet = BTreeMap<TokenRole, String>;

/// Provider-agnostic event consumed by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedEvent {
    pub action: CanonicalAction,
    pub raw_action: EmailActionType,
    pub tokens: TokenSet,
    pub recipient_email: String,
    pub old_recipient_email: Option<String>,
    pub site_url_override: Option<String>,
    pub locale: Locale,
}

impl NormalizedEvent {
    pub fn token(&self, role: TokenRole) -> Option<&str> {
        self.tokens.get(&role).map(String::as_str)
    }

    /// Whether the new address has anything to confirm
    pub fn has_new_address_confirmation(&self) -> bool {
        self.tokens.contains_key(&TokenRole::NewEmailOtp)
            || self.tokens.contains_key(&TokenRole::NewEmailTokenHash)
    }

    /// Whether the old address must confirm too.
    ///
    /// An old address without an old-address OTP means the provider runs in
    /// single-confirm mode, so only the new address is mailed.
    pub fn has_old_address_confirmation(&self) -> bool {
        self.old_recipient_email.is_some() && self.tokens.contains_key(&TokenRole::OldEmailOtp)
    }
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Signups for users older than this are treated as magic-link logins
    pub magiclink_reuse_threshold: Duration,
    pub default_locale: Locale,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            magiclink_reuse_threshold: Duration::seconds(60),
            default_locale: Locale::En,
        }
    }
}

/// Normalizes validated hook payloads
#[derive(Clone)]
pub struct EventNormalizer {
    clock: Arc<dyn Clock>,
    config: NormalizerConfig,
}

impl EventNormalizer {
    pub fn new(clock: Arc<dyn Clock>, config: NormalizerConfig) -> Self {
        Self { clock, config }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn normalize(&self, raw: &RawAuthEvent) -> Result<NormalizedEvent> {
        let raw_action = raw.action_type();
        let action = normalize_action(
            raw_action,
            raw.user(),
            self.clock.now(),
            self.config.magiclink_reuse_threshold,
        );

        let event = match raw {
            RawAuthEvent::Current(payload) => {
                let data = &payload.email_data;
                NormalizedEvent {
                    action,
                    raw_action,
                    tokens: remap_current(action, data),
                    recipient_email: resolve_recipient(
                        action,
                        data.new_email.as_deref(),
                        payload.user.as_ref(),
                    )?,
                    old_recipient_email: old_recipient(action, data.old_email.as_deref()),
                    site_url_override: site_url_override(
                        data.redirect_to.as_deref(),
                        data.site_url.as_deref(),
                    ),
                    locale: self.resolve_locale(
                        data.locale.as_deref(),
                        payload.locale.as_deref(),
                        payload.user.as_ref(),
                    ),
                }
            }
            RawAuthEvent::Legacy(payload) => {
                let email = &payload.email;
                NormalizedEvent {
                    action,
                    raw_action,
                    tokens: remap_legacy(action, email),
                    recipient_email: resolve_recipient(
                        action,
                        email.new_email.as_deref(),
                        payload.user.as_ref(),
                    )?,
                    old_recipient_email: old_recipient(action, email.old_email.as_deref()),
                    site_url_override: site_url_override(
                        email.redirect_to.as_deref(),
                        email.site_url.as_deref(),
                    ),
                    locale: self.resolve_locale(
                        email.locale.as_deref(),
                        payload.locale.as_deref(),
                        payload.user.as_ref(),
                    ),
                }
            }
        };

        debug!(
            shape = raw.shape(),
            action = event.action.as_str(),
            locale = %event.locale,
            tokens = event.tokens.len(),
            "Auth event normalized"
        );

        Ok(event)
    }

    fn resolve_locale(
        &self,
        explicit: Option<&str>,
        top_level: Option<&str>,
        user: Option<&UserSnapshot>,
    ) -> Locale {
        let [meta_locale, meta_language] = user.map(UserSnapshot::locale_hints).unwrap_or_default();
        Locale::resolve(
            [explicit, top_level, meta_locale, meta_language],
            self.config.default_locale,
        )
    }
}

/// Map a provider action to its canonical action.
///
/// The provider emits `signup` for magic-link logins of existing users too.
/// A `signup` for a user created more than `threshold` ago is therefore
/// reclassified as `magiclink`. This is a heuristic: it depends on clock
/// agreement with the provider and can misread a slow genuine signup.
pub fn normalize_action(
    raw: EmailActionType,
    user: Option<&UserSnapshot>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> CanonicalAction {
    let mapped = CanonicalAction::from(raw);
    if mapped != CanonicalAction::Confirmation {
        return mapped;
    }

    let Some(created_at) = user.and_then(|u| u.created_at.as_deref()) else {
        return mapped;
    };

    let created_at = match DateTime::parse_from_rfc3339(created_at) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(e) => {
            warn!(created_at, error = %e, "Unparseable user.created_at; keeping confirmation");
            return mapped;
        }
    };

    let age = now - created_at;
    if age > threshold {
        info!(
            raw_action = raw.as_str(),
            action = CanonicalAction::Magiclink.as_str(),
            user_age_secs = age.num_seconds(),
            threshold_secs = threshold.num_seconds(),
            "Reclassified signup for existing user as magic link"
        );
        CanonicalAction::Magiclink
    } else {
        mapped
    }
}

/// Reduce a URL to its origin (scheme, host and non-default port).
///
/// Input that does not parse, or has no tuple origin, is returned unchanged.
pub fn normalize_site_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => {
            let origin = parsed.origin();
            if origin.is_tuple() {
                origin.ascii_serialization()
            } else {
                raw.to_string()
            }
        }
        Err(_) => raw.to_string(),
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

fn insert_token(tokens: &mut TokenSet, role: TokenRole, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        tokens.insert(role, value.to_string());
    }
}

/// Remap positional `email_data` fields.
///
/// For `email_change` the provider names the pairs inverted: `token_hash`
/// verifies the new address while `token_hash_new` verifies the old one.
/// Old-address roles exist only when `old_email` is set.
pub fn remap_current(action: CanonicalAction, data: &EmailData) -> TokenSet {
    let mut tokens = TokenSet::new();

    match action {
        CanonicalAction::EmailChange => {
            insert_token(
                &mut tokens,
                TokenRole::NewEmailOtp,
                non_empty(data.token_new.as_ref()).or(non_empty(data.token.as_ref())),
            );
            insert_token(
                &mut tokens,
                TokenRole::NewEmailTokenHash,
                non_empty(data.token_hash.as_ref()),
            );
            if non_empty(data.old_email.as_ref()).is_some() {
                insert_token(&mut tokens, TokenRole::OldEmailOtp, non_empty(data.token.as_ref()));
                insert_token(
                    &mut tokens,
                    TokenRole::OldEmailTokenHash,
                    non_empty(data.token_hash_new.as_ref()),
                );
            }
        }
        CanonicalAction::Confirmation
        | CanonicalAction::Magiclink
        | CanonicalAction::Recovery
        | CanonicalAction::Invite
        | CanonicalAction::Reauthentication => {
            insert_token(&mut tokens, TokenRole::Otp, non_empty(data.token.as_ref()));
            insert_token(
                &mut tokens,
                TokenRole::TokenHash,
                non_empty(data.token_hash.as_ref()).or(non_empty(data.token.as_ref())),
            );
        }
        _ => {}
    }

    tokens
}

/// Remap role-keyed legacy `email` fields
pub fn remap_legacy(action: CanonicalAction, email: &LegacyEmail) -> TokenSet {
    let mut tokens = TokenSet::new();

    match action {
        CanonicalAction::EmailChange => {
            insert_token(
                &mut tokens,
                TokenRole::NewEmailOtp,
                non_empty(email.new_token.as_ref()).or(non_empty(email.token.as_ref())),
            );
            insert_token(
                &mut tokens,
                TokenRole::NewEmailTokenHash,
                non_empty(email.new_token_hash.as_ref()).or(non_empty(email.token_hash.as_ref())),
            );
            if non_empty(email.old_email.as_ref()).is_some() {
                insert_token(
                    &mut tokens,
                    TokenRole::OldEmailOtp,
                    non_empty(email.old_token.as_ref()),
                );
                insert_token(
                    &mut tokens,
                    TokenRole::OldEmailTokenHash,
                    non_empty(email.old_token_hash.as_ref()),
                );
            }
        }
        CanonicalAction::Confirmation
        | CanonicalAction::Magiclink
        | CanonicalAction::Recovery
        | CanonicalAction::Invite
        | CanonicalAction::Reauthentication => {
            insert_token(&mut tokens, TokenRole::Otp, non_empty(email.token.as_ref()));
            insert_token(
                &mut tokens,
                TokenRole::TokenHash,
                non_empty(email.token_hash.as_ref()).or(non_empty(email.token.as_ref())),
            );
        }
        _ => {}
    }

    tokens
}

fn resolve_recipient(
    action: CanonicalAction,
    payload_new_email: Option<&str>,
    user: Option<&UserSnapshot>,
) -> Result<String> {
    let candidate = if action == CanonicalAction::EmailChange {
        payload_new_email
            .filter(|e| !e.is_empty())
            .or_else(|| user.and_then(|u| non_empty(u.new_email.as_ref())))
    } else {
        user.and_then(|u| non_empty(u.email.as_ref()))
    };

    candidate.map(str::to_string).ok_or_else(|| {
        HookError::ActionUnmappable(format!("no recipient address for {}", action.as_str()))
    })
}

fn old_recipient(action: CanonicalAction, old_email: Option<&str>) -> Option<String> {
    if action != CanonicalAction::EmailChange {
        return None;
    }
    old_email.filter(|e| !e.is_empty()).map(str::to_string)
}

fn site_url_override(redirect_to: Option<&str>, site_url: Option<&str>) -> Option<String> {
    redirect_to
        .filter(|u| !u.is_empty())
        .or(site_url.filter(|u| !u.is_empty()))
        .map(normalize_site_url)
}
