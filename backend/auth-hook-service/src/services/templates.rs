/// Email templates and message catalog
///
/// Templates are selected by (canonical action, locale). Strings come from a
/// [`Translator`]; the built-in [`StaticCatalog`] covers every template in
/// English and the token-bearing templates in the other supported locales.
use crate::models::Locale;
use crate::services::email::OutboundEmail;
use crate::services::normalizer::{
    normalize_site_url, CanonicalAction, NormalizedEvent, TokenRole,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Namespace holding all auth email strings
pub const EMAIL_NAMESPACE: &str = "emails";

pub type TemplateParams = BTreeMap<&'static str, String>;

/// Bound `(key, params) -> string` lookup for one namespace and locale
pub type Lookup<'a> = Box<dyn Fn(&str, &TemplateParams) -> String + Send + Sync + 'a>;

/// Locale string catalog capability
pub trait Translator: Send + Sync {
    fn translate<'a>(&'a self, namespace: &'a str, locale: Locale) -> Lookup<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Confirmation,
    Recovery,
    MagicLink,
    EmailChangeNew,
    EmailChangeOld,
    Invite,
    Reauthentication,
    IdentityLinked,
    IdentityUnlinked,
    MfaFactorEnrolled,
    MfaFactorUnenrolled,
    PasswordChanged,
    EmailChanged,
    PhoneChanged,
}

impl TemplateKind {
    /// Template for the primary recipient of an action
    pub fn for_action(action: CanonicalAction) -> Self {
        match action {
            CanonicalAction::Confirmation => Self::Confirmation,
            CanonicalAction::Recovery => Self::Recovery,
            CanonicalAction::Magiclink => Self::MagicLink,
            CanonicalAction::EmailChange => Self::EmailChangeNew,
            CanonicalAction::Invite => Self::Invite,
            CanonicalAction::Reauthentication => Self::Reauthentication,
            CanonicalAction::IdentityLinkedNotification => Self::IdentityLinked,
            CanonicalAction::IdentityUnlinkedNotification => Self::IdentityUnlinked,
            CanonicalAction::MfaFactorEnrolledNotification => Self::MfaFactorEnrolled,
            CanonicalAction::MfaFactorUnenrolledNotification => Self::MfaFactorUnenrolled,
            CanonicalAction::PasswordChangedNotification => Self::PasswordChanged,
            CanonicalAction::EmailChangedNotification => Self::EmailChanged,
            CanonicalAction::PhoneChangedNotification => Self::PhoneChanged,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Recovery => "recovery",
            Self::MagicLink => "magic_link",
            Self::EmailChangeNew => "email_change_new",
            Self::EmailChangeOld => "email_change_old",
            Self::Invite => "invite",
            Self::Reauthentication => "reauthentication",
            Self::IdentityLinked => "identity_linked",
            Self::IdentityUnlinked => "identity_unlinked",
            Self::MfaFactorEnrolled => "mfa_factor_enrolled",
            Self::MfaFactorUnenrolled => "mfa_factor_unenrolled",
            Self::PasswordChanged => "password_changed",
            Self::EmailChanged => "email_changed",
            Self::PhoneChanged => "phone_changed",
        }
    }

    /// `type` parameter of the verification link.
    ///
    /// Magic links share the recovery verification link.
    pub fn verify_type(&self) -> Option<&'static str> {
        match self {
            Self::Confirmation => Some("signup"),
            Self::Recovery | Self::MagicLink => Some("recovery"),
            Self::Invite => Some("invite"),
            Self::EmailChangeNew | Self::EmailChangeOld => Some("email_change"),
            _ => None,
        }
    }

    /// Token roles feeding `{otp}` and the verification link
    fn token_roles(&self) -> Option<(TokenRole, TokenRole)> {
        match self {
            Self::Confirmation
            | Self::Recovery
            | Self::MagicLink
            | Self::Invite
            | Self::Reauthentication => Some((TokenRole::Otp, TokenRole::TokenHash)),
            Self::EmailChangeNew => Some((TokenRole::NewEmailOtp, TokenRole::NewEmailTokenHash)),
            Self::EmailChangeOld => Some((TokenRole::OldEmailOtp, TokenRole::OldEmailTokenHash)),
            _ => None,
        }
    }
}

/// Renders a normalized event into outbound messages
#[derive(Clone)]
pub struct TemplateRenderer {
    translator: Arc<dyn Translator>,
    default_site_url: String,
}

impl TemplateRenderer {
    pub fn new(translator: Arc<dyn Translator>, default_site_url: impl Into<String>) -> Self {
        Self {
            translator,
            default_site_url: normalize_site_url(&default_site_url.into()),
        }
    }

    pub fn render(
        &self,
        event: &NormalizedEvent,
        kind: TemplateKind,
        recipient: &str,
    ) -> OutboundEmail {
        let params = self.params(event, kind, recipient);
        let lookup = self.translator.translate(EMAIL_NAMESPACE, event.locale);

        OutboundEmail {
            recipient: recipient.to_string(),
            subject: lookup(&format!("{}.subject", kind.key()), &params),
            rendered_body: lookup(&format!("{}.body", kind.key()), &params),
        }
    }

    fn params(
        &self,
        event: &NormalizedEvent,
        kind: TemplateKind,
        recipient: &str,
    ) -> TemplateParams {
        let site_url = event
            .site_url_override
            .clone()
            .unwrap_or_else(|| self.default_site_url.clone());
        let site_url = site_url.trim_end_matches('/').to_string();

        let mut params = TemplateParams::new();
        params.insert("email", recipient.to_string());
        params.insert("new_email", event.recipient_email.clone());
        if let Some(old) = &event.old_recipient_email {
            params.insert("old_email", old.clone());
        }

        let mut link = site_url.clone();
        if let Some((otp_role, hash_role)) = kind.token_roles() {
            params.insert("otp", event.token(otp_role).unwrap_or_default().to_string());
            if let (Some(hash), Some(verify_type)) = (event.token(hash_role), kind.verify_type()) {
                link = format!(
                    "{}/auth/confirm?token_hash={}&type={}",
                    site_url,
                    urlencoding::encode(hash),
                    verify_type
                );
            }
        }
        params.insert("link", link);
        params.insert("site_url", site_url);

        params
    }
}

/// Replace `{name}` placeholders; unknown placeholders are left as-is.
pub fn interpolate(template: &str, params: &TemplateParams) -> String {
    let mut rendered = template.to_string();
    for (name, value) in params {
        rendered = rendered.replace(&format!("{{{}}}", name), value);
    }
    rendered
}

/// In-memory catalog of auth email strings
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<(Locale, String), String>,
    fallback: Locale,
}

impl StaticCatalog {
    pub fn new(fallback: Locale) -> Self {
        Self {
            entries: HashMap::new(),
            fallback,
        }
    }

    /// Catalog with the bundled strings
    pub fn builtin() -> Self {
        let mut catalog = Self::new(Locale::En);
        for (locale, table) in [
            (Locale::En, EN),
            (Locale::Es, ES),
            (Locale::Fr, FR),
            (Locale::De, DE),
            (Locale::Pt, PT),
        ] {
            for (key, value) in table {
                catalog.insert(locale, &format!("{}.{}", EMAIL_NAMESPACE, key), value);
            }
        }
        catalog
    }

    pub fn insert(&mut self, locale: Locale, key: &str, value: &str) {
        self.entries
            .insert((locale, key.to_string()), value.to_string());
    }

    fn get(&self, locale: Locale, key: &str) -> Option<&str> {
        self.entries
            .get(&(locale, key.to_string()))
            .or_else(|| self.entries.get(&(self.fallback, key.to_string())))
            .map(String::as_str)
    }
}

impl Translator for StaticCatalog {
    fn translate<'a>(&'a self, namespace: &'a str, locale: Locale) -> Lookup<'a> {
        Box::new(move |key: &str, params: &TemplateParams| {
            let full_key = format!("{}.{}", namespace, key);
            match self.get(locale, &full_key) {
                Some(template) => interpolate(template, params),
                None => full_key,
            }
        })
    }
}

const EN: &[(&str, &str)] = &[
    ("confirmation.subject", "Confirm your signup"),
    ("confirmation.body", "Welcome!\n\nFollow this link to confirm your account:\n{link}\n\nOr enter this code: {otp}\n\nIf you did not sign up, you can ignore this email."),
    ("recovery.subject", "Reset your password"),
    ("recovery.body", "We received a request to reset the password for {email}.\n\nFollow this link to choose a new password:\n{link}\n\nOr enter this code: {otp}\n\nIf you did not request this, you can ignore this email."),
    ("magic_link.subject", "Your sign-in link"),
    ("magic_link.body", "Follow this link to sign in:\n{link}\n\nOr enter this code: {otp}\n\nIf you did not try to sign in, you can ignore this email."),
    ("email_change_new.subject", "Confirm your new email address"),
    ("email_change_new.body", "Follow this link to confirm {new_email} as your new email address:\n{link}\n\nOr enter this code: {otp}"),
    ("email_change_old.subject", "Confirm your email address change"),
    ("email_change_old.body", "A request was made to change your email address to {new_email}.\n\nFollow this link to approve the change:\n{link}\n\nOr enter this code: {otp}\n\nIf you did not request this, your new address would be {new_email}; contact support right away."),
    ("invite.subject", "You have been invited"),
    ("invite.body", "You have been invited to create an account on {site_url}.\n\nFollow this link to accept the invite:\n{link}"),
    ("reauthentication.subject", "Confirm it's you"),
    ("reauthentication.body", "Enter this code to confirm your identity: {otp}"),
    ("identity_linked.subject", "A new sign-in method was linked"),
    ("identity_linked.body", "A new sign-in identity was linked to {email}. If this wasn't you, secure your account at {site_url}."),
    ("identity_unlinked.subject", "A sign-in method was removed"),
    ("identity_unlinked.body", "A sign-in identity was removed from {email}. If this wasn't you, secure your account at {site_url}."),
    ("mfa_factor_enrolled.subject", "A new verification method was added"),
    ("mfa_factor_enrolled.body", "A multi-factor authentication method was added to {email}. If this wasn't you, secure your account at {site_url}."),
    ("mfa_factor_unenrolled.subject", "A verification method was removed"),
    ("mfa_factor_unenrolled.body", "A multi-factor authentication method was removed from {email}. If this wasn't you, secure your account at {site_url}."),
    ("password_changed.subject", "Your password was changed"),
    ("password_changed.body", "The password for {email} was changed. If this wasn't you, reset your password at {site_url}."),
    ("email_changed.subject", "Your email address was changed"),
    ("email_changed.body", "The email address on your account was changed. If this wasn't you, contact support at {site_url}."),
    ("phone_changed.subject", "Your phone number was changed"),
    ("phone_changed.body", "The phone number on the account for {email} was changed. If this wasn't you, secure your account at {site_url}."),
];

const ES: &[(&str, &str)] = &[
    ("confirmation.subject", "Confirma tu registro"),
    ("confirmation.body", "¡Bienvenido!\n\nSigue este enlace para confirmar tu cuenta:\n{link}\n\nO introduce este código: {otp}"),
    ("recovery.subject", "Restablece tu contraseña"),
    ("recovery.body", "Sigue este enlace para elegir una nueva contraseña:\n{link}\n\nO introduce este código: {otp}"),
    ("magic_link.subject", "Tu enlace de acceso"),
    ("magic_link.body", "Sigue este enlace para iniciar sesión:\n{link}\n\nO introduce este código: {otp}"),
    ("email_change_new.subject", "Confirma tu nuevo correo"),
    ("email_change_new.body", "Sigue este enlace para confirmar {new_email} como tu nuevo correo:\n{link}\n\nO introduce este código: {otp}"),
    ("email_change_old.subject", "Confirma el cambio de correo"),
    ("email_change_old.body", "Se solicitó cambiar tu correo a {new_email}.\n\nSigue este enlace para aprobarlo:\n{link}\n\nO introduce este código: {otp}"),
    ("invite.subject", "Has sido invitado"),
    ("invite.body", "Has sido invitado a crear una cuenta en {site_url}.\n\nSigue este enlace para aceptar:\n{link}"),
    ("reauthentication.subject", "Confirma que eres tú"),
    ("reauthentication.body", "Introduce este código para confirmar tu identidad: {otp}"),
];

const FR: &[(&str, &str)] = &[
    ("confirmation.subject", "Confirmez votre inscription"),
    ("confirmation.body", "Bienvenue !\n\nSuivez ce lien pour confirmer votre compte :\n{link}\n\nOu saisissez ce code : {otp}"),
    ("recovery.subject", "Réinitialisez votre mot de passe"),
    ("recovery.body", "Suivez ce lien pour choisir un nouveau mot de passe :\n{link}\n\nOu saisissez ce code : {otp}"),
    ("magic_link.subject", "Votre lien de connexion"),
    ("magic_link.body", "Suivez ce lien pour vous connecter :\n{link}\n\nOu saisissez ce code : {otp}"),
    ("email_change_new.subject", "Confirmez votre nouvelle adresse"),
    ("email_change_new.body", "Suivez ce lien pour confirmer {new_email} comme nouvelle adresse :\n{link}\n\nOu saisissez ce code : {otp}"),
    ("email_change_old.subject", "Confirmez le changement d'adresse"),
    ("email_change_old.body", "Une demande de changement d'adresse vers {new_email} a été faite.\n\nSuivez ce lien pour l'approuver :\n{link}\n\nOu saisissez ce code : {otp}"),
    ("invite.subject", "Vous avez été invité"),
    ("invite.body", "Vous avez été invité à créer un compte sur {site_url}.\n\nSuivez ce lien pour accepter :\n{link}"),
    ("reauthentication.subject", "Confirmez votre identité"),
    ("reauthentication.body", "Saisissez ce code pour confirmer votre identité : {otp}"),
];

const DE: &[(&str, &str)] = &[
    ("confirmation.subject", "Bestätige deine Registrierung"),
    ("confirmation.body", "Willkommen!\n\nFolge diesem Link, um dein Konto zu bestätigen:\n{link}\n\nOder gib diesen Code ein: {otp}"),
    ("recovery.subject", "Setze dein Passwort zurück"),
    ("recovery.body", "Folge diesem Link, um ein neues Passwort zu wählen:\n{link}\n\nOder gib diesen Code ein: {otp}"),
    ("magic_link.subject", "Dein Anmeldelink"),
    ("magic_link.body", "Folge diesem Link, um dich anzumelden:\n{link}\n\nOder gib diesen Code ein: {otp}"),
    ("email_change_new.subject", "Bestätige deine neue E-Mail-Adresse"),
    ("email_change_new.body", "Folge diesem Link, um {new_email} als neue Adresse zu bestätigen:\n{link}\n\nOder gib diesen Code ein: {otp}"),
    ("email_change_old.subject", "Bestätige die Änderung deiner E-Mail-Adresse"),
    ("email_change_old.body", "Es wurde beantragt, deine Adresse auf {new_email} zu ändern.\n\nFolge diesem Link, um zuzustimmen:\n{link}\n\nOder gib diesen Code ein: {otp}"),
    ("invite.subject", "Du wurdest eingeladen"),
    ("invite.body", "Du wurdest eingeladen, ein Konto auf {site_url} zu erstellen.\n\nFolge diesem Link, um anzunehmen:\n{link}"),
    ("reauthentication.subject", "Bestätige, dass du es bist"),
    ("reauthentication.body", "Gib diesen Code ein, um deine Identität zu bestätigen: {otp}"),
];

const PT: &[(&str, &str)] = &[
    ("confirmation.subject", "Confirme seu cadastro"),
    ("confirmation.body", "Bem-vindo!\n\nSiga este link para confirmar sua conta:\n{link}\n\nOu digite este código: {otp}"),
    ("recovery.subject", "Redefina sua senha"),
    ("recovery.body", "Siga este link para escolher uma nova senha:\n{link}\n\nOu digite este código: {otp}"),
    ("magic_link.subject", "Seu link de acesso"),
    ("magic_link.body", "Siga este link para entrar:\n{link}\n\nOu digite este código: {otp}"),
    ("email_change_new.subject", "Confirme seu novo e-mail"),
    ("email_change_new.body", "Siga este link para confirmar {new_email} como seu novo e-mail:\n{link}\n\nOu digite este código: {otp}"),
    ("email_change_old.subject", "Confirme a alteração de e-mail"),
    ("email_change_old.body", "Foi solicitada a alteração do seu e-mail para {new_email}.\n\nSiga este link para aprovar:\n{link}\n\nOu digite este código: {otp}"),
    ("invite.subject", "Você foi convidado"),
    ("invite.body", "Você foi convidado a criar uma conta em {site_url}.\n\nSiga este link para aceitar:\n{link}"),
    ("reauthentication.subject", "Confirme que é você"),
    ("reauthentication.body", "Digite este código para confirmar sua identidade: {otp}"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailActionType;
    use crate::services::normalizer::TokenSet;

    fn event(
        action: CanonicalAction,
        locale: Locale,
        tokens: &[(TokenRole, &str)],
    ) -> NormalizedEvent {
        NormalizedEvent {
            action,
            raw_action: EmailActionType::Signup,
            tokens: tokens
                .iter()
                .map(|(role, value)| (*role, value.to_string()))
                .collect::<TokenSet>(),
            recipient_email: "user@example.com".to_string(),
            old_recipient_email: None,
            site_url_override: None,
            locale,
        }
    }

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new(Arc::new(StaticCatalog::builtin()), "https://app.example.com/")
    }

    #[test]
    fn test_every_action_has_english_strings() {
        let catalog = StaticCatalog::builtin();
        let lookup = catalog.translate(EMAIL_NAMESPACE, Locale::En);
        let params = TemplateParams::new();
        for kind in [
            TemplateKind::Confirmation,
            TemplateKind::Recovery,
            TemplateKind::MagicLink,
            TemplateKind::EmailChangeNew,
            TemplateKind::EmailChangeOld,
            TemplateKind::Invite,
            TemplateKind::Reauthentication,
            TemplateKind::IdentityLinked,
            TemplateKind::IdentityUnlinked,
            TemplateKind::MfaFactorEnrolled,
            TemplateKind::MfaFactorUnenrolled,
            TemplateKind::PasswordChanged,
            TemplateKind::EmailChanged,
            TemplateKind::PhoneChanged,
        ] {
            let subject_key = format!("{}.subject", kind.key());
            assert_ne!(lookup(&subject_key, &params), format!("emails.{}", subject_key));
        }
    }

    #[test]
    fn test_confirmation_link_uses_token_hash() {
        let email = renderer().render(
            &event(
                CanonicalAction::Confirmation,
                Locale::En,
                &[(TokenRole::Otp, "123456"), (TokenRole::TokenHash, "pkce abc")],
            ),
            TemplateKind::Confirmation,
            "user@example.com",
        );

        assert_eq!(email.subject, "Confirm your signup");
        assert!(email
            .rendered_body
            .contains("https://app.example.com/auth/confirm?token_hash=pkce%20abc&type=signup"));
        assert!(email.rendered_body.contains("123456"));
    }

    #[test]
    fn test_magic_link_shares_recovery_link() {
        let email = renderer().render(
            &event(
                CanonicalAction::Magiclink,
                Locale::En,
                &[(TokenRole::TokenHash, "h1")],
            ),
            TemplateKind::MagicLink,
            "user@example.com",
        );
        assert!(email.rendered_body.contains("type=recovery"));
    }

    #[test]
    fn test_site_url_override_replaces_default() {
        let mut evt = event(
            CanonicalAction::Recovery,
            Locale::En,
            &[(TokenRole::TokenHash, "h1")],
        );
        evt.site_url_override = Some("http://localhost:3000".to_string());

        let email = renderer().render(&evt, TemplateKind::Recovery, "user@example.com");
        assert!(email
            .rendered_body
            .contains("http://localhost:3000/auth/confirm?token_hash=h1&type=recovery"));
    }

    #[test]
    fn test_localized_strings_with_english_fallback() {
        let email = renderer().render(
            &event(CanonicalAction::Recovery, Locale::De, &[]),
            TemplateKind::Recovery,
            "user@example.com",
        );
        assert_eq!(email.subject, "Setze dein Passwort zurück");

        // Notifications only ship in English
        let email = renderer().render(
            &event(CanonicalAction::PasswordChangedNotification, Locale::Fr, &[]),
            TemplateKind::PasswordChanged,
            "user@example.com",
        );
        assert_eq!(email.subject, "Your password was changed");
    }

    #[test]
    fn test_missing_key_returns_key() {
        let catalog = StaticCatalog::new(Locale::En);
        let lookup = catalog.translate("emails", Locale::Es);
        assert_eq!(lookup("nope.subject", &TemplateParams::new()), "emails.nope.subject");
    }

    #[test]
    fn test_interpolate_leaves_unknown_placeholders() {
        let mut params = TemplateParams::new();
        params.insert("otp", "42".to_string());
        assert_eq!(interpolate("code {otp} for {email}", &params), "code 42 for {email}");
    }
}
