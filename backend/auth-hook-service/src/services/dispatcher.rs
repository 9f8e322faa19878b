/// Template dispatch for normalized auth events
///
/// Computes the send intents for an event and delivers them one at a time.
/// For a double-confirm email change the new address is always mailed before
/// the old one, because the old-address message refers to the new address.
/// Intents are independent: a failed send is reported, never compensated.
use crate::error::HookError;
use crate::metrics;
use crate::services::email::MailSender;
use crate::services::normalizer::{CanonicalAction, NormalizedEvent};
use crate::services::templates::{TemplateKind, TemplateRenderer};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientRole {
    Primary,
    NewAddress,
    OldAddress,
}

impl RecipientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientRole::Primary => "primary",
            RecipientRole::NewAddress => "new_address",
            RecipientRole::OldAddress => "old_address",
        }
    }
}

/// One email the dispatcher intends to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendIntent {
    pub role: RecipientRole,
    pub recipient: String,
    pub template: TemplateKind,
}

#[derive(Debug)]
pub struct SendOutcome {
    pub intent: SendIntent,
    pub result: Result<(), HookError>,
}

/// Per-intent results of one dispatch
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<SendOutcome>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SendOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Recipients and templates for an event, in send order
pub fn plan_sends(event: &NormalizedEvent) -> Vec<SendIntent> {
    if event.action != CanonicalAction::EmailChange {
        return vec![SendIntent {
            role: RecipientRole::Primary,
            recipient: event.recipient_email.clone(),
            template: TemplateKind::for_action(event.action),
        }];
    }

    let mut intents = vec![SendIntent {
        role: RecipientRole::NewAddress,
        recipient: event.recipient_email.clone(),
        template: TemplateKind::EmailChangeNew,
    }];

    if event.has_new_address_confirmation() && event.has_old_address_confirmation() {
        if let Some(old) = &event.old_recipient_email {
            intents.push(SendIntent {
                role: RecipientRole::OldAddress,
                recipient: old.clone(),
                template: TemplateKind::EmailChangeOld,
            });
        }
    }

    intents
}

#[derive(Clone)]
pub struct TemplateDispatcher {
    renderer: TemplateRenderer,
    sender: Arc<dyn MailSender>,
}

impl TemplateDispatcher {
    pub fn new(renderer: TemplateRenderer, sender: Arc<dyn MailSender>) -> Self {
        Self { renderer, sender }
    }

    pub async fn dispatch(&self, event: &NormalizedEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for intent in plan_sends(event) {
            let message = self.renderer.render(event, intent.template, &intent.recipient);
            let result = self.sender.send(&message).await;

            match &result {
                Ok(()) => {
                    info!(
                        action = event.action.as_str(),
                        role = intent.role.as_str(),
                        locale = %event.locale,
                        "Auth email sent"
                    );
                    metrics::record_email_send(event.action.as_str(), "sent");
                }
                Err(e) => {
                    error!(
                        action = event.action.as_str(),
                        role = intent.role.as_str(),
                        recipient = %intent.recipient,
                        error = %e,
                        "Failed to send auth email"
                    );
                    metrics::record_email_send(event.action.as_str(), "failed");
                }
            }

            report.outcomes.push(SendOutcome { intent, result });
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailActionType, Locale};
    use crate::services::email::MockMailSender;
    use crate::services::normalizer::{TokenRole, TokenSet};
    use crate::services::templates::StaticCatalog;
    use mockall::Sequence;

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new(Arc::new(StaticCatalog::builtin()), "https://app.example.com")
    }

    fn email_change(old_otp: Option<&str>) -> NormalizedEvent {
        let mut tokens = TokenSet::new();
        tokens.insert(TokenRole::NewEmailOtp, "654321".to_string());
        tokens.insert(TokenRole::NewEmailTokenHash, "hash-new".to_string());
        if let Some(otp) = old_otp {
            tokens.insert(TokenRole::OldEmailOtp, otp.to_string());
            tokens.insert(TokenRole::OldEmailTokenHash, "hash-old".to_string());
        }

        NormalizedEvent {
            action: CanonicalAction::EmailChange,
            raw_action: EmailActionType::EmailChange,
            tokens,
            recipient_email: "new@example.com".to_string(),
            old_recipient_email: Some("old@example.com".to_string()),
            site_url_override: None,
            locale: Locale::En,
        }
    }

    #[test]
    fn test_plan_default_single_recipient() {
        let mut event = email_change(None);
        event.action = CanonicalAction::Recovery;

        let intents = plan_sends(&event);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].role, RecipientRole::Primary);
        assert_eq!(intents[0].template, TemplateKind::Recovery);
    }

    #[test]
    fn test_plan_double_confirm_orders_new_before_old() {
        let intents = plan_sends(&email_change(Some("111111")));
        let recipients: Vec<_> = intents.iter().map(|i| i.recipient.as_str()).collect();
        assert_eq!(recipients, vec!["new@example.com", "old@example.com"]);
    }

    #[tokio::test]
    async fn test_double_confirm_sends_new_address_first() {
        let mut sender = MockMailSender::new();
        let mut seq = Sequence::new();
        sender
            .expect_send()
            .withf(|m| m.recipient == "new@example.com" && m.rendered_body.contains("hash-new"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sender
            .expect_send()
            .withf(|m| m.recipient == "old@example.com" && m.rendered_body.contains("hash-old"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let dispatcher = TemplateDispatcher::new(renderer(), Arc::new(sender));
        let report = dispatcher.dispatch(&email_change(Some("111111"))).await;

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.outcomes[0].intent.role, RecipientRole::NewAddress);
        assert_eq!(report.outcomes[1].intent.role, RecipientRole::OldAddress);
    }

    #[tokio::test]
    async fn test_single_confirm_sends_once() {
        let mut sender = MockMailSender::new();
        sender
            .expect_send()
            .withf(|m| m.recipient == "new@example.com")
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = TemplateDispatcher::new(renderer(), Arc::new(sender));
        let report = dispatcher.dispatch(&email_change(None)).await;

        assert_eq!(report.attempted(), 1);
    }

    #[tokio::test]
    async fn test_old_address_failure_does_not_undo_new_address_send() {
        let mut sender = MockMailSender::new();
        let mut seq = Sequence::new();
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|m| {
                Err(HookError::SendFailure {
                    recipient: m.recipient.clone(),
                    reason: "mailbox unavailable".to_string(),
                })
            });

        let dispatcher = TemplateDispatcher::new(renderer(), Arc::new(sender));
        let report = dispatcher.dispatch(&email_change(Some("111111"))).await;

        assert_eq!(report.delivered(), 1);
        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].intent.recipient, "old@example.com");
    }

    #[tokio::test]
    async fn test_new_address_failure_still_attempts_old_address() {
        let mut sender = MockMailSender::new();
        let mut seq = Sequence::new();
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|m| {
                Err(HookError::SendFailure {
                    recipient: m.recipient.clone(),
                    reason: "timeout".to_string(),
                })
            });
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let dispatcher = TemplateDispatcher::new(renderer(), Arc::new(sender));
        let report = dispatcher.dispatch(&email_change(Some("111111"))).await;

        assert_eq!(report.attempted(), 2);
        assert_eq!(report.delivered(), 1);
    }
}
