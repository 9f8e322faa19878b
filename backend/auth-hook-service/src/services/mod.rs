/// Business logic: event normalization, template dispatch, mail transport and
/// OAuth code exchange
pub mod dispatcher;
pub mod email;
pub mod normalizer;
pub mod oauth;
pub mod templates;

pub use dispatcher::{plan_sends, DispatchReport, RecipientRole, SendIntent, TemplateDispatcher};
pub use email::{MailSender, OutboundEmail, SmtpMailSender};
pub use normalizer::{
    CanonicalAction, Clock, EventNormalizer, FixedClock, NormalizedEvent, NormalizerConfig,
    SystemClock, TokenRole, TokenSet,
};
pub use oauth::{
    ExchangeError, ExchangeSummary, HttpSessionExchanger, OAuthCallbackService,
    SessionExchanger, TransportErrorKind,
};
pub use templates::{StaticCatalog, TemplateKind, TemplateRenderer, Translator};
