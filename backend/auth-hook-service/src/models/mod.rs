/// Wire and domain models for auth email hooks
pub mod locale;
pub mod payload;

pub use locale::Locale;
pub use payload::{
    CurrentPayload, EmailActionType, EmailData, LegacyEmail, LegacyPayload, RawAuthEvent,
    UserMetadata, UserSnapshot,
};
