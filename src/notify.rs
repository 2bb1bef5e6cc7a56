use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    Registration,
    PasswordReset,
}

impl CodePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            CodePurpose::Registration => "registration",
            CodePurpose::PasswordReset => "password_reset",
        }
    }
}

/// Delivers one-time codes to users. Only the registration and recovery
/// flows call this.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_code(
        &self,
        email: &str,
        username: &str,
        code: &str,
        purpose: CodePurpose,
    ) -> anyhow::Result<()>;
}

/// Writes the code to the log instead of sending mail.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_code(
        &self,
        email: &str,
        username: &str,
        code: &str,
        purpose: CodePurpose,
    ) -> anyhow::Result<()> {
        info!(%email, %username, %code, purpose = purpose.as_str(), "one-time code issued");
        Ok(())
    }
}
