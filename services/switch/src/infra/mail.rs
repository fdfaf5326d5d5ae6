use std::sync::Arc;

use anyhow::Context as _;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use blackout_domain::code::CodePurpose;

use crate::config::MailConfig;
use crate::domain::repository::Dispatcher;
use crate::domain::types::Dispatch;
use crate::error::DispatchError;

/// Delivers codes over authenticated SMTP (STARTTLS).
#[derive(Clone)]
pub struct SmtpDispatcher {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpDispatcher {
    pub fn new(config: &MailConfig) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid MAIL_FROM {:?}", config.from))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .with_context(|| format!("invalid SMTP_HOST {:?}", config.smtp_host))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ))
            .build();
        Ok(Self {
            transport: Arc::new(transport),
            from,
        })
    }
}

fn subject(purpose: CodePurpose) -> &'static str {
    match purpose {
        CodePurpose::Registration => "Your registration code",
        CodePurpose::PasswordReset => "Your password reset code",
        CodePurpose::EmailChange => "Confirm your new email address",
        CodePurpose::BlockActivation => "Confirm client block activation",
    }
}

/// Subject and plain-text body for a dispatch.
pub(crate) fn render(dispatch: &Dispatch) -> (String, String) {
    let ctx = &dispatch.context;
    let mut body = format!(
        "Your verification code is: {code}\n\n{summary}\n\n\
         Requested at: {requested}\n\
         Expires at:   {expires}\n",
        code = dispatch.code,
        summary = ctx.summary,
        requested = ctx.requested_at.format("%Y-%m-%d %H:%M:%S UTC"),
        expires = ctx.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    if let Some(user_id) = ctx.requested_by {
        body.push_str(&format!("Requested by: {user_id}\n"));
    }
    body.push_str("\nIf you did not request this code, ignore this email.\n");
    (subject(ctx.purpose).to_owned(), body)
}

impl Dispatcher for SmtpDispatcher {
    async fn send(&self, dispatch: &Dispatch) -> Result<(), DispatchError> {
        let to: Mailbox = dispatch
            .destination
            .parse()
            .map_err(|e| DispatchError::Failed(format!("invalid destination: {e}")))?;
        let (subject, body) = render(dispatch);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| DispatchError::Failed(format!("failed to build message: {e}")))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DispatchError::Failed(e.to_string()))?;
        Ok(())
    }
}
