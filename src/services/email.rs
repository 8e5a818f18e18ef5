use crate::{
    config::Config,
    error::{AppError, Result},
};
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

/// SMTP 邮件服务，未配置凭据时仅记录日志
#[derive(Clone)]
pub struct EmailService {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_name: String,
    from_email: String,
    frontend_url: String,
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self> {
        let transport = if config.smtp_username.is_empty() || config.smtp_password.is_empty() {
            warn!("SMTP credentials not configured, verification emails will only be logged");
            None
        } else {
            let credentials =
                Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
            Some(
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                    .map_err(|e| AppError::Email(format!("Invalid SMTP relay: {}", e)))?
                    .port(config.smtp_port)
                    .credentials(credentials)
                    .build(),
            )
        };

        Ok(Self {
            transport,
            from_name: config.smtp_from_name.clone(),
            from_email: config.smtp_from_email.clone(),
            frontend_url: config.frontend_url.clone(),
        })
    }

    /// 发送邮箱验证邮件
    pub async fn send_verification_email(&self, to: &str, nickname: &str, token: &str) -> Result<()> {
        let verify_url = format!("{}/verify-email?token={}", self.frontend_url, token);
        let subject = "请验证你的邮箱";
        let body = format!(
            r#"<div style="max-width:600px;margin:0 auto;font-family:sans-serif;">
  <h2>你好，{nickname}！</h2>
  <p>感谢注册运动社区。请点击下面的链接完成邮箱验证：</p>
  <p><a href="{verify_url}" style="display:inline-block;padding:10px 24px;background:#4caf50;color:#fff;text-decoration:none;border-radius:4px;">验证邮箱</a></p>
  <p>如果按钮无法点击，请复制以下链接到浏览器打开：</p>
  <p>{verify_url}</p>
  <p>链接24小时内有效。如果这不是你的操作，请忽略本邮件。</p>
</div>"#
        );

        self.send(to, subject, &body).await
    }

    /// 邮箱验证通过后的欢迎邮件
    pub async fn send_welcome_email(&self, to: &str, nickname: &str) -> Result<()> {
        let subject = "欢迎加入运动社区";
        let body = format!(
            r#"<div style="max-width:600px;margin:0 auto;font-family:sans-serif;">
  <h2>欢迎你，{nickname}！</h2>
  <p>你的邮箱已验证成功，现在可以发布动态、关注运动类别、查找附近场地了。</p>
  <p><a href="{frontend}" style="display:inline-block;padding:10px 24px;background:#4caf50;color:#fff;text-decoration:none;border-radius:4px;">开始使用</a></p>
</div>"#,
            frontend = self.frontend_url
        );

        self.send(to, subject, &body).await
    }

    /// 发送密码重置邮件
    pub async fn send_password_reset_email(&self, to: &str, nickname: &str, token: &str) -> Result<()> {
        let reset_url = format!("{}/reset-password?token={}", self.frontend_url, token);
        let subject = "重置你的密码";
        let body = format!(
            r#"<div style="max-width:600px;margin:0 auto;font-family:sans-serif;">
  <h2>你好，{nickname}！</h2>
  <p>我们收到了重置密码的请求。请点击下面的链接设置新密码：</p>
  <p><a href="{reset_url}" style="display:inline-block;padding:10px 24px;background:#4caf50;color:#fff;text-decoration:none;border-radius:4px;">重置密码</a></p>
  <p>如果按钮无法点击，请复制以下链接到浏览器打开：</p>
  <p>{reset_url}</p>
  <p>链接2小时内有效。如果这不是你的操作，请忽略本邮件，你的密码不会改变。</p>
</div>"#
        );

        self.send(to, subject, &body).await
    }

    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!("Email suppressed (SMTP not configured): to={} subject={}", to, subject);
            return Ok(());
        };

        let message = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| AppError::Email(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| AppError::Email(format!("Invalid recipient address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| AppError::Email(format!("Failed to build email: {}", e)))?;

        transport.send(message).await.map_err(|e| {
            warn!("Failed to send email to {}: {}", to, e);
            AppError::Email(format!("Failed to send email: {}", e))
        })?;

        info!("Email sent: to={} subject={}", to, subject);
        Ok(())
    }
}
