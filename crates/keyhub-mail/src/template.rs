use crate::transport::OutgoingMail;

/// How long a verification code stays valid.
pub const CODE_TTL_MINUTES: i64 = 10;

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn verification_email(app_name: &str, to: &str, code: &str) -> OutgoingMail {
    let name = escape_html(app_name);
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 30px; border-radius: 10px; text-align: center; color: white;">
    <h1 style="margin: 0; font-size: 28px;">{name}</h1>
    <p style="margin: 10px 0 0 0; opacity: 0.9;">Email verification</p>
  </div>
  <div style="background: #f8f9fa; padding: 30px; border-radius: 10px; margin: 20px 0; text-align: center;">
    <h2 style="color: #333; margin: 0 0 20px 0;">Your verification code</h2>
    <div style="background: white; padding: 20px; border-radius: 8px; border: 2px dashed #667eea; display: inline-block;">
      <span style="font-size: 32px; font-weight: bold; color: #667eea; letter-spacing: 8px;">{code}</span>
    </div>
    <p style="color: #666; margin: 20px 0 0 0; font-size: 14px;">The code is valid for {CODE_TTL_MINUTES} minutes.</p>
  </div>
  <div style="text-align: center; color: #999; font-size: 12px;">
    <p>If you did not request this code, you can ignore this email.</p>
    <p>This message was sent automatically; please do not reply.</p>
  </div>
</div>"#,
        code = escape_html(code),
    );

    let text = format!(
        "{app_name}\n\nYour verification code is {code}.\nIt is valid for {CODE_TTL_MINUTES} minutes.\n\n\
         If you did not request this code, you can ignore this email."
    );

    OutgoingMail {
        to: to.to_string(),
        subject: format!("Email verification code - {app_name}"),
        html,
        text,
    }
}
