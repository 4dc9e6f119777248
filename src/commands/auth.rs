use super::AppContext;
use crate::api::{Role, User};
use crate::config::mask_secret;
use crate::error::{AppError, AppResult};
use crate::session::{SessionState, COOKIE_STORAGE_KEY};
use std::io::Write;

fn describe(user: &User) -> String {
    let role = match user.role {
        Role::Admin => "admin",
        Role::User => "user",
    };
    format!("{} <{}> ({})", user.name, user.email, role)
}

pub async fn login(
    ctx: &AppContext,
    out: &mut impl Write,
    email: &str,
    password: &str,
) -> AppResult<()> {
    let mut session = ctx.session();
    let user = session.login(email, password).await?;
    writeln!(out, "Logged in as {}", describe(user))?;
    Ok(())
}

pub async fn register(
    ctx: &AppContext,
    out: &mut impl Write,
    email: &str,
    full_name: &str,
    password: &str,
    confirm_password: &str,
) -> AppResult<()> {
    if password != confirm_password {
        return Err(AppError::Invalid("Passwords do not match".into()));
    }
    let mut session = ctx.session();
    let user = session
        .register(email, full_name, password, confirm_password)
        .await?;
    writeln!(out, "Registered and logged in as {}", describe(user))?;
    Ok(())
}

pub async fn logout(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    let mut session = ctx.resolved_session().await?;
    if session.current_user().is_none() {
        writeln!(out, "Not logged in")?;
        return Ok(());
    }
    session.logout().await?;
    writeln!(out, "Logged out")?;
    Ok(())
}

pub async fn whoami(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    let session = ctx.resolved_session().await?;
    match session.state() {
        SessionState::Authenticated(user) => {
            writeln!(out, "{}", describe(user))?;
            if let Some(cookie) = ctx.db.get_item(COOKIE_STORAGE_KEY)? {
                writeln!(out, "session: {}", mask_secret(&cookie))?;
            }
        }
        _ => writeln!(out, "Not logged in")?,
    }
    Ok(())
}

pub async fn profile(
    ctx: &AppContext,
    out: &mut impl Write,
    email: Option<&str>,
    full_name: Option<&str>,
) -> AppResult<()> {
    let mut session = ctx.resolved_session().await?;
    if email.is_none() && full_name.is_none() {
        let user = session.require_user()?;
        writeln!(out, "{}", describe(user))?;
        return Ok(());
    }
    let user = session.update_profile(email, full_name).await?;
    writeln!(out, "Profile updated: {}", describe(user))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context_for, output, signed_in};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_whoami_anonymous() {
        let server = MockServer::start().await;
        let ctx = context_for(&server);
        let mut buf = Vec::new();
        whoami(&ctx, &mut buf).await.unwrap();
        assert_eq!(output(buf), "Not logged in\n");
    }

    #[tokio::test]
    async fn test_whoami_signed_in() {
        let server = MockServer::start().await;
        let ctx = signed_in(&server, "admin").await;
        let mut buf = Vec::new();
        whoami(&ctx, &mut buf).await.unwrap();
        assert_eq!(output(buf), "Ada <ada@example.com> (admin)\n");
    }

    #[tokio::test]
    async fn test_register_checks_confirmation_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/register"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let mut buf = Vec::new();
        let err = register(&ctx, &mut buf, "ada@example.com", "Ada", "a", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_login_reports_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let ctx = context_for(&server);
        let mut buf = Vec::new();
        let err = login(&ctx, &mut buf, "ada@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid credentials"));
        assert!(buf.is_empty());
    }
}
