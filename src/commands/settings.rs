use super::AppContext;
use crate::config::{self, SETTING_KEYS};
use crate::error::AppResult;
use std::io::Write;

pub fn list_settings(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    for key in SETTING_KEYS {
        match ctx.db.get_setting(key)? {
            Some(value) => writeln!(out, "{} = {}", key, value)?,
            None => writeln!(out, "{} (default)", key)?,
        }
    }
    writeln!(out, "# effective base url: {}", ctx.config.base_url)?;
    Ok(())
}

pub fn set_setting(ctx: &AppContext, out: &mut impl Write, key: &str, value: &str) -> AppResult<()> {
    config::validate_setting(key, value)?;
    ctx.db.set_setting(key, value.trim())?;
    writeln!(out, "{} = {}", key, value.trim())?;
    Ok(())
}

pub fn unset_setting(ctx: &AppContext, out: &mut impl Write, key: &str) -> AppResult<()> {
    if !SETTING_KEYS.contains(&key) {
        return Err(config::ConfigError::UnknownKey(key.to_string()).into());
    }
    if ctx.db.delete_setting(key)? {
        writeln!(out, "{} reset to default", key)?;
    } else {
        writeln!(out, "{} was not set", key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{context_for, output};
    use crate::config::{ConfigError, UPLOAD_MAX_RETRIES_KEY};
    use crate::error::AppError;
    use wiremock::MockServer;

    #[tokio::test]
    async fn test_set_list_unset() {
        let server = MockServer::start().await;
        let ctx = context_for(&server);

        let mut buf = Vec::new();
        set_setting(&ctx, &mut buf, UPLOAD_MAX_RETRIES_KEY, " 4 ").unwrap();
        assert_eq!(ctx.db.get_setting(UPLOAD_MAX_RETRIES_KEY).unwrap().as_deref(), Some("4"));

        let mut buf = Vec::new();
        list_settings(&ctx, &mut buf).unwrap();
        let text = output(buf);
        assert!(text.contains("upload_max_retries = 4"));
        assert!(text.contains("api_base_url (default)"));

        let mut buf = Vec::new();
        unset_setting(&ctx, &mut buf, UPLOAD_MAX_RETRIES_KEY).unwrap();
        unset_setting(&ctx, &mut buf, UPLOAD_MAX_RETRIES_KEY).unwrap();
        assert_eq!(
            output(buf),
            "upload_max_retries reset to default\nupload_max_retries was not set\n"
        );
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let server = MockServer::start().await;
        let ctx = context_for(&server);
        let mut buf = Vec::new();
        let err = set_setting(&ctx, &mut buf, "theme", "dark").unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::UnknownKey(_))));
        assert!(ctx.db.list_settings().unwrap().is_empty());
    }
}
