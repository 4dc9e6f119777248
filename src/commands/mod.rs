pub mod admin;
pub mod auth;
pub mod chat;
pub mod settings;

use crate::api::stream::StreamEvent;
use crate::api::Transport;
use crate::config::{self, Config};
use crate::db::Database;
use crate::error::AppResult;
use crate::session::Session;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// What every command runs against: the local store, the resolved
/// configuration and a transport pointed at the backend.
pub struct AppContext {
    pub db: Database,
    pub config: Config,
    pub transport: Transport,
}

impl AppContext {
    pub fn open(data_dir: Option<PathBuf>, base_url: Option<&str>) -> AppResult<Self> {
        let dir = config::data_dir(data_dir)?;
        debug!(data_dir = %dir.display(), "Opening local store");
        let db = Database::new(&dir)?;
        Self::with_database(db, base_url)
    }

    pub fn with_database(db: Database, base_url: Option<&str>) -> AppResult<Self> {
        let config = Config::resolve(&db, base_url)?;
        let transport = Transport::new(&config.base_url)?;
        debug!(base_url = %transport.base_url(), "Backend configured");
        Ok(Self {
            db,
            config,
            transport,
        })
    }

    pub fn session(&self) -> Session<'_> {
        Session::new(&self.transport, &self.db)
    }

    /// A session that has been checked against the backend.
    pub async fn resolved_session(&self) -> AppResult<Session<'_>> {
        let mut session = self.session();
        session.resolve().await?;
        Ok(session)
    }
}

/// Writes assistant text as it arrives.
fn echo_text<W: Write + Send>(out: &mut W) -> impl FnMut(StreamEvent) + Send + '_ {
    move |event| match event {
        StreamEvent::TextDelta(text) => {
            let _ = write!(out, "{}", text);
            let _ = out.flush();
        }
        StreamEvent::ConfigUpdate(urls) => info!(
            in_progress = urls.in_progress,
            found = urls.urls.len(),
            completed = urls.completed_urls.len(),
            "Reading linked pages"
        ),
        _ => {}
    }
}

fn lowercase_debug(value: &impl std::fmt::Debug) -> String {
    format!("{:?}", value).to_lowercase()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::session::USER_STORAGE_KEY;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn context_for(server: &MockServer) -> AppContext {
        let db = Database::open_in_memory().unwrap();
        AppContext::with_database(db, Some(&format!("{}/v1", server.uri()))).unwrap()
    }

    /// Context with a cached user the mock backend confirms.
    pub async fn signed_in(server: &MockServer, role: &str) -> AppContext {
        let user = json!({
            "id": "u-1", "name": "Ada", "email": "ada@example.com", "type": role
        });
        Mock::given(method("GET"))
            .and(path("/v1/user/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user.clone()))
            .mount(server)
            .await;
        let ctx = context_for(server);
        ctx.db.set_item(USER_STORAGE_KEY, &user.to_string()).unwrap();
        ctx
    }

    pub fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }
}
