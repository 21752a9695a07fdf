//! Plain-HTTP [`BrowserSession`]: renders pages with a GET through a
//! cookie-jar client and logs in with a form POST.
//!
//! Pages that only exist after script execution need a real browser backend;
//! this session returns the server-rendered markup as-is.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument};
use url::Url;

use super::{BrowserSession, Credentials, RenderedPage, SessionError};
use crate::fetch::build_http_client;
use crate::fetch::constants::CONNECT_TIMEOUT_SECS;

/// Where and how to post login credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub url: Url,
    pub username_field: String,
    pub password_field: String,
}

/// Session backed by a reqwest client and a shared cookie jar.
///
/// Calls block the current thread on the captured runtime handle, so they
/// must run outside async code (for example under `spawn_blocking`).
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    runtime: Handle,
    login_form: Option<LoginForm>,
    render_timeout: Duration,
}

impl HttpSession {
    /// Creates a session bound to `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(
        runtime: Handle,
        login_form: Option<LoginForm>,
        render_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let jar = Arc::new(Jar::default());
        let client = build_http_client(
            Some(Arc::clone(&jar)),
            CONNECT_TIMEOUT_SECS,
            render_timeout.as_secs().max(1),
        )
        .map_err(|e| SessionError::unavailable(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            jar,
            runtime,
            login_form,
            render_timeout,
        })
    }

    /// The cookie jar, shared with the image client so fetches reuse the login.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    async fn get_page(&self, page_ref: &str, url: Url) -> Result<RenderedPage, SessionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(page_ref, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::http_status(page_ref, status.as_u16()));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(page_ref, e))?;
        debug!(url = %final_url, bytes = html.len(), "page rendered");
        Ok(RenderedPage::new(final_url, html))
    }

    async fn post_login(&self, form: &LoginForm, credentials: &Credentials) -> Result<(), SessionError> {
        let fields = [
            (form.username_field.as_str(), credentials.username.as_str()),
            (form.password_field.as_str(), credentials.password.as_str()),
        ];
        let response = self
            .client
            .post(form.url.clone())
            .form(&fields)
            .send()
            .await
            .map_err(|e| SessionError::authentication(format!("login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::authentication(format!(
                "login answered HTTP {}",
                status.as_u16()
            )));
        }
        if self.jar.cookies(&form.url).is_none() {
            return Err(SessionError::authentication("login set no session cookie"));
        }
        Ok(())
    }
}

fn map_reqwest_error(page_ref: &str, error: reqwest::Error) -> SessionError {
    if error.is_timeout() {
        SessionError::timeout(page_ref)
    } else {
        SessionError::network(page_ref, error)
    }
}

/// Parses a renderable page reference; anchors and relative refs need a
/// browser that already has the catalog page open.
fn parse_page_ref(page_ref: &str) -> Result<Url, SessionError> {
    let url = Url::parse(page_ref).map_err(|_| SessionError::unsupported(page_ref))?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(url)
    } else {
        Err(SessionError::unsupported(page_ref))
    }
}

impl BrowserSession for HttpSession {
    #[instrument(skip(self, credentials))]
    fn authenticate(&self, credentials: &Credentials) -> Result<(), SessionError> {
        let Some(form) = &self.login_form else {
            debug!("source has no login form, continuing anonymously");
            return Ok(());
        };

        let timeout = self.render_timeout;
        self.runtime.block_on(async {
            match tokio::time::timeout(timeout, self.post_login(form, credentials)).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::authentication("login timed out")),
            }
        })?;
        info!("session authenticated");
        Ok(())
    }

    #[instrument(skip(self))]
    fn render(&self, page_ref: &str) -> Result<RenderedPage, SessionError> {
        let url = parse_page_ref(page_ref)?;
        let timeout = self.render_timeout;
        self.runtime.block_on(async {
            match tokio::time::timeout(timeout, self.get_page(page_ref, url)).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::timeout(page_ref)),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn session(login_form: Option<LoginForm>) -> HttpSession {
        HttpSession::new(Handle::current(), login_form, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_page_ref_rejects_anchor() {
        assert!(matches!(
            parse_page_ref("#c-12"),
            Err(SessionError::UnsupportedPageRef { .. })
        ));
        assert!(matches!(
            parse_page_ref("ftp://example.com/a"),
            Err(SessionError::UnsupportedPageRef { .. })
        ));
        assert!(parse_page_ref("https://example.com/a").is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_render_returns_markup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>page</html>"))
            .mount(&server)
            .await;

        let session = session(None);
        let page_ref = format!("{}/c1", server.uri());
        let page = tokio::task::spawn_blocking(move || session.render(&page_ref))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.html, "<html>page</html>");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_render_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let session = session(None);
        let page_ref = format!("{}/missing", server.uri());
        let error = tokio::task::spawn_blocking(move || session.render(&page_ref))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(error, SessionError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_authenticate_posts_form_and_requires_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("user=reader"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc; Path=/"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let form = LoginForm {
            url: Url::parse(&format!("{}/login", server.uri())).unwrap(),
            username_field: "user".to_string(),
            password_field: "pass".to_string(),
        };
        let session = session(Some(form));
        let result = tokio::task::spawn_blocking(move || {
            session.authenticate(&Credentials::new("reader", "secret"))
        })
        .await
        .unwrap();
        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_authenticate_without_cookie_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let form = LoginForm {
            url: Url::parse(&format!("{}/login", server.uri())).unwrap(),
            username_field: "user".to_string(),
            password_field: "pass".to_string(),
        };
        let session = session(Some(form));
        let error = tokio::task::spawn_blocking(move || {
            session.authenticate(&Credentials::new("reader", "wrong"))
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(error, SessionError::Authentication { .. }));
    }
}
