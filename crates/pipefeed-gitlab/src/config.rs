//! Connection settings for one GitLab project.

use pipefeed_core::{GatewayError, GatewayResult};

const DEFAULT_USER_AGENT: &str = concat!("pipefeed/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabConfig {
    /// Instance root, e.g. `https://gitlab.example.com`
    pub base_url: String,
    /// Personal or project access token sent as `PRIVATE-TOKEN`
    pub token: String,
    /// Numeric id or `group/project` path
    pub project: String,
    /// Skip TLS certificate verification (self-hosted instances only)
    pub accept_invalid_certs: bool,
    pub user_agent: String,
}

impl GitLabConfig {
    pub fn new(base_url: &str, token: &str, project: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            project: project.to_string(),
            accept_invalid_certs: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Read `GITLAB_BASE_URL`, `GITLAB_TOKEN`, `GITLAB_PROJECT_ID` and
    /// `GITLAB_INSECURE`. Missing values are left empty for
    /// [`validate`](Self::validate) to report.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let mut config = Self::new(
            &var("GITLAB_BASE_URL"),
            &var("GITLAB_TOKEN"),
            &var("GITLAB_PROJECT_ID"),
        );
        config.accept_invalid_certs = is_truthy(&var("GITLAB_INSECURE"));
        config
    }

    pub fn with_insecure(mut self, accept_invalid_certs: bool) -> Self {
        self.accept_invalid_certs = accept_invalid_certs;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn validate(&self) -> GatewayResult<()> {
        let missing: Vec<&str> = [
            ("base_url", &self.base_url),
            ("token", &self.token),
            ("project", &self.project),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(GatewayError::Config(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(GatewayError::Config(format!(
                "base_url must be http(s): {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
