//! Server configuration.

use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DIRECTORY: &str = "./pub";

/// Everything needed to start the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Directory uploads are stored in and served from
    pub directory: PathBuf,

    /// Basic-auth credentials; authentication is disabled when `None`
    pub credentials: Option<Credentials>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            credentials: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Basic-auth username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Parses `user:password`. The password is everything after the first
    /// `:` and may itself contain colons; without a colon it is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use cache_server::config::Credentials;
    ///
    /// let creds = Credentials::parse("ci:s3:cr3t");
    /// assert_eq!(creds.username, "ci");
    /// assert_eq!(creds.password, "s3:cr3t");
    /// ```
    pub fn parse(value: &str) -> Self {
        let (username, password) = value.split_once(':').unwrap_or((value, ""));
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

// Keep the password out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
