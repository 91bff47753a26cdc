use std::net::SocketAddr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::gatekeeper::Role;

/// Host the server binds to.
pub const LOCAL_HOST: &str = "127.0.0.1";

const WILDCARD_PORT: &str = "0";

/// A dashboard user as declared in the configuration file.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
pub struct ConfiguredUser {
    /// Numeric user id, printed in the generated stylesheet header.
    pub id: u64,
    pub login: String,
    #[serde(default = "default_role")]
    pub role: Role,
    /// Secret presented through the session cookie or a bearer token.
    #[serde(rename = "sessionToken")]
    pub session_token: String,
}

/// Represents configuration settings for the service, deserialized from a JSON file.
///
/// Fields are deserialized using `serde`, with custom default functions specified for each.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ConfigurationJson {
    /// Port setting for the HTTP server, allowing a wildcard ("0") as default.
    #[serde(
        default = "default_wildcard_port",
        deserialize_with = "normalize_wildcard_port"
    )]
    pub port: String,

    /// Public address of the site, used for the "view your site" link. Derived from the bound
    /// server address when absent.
    #[serde(rename = "siteUrl", default)]
    pub site_url: Option<String>,

    /// Directory uploaded files are written into.
    #[serde(rename = "uploadsDir", default = "default_uploads_dir")]
    pub uploads_dir: String,

    /// Public base URL of the uploads directory. Derived from `siteUrl` when absent.
    #[serde(rename = "uploadsUrl", default)]
    pub uploads_url: Option<String>,

    /// Bucket uploads into `YYYY/MM` folders.
    #[serde(rename = "useYearMonthFolders", default = "enabled_by_default")]
    pub use_year_month_folders: bool,

    #[serde(rename = "optionsFile", default = "default_options_file")]
    pub options_file: String,

    /// Theme family whose head hook receives the stylesheet link: `om4`, `woo` or `generic`.
    #[serde(rename = "themeFamily", default = "default_theme_family")]
    pub theme_family: String,

    /// Lifetime, in seconds, of anti-forgery tokens.
    #[serde(rename = "nonceLifetime", default = "default_nonce_lifetime")]
    pub nonce_lifetime: u64,

    #[serde(default = "empty_vector_by_default")]
    pub users: Vec<ConfiguredUser>,

    #[serde(rename = "logsDir", default = "default_logs_dir")]
    pub logs_dir: String,
}

impl Default for ConfigurationJson {
    fn default() -> Self {
        Self {
            port: default_wildcard_port(),
            site_url: None,
            uploads_dir: default_uploads_dir(),
            uploads_url: None,
            use_year_month_folders: true,
            options_file: default_options_file(),
            theme_family: default_theme_family(),
            nonce_lifetime: default_nonce_lifetime(),
            users: vec![],
            logs_dir: default_logs_dir(),
        }
    }
}

/// Returns `true` as the default value, used for fields requiring an enabled default state.
fn enabled_by_default() -> bool {
    true
}

fn empty_vector_by_default() -> Vec<ConfiguredUser> {
    vec![]
}

/// Provides "0" as the default port, allowing for a wildcard port assignment.
fn default_wildcard_port() -> String {
    WILDCARD_PORT.to_string()
}

fn default_uploads_dir() -> String {
    "uploads".to_string()
}

fn default_options_file() -> String {
    "options.json".to_string()
}

fn default_theme_family() -> String {
    "generic".to_string()
}

fn default_nonce_lifetime() -> u64 {
    86400
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

fn default_role() -> Role {
    Role::Subscriber
}

fn normalize_wildcard_port<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let port = String::deserialize(deserializer)?;

    Ok(if port == "*" {
        WILDCARD_PORT.to_string()
    } else {
        port
    })
}

/// Resolved service configuration.
///
/// Site and uploads URLs left out of the file follow the server address, so they only become
/// reachable once `resolve_local_addr` has recorded the port actually bound.
#[derive(Clone, PartialEq, Debug)]
pub struct Configatron {
    port: String,
    site_url: Option<String>,
    uploads_dir: String,
    uploads_url: Option<String>,
    use_year_month_folders: bool,
    options_file: String,
    theme_family: String,
    nonce_lifetime: u64,
    users: Vec<ConfiguredUser>,
    logs_dir: String,
}

impl Configatron {
    /// Builds a `Configatron` from its JSON form. Explicit URLs lose their trailing `/`.
    pub fn from_json(config_json: ConfigurationJson) -> Self {
        let trim = |url: String| url.trim_end_matches('/').to_string();

        Self {
            port: config_json.port,
            site_url: config_json.site_url.map(trim),
            uploads_dir: config_json.uploads_dir,
            uploads_url: config_json.uploads_url.map(trim),
            use_year_month_folders: config_json.use_year_month_folders,
            options_file: config_json.options_file,
            theme_family: config_json.theme_family,
            nonce_lifetime: config_json.nonce_lifetime.max(2),
            users: config_json.users,
            logs_dir: config_json.logs_dir,
        }
    }

    /// Records the address the server actually listens on. A wildcard port becomes the real one.
    pub fn resolve_local_addr(&mut self, local_addr: SocketAddr) {
        self.port = local_addr.port().to_string();
    }

    /// Writes the resolved settings to the log.
    pub fn log_summary(&self) {
        info!(
            "Custom CSS configurations: port: {}, site_url: {}, uploads_dir: {}, uploads_url: {}, \
            use_year_month_folders: {}, theme_family: {}, users: {}",
            self.port,
            self.get_site_url(),
            self.uploads_dir,
            self.get_uploads_url(),
            self.use_year_month_folders,
            self.theme_family,
            self.users.len()
        );
    }

    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    /// The configured site URL, or the local server address (`http://127.0.0.1[:port]`).
    pub fn get_site_url(&self) -> String {
        self.site_url.clone().unwrap_or_else(|| {
            if self.port == WILDCARD_PORT {
                format!("http://{}", LOCAL_HOST)
            } else {
                format!("http://{}:{}", LOCAL_HOST, self.port)
            }
        })
    }

    pub fn get_uploads_dir(&self) -> String {
        self.uploads_dir.clone()
    }

    /// The configured uploads URL, or `{site_url}/uploads`.
    pub fn get_uploads_url(&self) -> String {
        self.uploads_url
            .clone()
            .unwrap_or_else(|| format!("{}/uploads", self.get_site_url()))
    }

    pub fn get_use_year_month_folders(&self) -> bool {
        self.use_year_month_folders
    }

    pub fn get_options_file(&self) -> String {
        self.options_file.clone()
    }

    pub fn get_theme_family(&self) -> String {
        self.theme_family.clone()
    }

    pub fn get_nonce_lifetime(&self) -> u64 {
        self.nonce_lifetime
    }

    pub fn get_users(&self) -> Vec<ConfiguredUser> {
        self.users.clone()
    }

    pub fn get_logs_dir(&self) -> String {
        self.logs_dir.clone()
    }
}

impl Default for Configatron {
    fn default() -> Self {
        Self::from_json(ConfigurationJson::default())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        configatron::{Configatron, ConfigurationJson},
        gatekeeper::Role,
    };

    #[test]
    fn test_default_configuration() {
        let json_data = "{}";
        let config: ConfigurationJson = serde_json::from_str(json_data).unwrap();

        assert_eq!(config.port, "0");
        assert_eq!(config.site_url, None);
        assert_eq!(config.uploads_dir, "uploads");
        assert_eq!(config.uploads_url, None);
        assert!(config.use_year_month_folders);
        assert_eq!(config.options_file, "options.json");
        assert_eq!(config.theme_family, "generic");
        assert_eq!(config.nonce_lifetime, 86400);
        assert!(config.users.is_empty());
        assert_eq!(config.logs_dir, "logs");
    }

    #[test]
    fn test_custom_configuration() {
        let json_data = r#"
        {
            "port": "*",
            "siteUrl": "https://example.com/",
            "useYearMonthFolders": false,
            "themeFamily": "woo",
            "users": [
                { "id": 1, "login": "admin", "role": "administrator", "sessionToken": "s3cr3t" },
                { "id": 7, "login": "reader", "sessionToken": "r34d" }
            ]
        }"#;

        let config: ConfigurationJson = serde_json::from_str(json_data).unwrap();

        // normalize_wildcard_port should convert "*" to "0"
        assert_eq!(config.port, "0");
        assert!(!config.use_year_month_folders);
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].role, Role::Administrator);
        assert_eq!(config.users[1].role, Role::Subscriber);

        let configatron = Configatron::from_json(config);

        assert_eq!(configatron.get_site_url(), "https://example.com");
        assert_eq!(
            configatron.get_uploads_url(),
            "https://example.com/uploads"
        );
        assert_eq!(configatron.get_theme_family(), "woo");
    }

    #[test]
    fn test_unset_urls_follow_the_bound_port() {
        let mut configatron = Configatron::default();
        assert_eq!(configatron.get_uploads_url(), "http://127.0.0.1/uploads");

        configatron.resolve_local_addr("127.0.0.1:41234".parse().unwrap());

        assert_eq!(configatron.get_port(), "41234");
        assert_eq!(configatron.get_site_url(), "http://127.0.0.1:41234");
        assert_eq!(
            configatron.get_uploads_url(),
            "http://127.0.0.1:41234/uploads"
        );
    }

    #[test]
    fn test_fixed_port_is_part_of_the_default_site_url() {
        let config: ConfigurationJson = serde_json::from_str(r#"{ "port": "8080" }"#).unwrap();
        let configatron = Configatron::from_json(config);

        assert_eq!(configatron.get_site_url(), "http://127.0.0.1:8080");
        assert_eq!(
            configatron.get_uploads_url(),
            "http://127.0.0.1:8080/uploads"
        );
    }

    #[test]
    fn test_explicit_site_url_survives_port_resolution() {
        let config: ConfigurationJson =
            serde_json::from_str(r#"{ "siteUrl": "https://example.com/" }"#).unwrap();
        let mut configatron = Configatron::from_json(config);

        configatron.resolve_local_addr("127.0.0.1:41234".parse().unwrap());

        assert_eq!(configatron.get_site_url(), "https://example.com");
        assert_eq!(
            configatron.get_uploads_url(),
            "https://example.com/uploads"
        );
    }

    #[test]
    fn test_explicit_uploads_url_is_kept() {
        let json_data = r#"{ "uploadsUrl": "https://cdn.example.com/files/" }"#;
        let config: ConfigurationJson = serde_json::from_str(json_data).unwrap();
        let configatron = Configatron::from_json(config);

        assert_eq!(
            configatron.get_uploads_url(),
            "https://cdn.example.com/files"
        );
    }
}
