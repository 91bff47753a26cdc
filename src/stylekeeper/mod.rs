use std::sync::Arc;

use serde_json::Value;

use crate::{
    error::{CustomCssError, ErrorAction, ErrorKind},
    gatekeeper::Actor,
    optionarium::Optionarium,
    timekeeper::Timekeeper,
    uploadvault::UploadVault,
    utils::escape_html::escape_html,
    CustomCssResult,
};

pub const CSS_OPTION: &str = "om4_freeform_css";
pub const LAST_SAVED_TIMESTAMP_OPTION: &str = "om4_freeform_css_last_saved_timestamp";
pub const FILENAME_OPTION: &str = "om4_freeform_css_filename";

/// Stylesheets are not uploadable in general, only while publishing.
const STYLESHEET_MIMES: &[(&str, &str)] = &[("css", "text/css")];

const CSS_VALIDATOR_URL: &str = "http://jigsaw.w3.org/css-validator/validator";

/// Outcome of a successful publish.
#[derive(Clone, PartialEq, Debug)]
pub struct PublishedStylesheet {
    /// Storage-relative path now recorded as the current stylesheet.
    pub filename: String,
    pub url: String,
    /// Previous stylesheet that was removed, if any.
    pub superseded: Option<String>,
}

/// Owns the custom CSS text and the stylesheet file it is published to.
///
/// The text, its last-saved timestamp and the current file name live in the option store; the
/// generated stylesheet lives in the upload vault. Publishing writes a fresh file, points the
/// file name option at it and then removes the file it replaced.
#[derive(Debug)]
pub struct Stylekeeper {
    optionarium: Arc<Optionarium>,
    uploadvault: Arc<UploadVault>,
    timekeeper: Arc<dyn Timekeeper>,
}

impl Stylekeeper {
    /// Creates the manager and the three options it owns, when they are missing.
    pub async fn new(
        optionarium: Arc<Optionarium>,
        uploadvault: Arc<UploadVault>,
        timekeeper: Arc<dyn Timekeeper>,
    ) -> CustomCssResult<Self> {
        optionarium
            .add_option(CSS_OPTION, Value::String(String::new()))
            .await?;
        optionarium
            .add_option(LAST_SAVED_TIMESTAMP_OPTION, Value::from(1))
            .await?;
        optionarium
            .add_option(FILENAME_OPTION, Value::String(String::new()))
            .await?;

        Ok(Self {
            optionarium,
            uploadvault,
            timekeeper,
        })
    }

    /// The saved CSS text, empty until the first save.
    pub fn get_css(&self) -> String {
        self.optionarium.get_string(CSS_OPTION, "")
    }

    /// Unix time of the last save, `1` before any save.
    pub fn get_last_saved_timestamp(&self) -> i64 {
        self.optionarium.get_i64(LAST_SAVED_TIMESTAMP_OPTION, 1)
    }

    /// Storage-relative path of the current stylesheet, e.g. `/2012/02/custom-1329690974.css`.
    /// Empty until the first publish.
    pub fn get_published_filename(&self) -> String {
        self.optionarium.get_string(FILENAME_OPTION, "")
    }

    pub fn is_published(&self) -> bool {
        !self.get_published_filename().is_empty()
    }

    /// Stores `css` and republishes it.
    ///
    /// The text stays saved when publishing fails; the caller only learns that the file could not
    /// be written.
    pub async fn save(&self, css: &str, actor: &Actor) -> CustomCssResult<PublishedStylesheet> {
        tracing::info!(
            "Saving {} bytes of custom CSS on behalf of user {}",
            css.len(),
            actor.id
        );

        let timestamp = self
            .timekeeper
            .now()
            .timestamp()
            .max(self.get_last_saved_timestamp());

        self.optionarium
            .update_option(LAST_SAVED_TIMESTAMP_OPTION, Value::from(timestamp))
            .await?;
        self.optionarium
            .update_option(CSS_OPTION, Value::String(css.to_string()))
            .await?;

        self.publish(actor).await
    }

    /// The bytes a publish would write right now: a generated comment header followed by the CSS.
    pub fn generate_stylesheet(&self, actor: &Actor) -> String {
        format!(
            "/* CSS Generated {} by User ID {} */\n\n{}",
            self.timekeeper.now().to_rfc2822(),
            actor.id,
            self.get_css()
        )
    }

    /// Writes the current CSS to a new `custom-<unix time>.css` file and makes it current.
    ///
    /// # Errors
    ///
    /// `PublishFailed` when the file cannot be uploaded; the previous stylesheet stays current.
    /// When the new file name cannot be recorded, the fresh upload is deleted again and the option
    /// store error is returned, so the previous stylesheet also stays current.
    pub async fn publish(&self, actor: &Actor) -> CustomCssResult<PublishedStylesheet> {
        let stylesheet = self.generate_stylesheet(actor);
        let filename = format!("custom-{}.css", self.timekeeper.now().timestamp());

        let uploaded = match self
            .uploadvault
            .upload_bits(&filename, stylesheet.as_bytes(), STYLESHEET_MIMES)
            .await
        {
            Ok(uploaded) => uploaded,
            Err(err) => {
                tracing::warn!(
                    "Error creating Custom CSS stylesheet: {} ({})",
                    filename,
                    err.get_message()
                );

                return Err(CustomCssError::raise_general_storage_error(
                    ErrorKind::PublishFailed,
                    &format!(
                        "Error creating Custom CSS stylesheet: {} ({})",
                        filename,
                        err.get_message()
                    ),
                    ErrorAction::Notify,
                ));
            }
        };

        let previous = self.get_published_filename();

        if let Err(err) = self
            .optionarium
            .update_option(FILENAME_OPTION, Value::String(uploaded.relative.clone()))
            .await
        {
            tracing::warn!(
                "Could not record {} as the current stylesheet, discarding it: {}",
                uploaded.relative,
                err.get_message()
            );

            if let Err(delete_err) = self.uploadvault.delete(&uploaded.relative).await {
                tracing::warn!(
                    "Could not discard unrecorded stylesheet {}: {}",
                    uploaded.relative,
                    delete_err.get_message()
                );
            }

            return Err(err);
        }

        let superseded = self.remove_superseded(&previous, &uploaded.relative).await;

        tracing::info!("Custom CSS published to {}", uploaded.relative);

        Ok(PublishedStylesheet {
            filename: uploaded.relative,
            url: uploaded.url,
            superseded,
        })
    }

    /// Deletes the previous stylesheet. Failures are logged and otherwise ignored.
    async fn remove_superseded(&self, previous: &str, current: &str) -> Option<String> {
        if previous.is_empty() || previous == current {
            return None;
        }

        if !self.uploadvault.is_file(previous).await {
            tracing::debug!("Previous stylesheet {} is not a file, nothing to delete", previous);
            return None;
        }

        match self.uploadvault.delete(previous).await {
            Ok(()) => Some(previous.to_string()),
            Err(err) => {
                tracing::warn!(
                    "Could not delete superseded stylesheet {}: {}",
                    previous,
                    err.get_message()
                );
                None
            }
        }
    }

    /// Lifecycle handler for a freshly created site: publishes whatever CSS exists (possibly none)
    /// so the site starts with a valid stylesheet.
    pub async fn new_site_initialised(&self) -> CustomCssResult<PublishedStylesheet> {
        tracing::info!("New site initialised, generating the initial Custom CSS stylesheet");

        self.publish(&Actor::anonymous()).await
    }

    /// Public URL of the current stylesheet, or an empty string before the first publish.
    pub fn get_published_url(&self) -> String {
        let filename = self.get_published_filename();

        if filename.is_empty() {
            return String::new();
        }

        self.uploadvault.url_for(&filename)
    }

    /// The `<link>` tag for the current stylesheet, or nothing before the first publish.
    pub fn render_stylesheet_link(&self) -> String {
        if !self.is_published() {
            return String::new();
        }

        format!(
            "\n<link rel=\"stylesheet\" href=\"{}\" type=\"text/css\" media=\"screen\" />\n",
            escape_html(&self.get_published_url())
        )
    }

    /// W3C validator address for the current stylesheet, sized for an overlay window.
    pub fn validate_css_url(&self) -> String {
        let encoded: String =
            url::form_urlencoded::byte_serialize(self.get_published_url().as_bytes()).collect();

        format!(
            "{}?warning=no&uri={}&TB_iframe=true&width=900&height=600",
            CSS_VALIDATOR_URL, encoded
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc};

    use crate::{
        configatron::ConfiguredUser,
        error::ErrorKind,
        gatekeeper::{Actor, Role},
        optionarium::Optionarium,
        stylekeeper::{
            Stylekeeper, CSS_OPTION, FILENAME_OPTION, LAST_SAVED_TIMESTAMP_OPTION,
        },
        timekeeper::{FrozenTimekeeper, Timekeeper},
        uploadvault::UploadVault,
    };

    const START: i64 = 1_329_690_974;

    struct Fixture {
        stylekeeper: Stylekeeper,
        optionarium: Arc<Optionarium>,
        uploadvault: Arc<UploadVault>,
        clock: FrozenTimekeeper,
    }

    async fn fixture(root: &Path, buckets: bool) -> Fixture {
        fixture_with_store(root, Arc::new(Optionarium::in_memory()), buckets).await
    }

    async fn fixture_with_store(
        root: &Path,
        optionarium: Arc<Optionarium>,
        buckets: bool,
    ) -> Fixture {
        let clock = FrozenTimekeeper::at_unix(START);
        let uploadvault = Arc::new(UploadVault::new(
            root.to_path_buf(),
            "http://example.com/wp-content/uploads",
            buckets,
            Arc::new(clock.clone()),
        ));
        let stylekeeper = Stylekeeper::new(
            optionarium.clone(),
            uploadvault.clone(),
            Arc::new(clock.clone()),
        )
        .await
        .unwrap();

        Fixture {
            stylekeeper,
            optionarium,
            uploadvault,
            clock,
        }
    }

    fn admin() -> Actor {
        Actor::from(&ConfiguredUser {
            id: 1,
            login: "admin".into(),
            role: Role::Administrator,
            session_token: "admin-session".into(),
        })
    }

    #[tokio::test]
    async fn defaults_are_created_on_construction() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        assert!(fx.optionarium.has_option(CSS_OPTION));
        assert!(fx.optionarium.has_option(LAST_SAVED_TIMESTAMP_OPTION));
        assert!(fx.optionarium.has_option(FILENAME_OPTION));

        assert_eq!(fx.stylekeeper.get_css(), "");
        assert_eq!(fx.stylekeeper.get_last_saved_timestamp(), 1);
        assert!(!fx.stylekeeper.is_published());
        assert_eq!(fx.stylekeeper.get_published_url(), "");
        assert_eq!(fx.stylekeeper.render_stylesheet_link(), "");
    }

    #[tokio::test]
    async fn saved_css_is_read_back_and_published() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), true).await;

        let published = fx.stylekeeper.save(".a{color:red}", &admin()).await.unwrap();

        assert_eq!(fx.stylekeeper.get_css(), ".a{color:red}");
        assert_eq!(fx.stylekeeper.get_last_saved_timestamp(), START);

        let url = fx.stylekeeper.get_published_url();
        assert!(url.ends_with(".css"));
        assert_eq!(url, published.url);

        let bucket = fx.clock.now().format("/%Y/%m").to_string();
        assert_eq!(
            fx.stylekeeper.get_published_filename(),
            format!("{}/custom-{}.css", bucket, START)
        );

        let content = fx.uploadvault.read(&published.filename).await.unwrap();
        assert!(String::from_utf8(content).unwrap().contains(".a{color:red}"));
    }

    #[tokio::test]
    async fn published_content_is_header_plus_css() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        let published = fx
            .stylekeeper
            .save("body { margin: 0; }", &admin())
            .await
            .unwrap();

        let expected = format!(
            "/* CSS Generated {} by User ID 1 */\n\nbody {{ margin: 0; }}",
            fx.clock.now().to_rfc2822()
        );
        let content = fx.uploadvault.read(&published.filename).await.unwrap();

        assert_eq!(String::from_utf8(content).unwrap(), expected);
        assert_eq!(fx.stylekeeper.generate_stylesheet(&admin()), expected);
    }

    #[tokio::test]
    async fn second_publish_removes_the_first_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        let first = fx.stylekeeper.save(".a{}", &admin()).await.unwrap();
        fx.clock.set_unix(START + 60);
        let second = fx.stylekeeper.save(".b{}", &admin()).await.unwrap();

        assert_eq!(first.filename, format!("/custom-{}.css", START));
        assert_eq!(second.filename, format!("/custom-{}.css", START + 60));
        assert_eq!(second.superseded, Some(first.filename.clone()));
        assert!(!fx.uploadvault.exists(&first.filename).await);
        assert!(fx.uploadvault.exists(&second.filename).await);
        assert_eq!(fx.stylekeeper.get_published_filename(), second.filename);
    }

    #[tokio::test]
    async fn same_second_publishes_get_a_suffixed_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        let first = fx.stylekeeper.save(".a{}", &admin()).await.unwrap();
        let second = fx.stylekeeper.save(".b{}", &admin()).await.unwrap();

        assert_eq!(first.filename, format!("/custom-{}.css", START));
        assert_eq!(second.filename, format!("/custom-{}-1.css", START));
        assert!(!fx.uploadvault.exists(&first.filename).await);

        let content = fx.uploadvault.read(&second.filename).await.unwrap();
        assert!(String::from_utf8(content).unwrap().ends_with(".b{}"));

        // The plain name was freed, but a browser may still cache it.
        let third = fx.stylekeeper.save(".c{}", &admin()).await.unwrap();
        assert_eq!(third.filename, format!("/custom-{}-2.css", START));
        assert!(!fx.uploadvault.exists(&second.filename).await);
        assert!(!fx.uploadvault.exists(&first.filename).await);
    }

    #[tokio::test]
    async fn missing_previous_file_is_not_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        let first = fx.stylekeeper.publish(&admin()).await.unwrap();
        std::fs::remove_file(temp_dir.path().join(first.filename.trim_start_matches('/')))
            .unwrap();

        fx.clock.set_unix(START + 1);
        let second = fx.stylekeeper.publish(&admin()).await.unwrap();

        assert_eq!(second.superseded, None);
        assert_eq!(fx.stylekeeper.get_published_filename(), second.filename);
    }

    #[tokio::test]
    async fn previous_path_that_is_not_a_file_is_left_alone() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        std::fs::create_dir(temp_dir.path().join("custom-1.css")).unwrap();
        fx.optionarium
            .update_option(FILENAME_OPTION, serde_json::json!("/custom-1.css"))
            .await
            .unwrap();

        let published = fx.stylekeeper.publish(&admin()).await.unwrap();

        assert_eq!(published.superseded, None);
        assert!(temp_dir.path().join("custom-1.css").is_dir());
    }

    #[tokio::test]
    async fn failed_publish_keeps_text_and_previous_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let fx = fixture(&blocker.join("uploads"), false).await;

        fx.optionarium
            .update_option(FILENAME_OPTION, serde_json::json!("/custom-1.css"))
            .await
            .unwrap();

        let error = fx
            .stylekeeper
            .save(".kept{}", &admin())
            .await
            .unwrap_err();

        assert_eq!(error.get_kind(), ErrorKind::PublishFailed);
        assert!(error.is_general());
        assert_eq!(fx.stylekeeper.get_css(), ".kept{}");
        assert_eq!(fx.stylekeeper.get_last_saved_timestamp(), START);
        assert_eq!(fx.stylekeeper.get_published_filename(), "/custom-1.css");
    }

    #[tokio::test]
    async fn unrecorded_stylesheet_is_discarded() {
        let temp_dir = tempfile::tempdir().unwrap();
        let options_dir = temp_dir.path().join("options");
        let uploads_dir = temp_dir.path().join("uploads");
        let optionarium = Arc::new(
            Optionarium::load(options_dir.join("options.json"))
                .await
                .unwrap(),
        );
        let fx = fixture_with_store(&uploads_dir, optionarium, false).await;

        let first = fx.stylekeeper.publish(&admin()).await.unwrap();

        // The option file can no longer be written.
        std::fs::remove_dir_all(&options_dir).unwrap();
        std::fs::write(&options_dir, "").unwrap();

        fx.clock.set_unix(START + 1);
        assert!(fx.stylekeeper.publish(&admin()).await.is_err());
        assert_eq!(fx.stylekeeper.get_published_filename(), first.filename);
        assert!(fx.uploadvault.is_file(&first.filename).await);

        std::fs::remove_file(&options_dir).unwrap();

        fx.clock.set_unix(START + 2);
        let third = fx.stylekeeper.publish(&admin()).await.unwrap();

        assert_eq!(third.superseded, Some(first.filename));

        let remaining: Vec<String> = std::fs::read_dir(&uploads_dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(remaining, vec![format!("custom-{}.css", START + 2)]);
    }

    #[tokio::test]
    async fn new_site_publishes_an_empty_stylesheet() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        let published = fx.stylekeeper.new_site_initialised().await.unwrap();

        assert!(!fx.stylekeeper.get_published_filename().is_empty());

        let content = String::from_utf8(fx.uploadvault.read(&published.filename).await.unwrap())
            .unwrap();
        assert!(content.starts_with("/* CSS Generated "));
        assert!(content.ends_with(" by User ID 0 */\n\n"));
    }

    #[tokio::test]
    async fn last_saved_timestamp_never_goes_backwards() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        fx.stylekeeper.save(".a{}", &admin()).await.unwrap();
        fx.clock.set_unix(START - 3600);
        fx.stylekeeper.save(".b{}", &admin()).await.unwrap();

        assert_eq!(fx.stylekeeper.get_last_saved_timestamp(), START);
    }

    #[tokio::test]
    async fn stylesheet_link_points_at_the_published_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        fx.stylekeeper.publish(&admin()).await.unwrap();

        let link = fx.stylekeeper.render_stylesheet_link();

        assert_eq!(
            link,
            format!(
                "\n<link rel=\"stylesheet\" href=\"http://example.com/wp-content/uploads/custom-{}.css\" type=\"text/css\" media=\"screen\" />\n",
                START
            )
        );
        assert_eq!(link.matches("<link").count(), 1);
    }

    #[tokio::test]
    async fn validate_url_encodes_the_stylesheet_address() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fx = fixture(temp_dir.path(), false).await;

        fx.stylekeeper.publish(&admin()).await.unwrap();

        assert_eq!(
            fx.stylekeeper.validate_css_url(),
            format!(
                "http://jigsaw.w3.org/css-validator/validator?warning=no&uri=http%3A%2F%2Fexample.com%2Fwp-content%2Fuploads%2Fcustom-{}.css&TB_iframe=true&width=900&height=600",
                START
            )
        );
    }
}
