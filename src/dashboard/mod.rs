use std::{collections::HashMap, future::Future, sync::Arc};

use crate::{
    error::CustomCssError,
    gatekeeper::{Actor, Capability, Gatekeeper},
    utils::escape_html::escape_html,
    CustomCssResult,
};

pub mod customcss;

/// Field under which every settings form carries its anti-forgery token.
pub const NONCE_FIELD: &str = "_wpnonce";

/// Endpoint every settings form posts to. The `action` field selects the handler.
pub const ADMIN_POST_PATH: &str = "/admin/admin-post";

/// What a settings screen should tell the user, decoded from its query string.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScreenOutcome {
    Idle,
    Saved,
    SaveFailed,
    Denied,
}

impl ScreenOutcome {
    /// Reads `updated=true|false` and `denied=true` from the screen's query parameters.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        if query.get("denied").map(String::as_str) == Some("true") {
            return ScreenOutcome::Denied;
        }

        match query.get("updated").map(String::as_str) {
            Some("true") => ScreenOutcome::Saved,
            Some("false") => ScreenOutcome::SaveFailed,
            _ => ScreenOutcome::Idle,
        }
    }
}

/// The feature-specific half of a settings screen.
///
/// `Dashboard` supplies the page frame, the capability and token checks and the post-save
/// redirects; implementors only describe their fields and how to persist them.
pub trait ScreenFields: Send + Sync {
    fn screen_title(&self) -> &str;

    /// Slug used in the screen URL (`/admin/<screen_name>`).
    fn screen_name(&self) -> &str;

    /// `action` value the form posts, which is also the anti-forgery scope.
    fn save_action(&self) -> &str;

    fn submit_label(&self) -> &str {
        "Save Changes"
    }

    /// Notice shown above the form. `None` falls back to the generic notices.
    fn render_notice(&self, _outcome: ScreenOutcome) -> Option<String> {
        None
    }

    /// Markup placed inside the form, before the hidden fields and the submit button.
    fn render_fields(&self) -> String;

    /// Persists the submitted form. Only called after capability and token checks passed.
    fn save(
        &self,
        form: &HashMap<String, String>,
        actor: &Actor,
    ) -> impl Future<Output = CustomCssResult<()>> + Send;
}

/// A settings screen: generic frame composed with feature fields.
#[derive(Debug)]
pub struct Dashboard<F: ScreenFields> {
    fields: F,
    gatekeeper: Arc<Gatekeeper>,
}

impl<F: ScreenFields> Dashboard<F> {
    pub fn new(fields: F, gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { fields, gatekeeper }
    }

    pub fn dashboard_url(&self) -> String {
        format!("/admin/{}", self.fields.screen_name())
    }

    pub fn dashboard_url_saved(&self) -> String {
        format!("{}?updated=true", self.dashboard_url())
    }

    pub fn dashboard_url_saved_error(&self) -> String {
        format!("{}?updated=false", self.dashboard_url())
    }

    pub fn dashboard_url_denied(&self) -> String {
        format!("{}?denied=true", self.dashboard_url())
    }

    /// Where the user lands after a save attempt with the given outcome.
    pub fn redirect_url(&self, outcome: ScreenOutcome) -> String {
        match outcome {
            ScreenOutcome::Saved => self.dashboard_url_saved(),
            ScreenOutcome::SaveFailed => self.dashboard_url_saved_error(),
            ScreenOutcome::Denied => self.dashboard_url_denied(),
            ScreenOutcome::Idle => self.dashboard_url(),
        }
    }

    pub fn can_access(&self, actor: &Actor) -> bool {
        actor.can(Capability::ManageOptions)
    }

    /// Renders the full screen for `actor`.
    pub fn render(&self, actor: &Actor, outcome: ScreenOutcome) -> String {
        let title = escape_html(self.fields.screen_title());
        let mut page = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\" />\n<title>{}</title>\n</head>\n<body>\n<div class='wrap'>\n<div id=\"om4-header\">\n<h2>{}</h2>\n",
            title, title
        );

        if !self.can_access(actor) {
            page.push_str(
                "<div class=\"error\"><p>You do not have permission to access this feature.</p></div>\n",
            );
            page.push_str("</div>\n</div>\n</body>\n</html>\n");

            return page;
        }

        if let Some(notice) = self
            .fields
            .render_notice(outcome)
            .or_else(|| Self::generic_notice(outcome))
        {
            page.push_str(&notice);
        }

        page.push_str(&format!(
            "<form action=\"{}\" method=\"post\">\n",
            ADMIN_POST_PATH
        ));
        page.push_str(&self.fields.render_fields());
        page.push_str(&format!(
            "<input type=\"hidden\" name=\"action\" value=\"{}\" />\n",
            escape_html(self.fields.save_action())
        ));
        page.push_str(&format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\" />\n",
            NONCE_FIELD,
            self.gatekeeper
                .create_nonce(self.fields.save_action(), actor)
        ));
        page.push_str(&format!(
            "<p class=\"submit\"><input type=\"submit\" name=\"submit\" id=\"submit\" class=\"button-primary\" value=\"{}\"></p>\n",
            escape_html(self.fields.submit_label())
        ));
        page.push_str("</form>\n</div>\n</div>\n</body>\n</html>\n");

        page
    }

    fn generic_notice(outcome: ScreenOutcome) -> Option<String> {
        match outcome {
            ScreenOutcome::Idle => None,
            ScreenOutcome::Saved => Some(
                "<div id=\"message\" class=\"updated fade\"><p>Settings saved.</p></div>\n"
                    .to_string(),
            ),
            ScreenOutcome::SaveFailed => Some(
                "<div id=\"message\" class=\"error fade\"><p>There was an error saving your settings. Please try again.</p></div>\n"
                    .to_string(),
            ),
            ScreenOutcome::Denied => Some(
                "<div id=\"message\" class=\"error fade\"><p>Your changes were not saved: you do not have permission to do that, or the form expired. Please try again.</p></div>\n"
                    .to_string(),
            ),
        }
    }

    /// Checks capability and token, then saves. Nothing is mutated unless both checks pass.
    pub async fn handle_save(
        &self,
        actor: &Actor,
        form: &HashMap<String, String>,
    ) -> ScreenOutcome {
        if let Err(err) = self.check_access(actor, form) {
            tracing::warn!(
                "Rejected `{}` from user {}: {}",
                self.fields.save_action(),
                actor.id,
                err.get_message()
            );

            return ScreenOutcome::Denied;
        }

        match self.fields.save(form, actor).await {
            Ok(()) => ScreenOutcome::Saved,
            Err(err) => {
                tracing::warn!(
                    "Saving `{}` failed: {}",
                    self.fields.screen_name(),
                    err.get_message()
                );

                ScreenOutcome::SaveFailed
            }
        }
    }

    fn check_access(
        &self,
        actor: &Actor,
        form: &HashMap<String, String>,
    ) -> Result<(), CustomCssError> {
        self.gatekeeper.require(actor, Capability::ManageOptions)?;
        self.gatekeeper.check_admin_referer(
            form.get(NONCE_FIELD).map(String::as_str),
            self.fields.save_action(),
            actor,
        )
    }
}
