use std::{collections::HashMap, sync::Arc};

use crate::{
    dashboard::{ScreenFields, ScreenOutcome},
    gatekeeper::Actor,
    stylekeeper::Stylekeeper,
    utils::escape_html::escape_html,
    CustomCssResult,
};

pub const UPDATE_CUSTOM_CSS_ACTION: &str = "update_custom_css";

/// Textarea height of the CSS editor.
const EDITOR_ROWS: usize = 30;

/// Fields of the "Custom CSS" settings screen.
#[derive(Debug)]
pub struct CustomCssScreen {
    stylekeeper: Arc<Stylekeeper>,
    site_url: String,
}

impl CustomCssScreen {
    pub fn new(stylekeeper: Arc<Stylekeeper>, site_url: &str) -> Self {
        Self {
            stylekeeper,
            site_url: site_url.to_string(),
        }
    }

    fn validate_css_button(&self) -> String {
        format!(
            "<a class=\"button-secondary\" href=\"{}\" target=\"_blank\" rel=\"noopener\" title=\"W3C CSS Validation Results\" style=\"margin-left: 3em;\">Validate CSS Rules</a>",
            escape_html(&self.stylekeeper.validate_css_url())
        )
    }

    fn validate_css_link(&self, anchor: &str) -> String {
        format!(
            "<a href=\"{}\" target=\"_blank\" rel=\"noopener\" title=\"W3C CSS Validation Results\">{}</a>",
            escape_html(&self.stylekeeper.validate_css_url()),
            escape_html(anchor)
        )
    }
}

impl ScreenFields for CustomCssScreen {
    fn screen_title(&self) -> &str {
        "Custom CSS"
    }

    fn screen_name(&self) -> &str {
        "customcss"
    }

    fn save_action(&self) -> &str {
        UPDATE_CUSTOM_CSS_ACTION
    }

    fn submit_label(&self) -> &str {
        "Save CSS Rules"
    }

    fn render_notice(&self, outcome: ScreenOutcome) -> Option<String> {
        match outcome {
            ScreenOutcome::Saved => Some(format!(
                "<div id=\"message\" class=\"updated fade\"><p>Custom CSS rules saved. You can <a href=\"{}\">view your site by clicking here</a>.</p></div>\n\
                 <div id=\"message\" class=\"updated fade\"><p>It is recommended that you {} to help you find errors, typos and incorrect uses of CSS.</p></div>\n",
                escape_html(&self.site_url),
                self.validate_css_link("validate your CSS rules")
            )),
            ScreenOutcome::SaveFailed => Some(
                "<div id=\"message\" class=\"error fade\"><p>There was an error saving your Custom CSS rules. Please try again.</p></div>\n"
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn render_fields(&self) -> String {
        format!(
            "<div style=\"float: right;\">{}</div>\n\
             <p>To use <strong>Custom CSS</strong> rules to change the appearance of your site, enter them in this text box. \
             Custom CSS rules will override your theme's CSS using the inheritance rules of CSS.<br />\n\
             Rules must have a selector followed by rules in curly braces, for example <code>.mystyle {{ color: blue; }}</code><br />\n\
             Make sure you close all curly brace pairs to avoid errors.</p>\n\
             <div style=\"clear: both;\"></div>\n\
             <textarea name=\"css\" id=\"css\" rows=\"{}\" style=\"width: 100%; font-family: monospace;\">{}</textarea>\n",
            self.validate_css_button(),
            EDITOR_ROWS,
            escape_html(&self.stylekeeper.get_css())
        )
    }

    async fn save(&self, form: &HashMap<String, String>, actor: &Actor) -> CustomCssResult<()> {
        let css = form.get("css").map(String::as_str).unwrap_or_default();

        self.stylekeeper.save(css, actor).await.map(|_| ())
    }
}
