use std::sync::Arc;

use indexmap::IndexMap;

use crate::{stylekeeper::Stylekeeper, CustomCssResult};

/// Generic head hook every theme fires while rendering `<head>`.
pub const WP_HEAD: &str = "wp_head";
/// Head hook fired last by the OM4 theme family.
pub const OM4_THEME_END_HEAD: &str = "om4_theme_end_head";
/// Head hook fired by the WooThemes family.
pub const WOO_HEAD: &str = "woo_head";
/// Lifecycle event fired once a new site exists.
pub const NEW_SITE_INITIALISED: &str = "om4_new_site_initialised";

/// Runs after anything else registered on the head hook so custom rules win the cascade.
const LATE_PRIORITY: i32 = 100_000;
const DEFAULT_PRIORITY: i32 = 10;

/// Theme families that expose their own head hook.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThemeFamily {
    Om4,
    Woo,
    Generic,
}

impl ThemeFamily {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "om4" => ThemeFamily::Om4,
            "woo" | "woothemes" => ThemeFamily::Woo,
            _ => ThemeFamily::Generic,
        }
    }

    /// The head hook the stylesheet link is attached to, in order of preference per family.
    pub fn head_hook(&self) -> &'static str {
        match self {
            ThemeFamily::Om4 => OM4_THEME_END_HEAD,
            ThemeFamily::Woo => WOO_HEAD,
            ThemeFamily::Generic => WP_HEAD,
        }
    }
}

/// Everything a hook can trigger.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HookHandler {
    /// Emits the `<link>` tag of the published stylesheet.
    OutputCustomCssStylesheet,
    /// Publishes the current CSS so a new site starts with a stylesheet.
    PublishInitialStylesheet,
}

/// Hook name to handlers, built once at startup.
#[derive(Debug)]
pub struct Hookway {
    table: IndexMap<String, Vec<(i32, HookHandler)>>,
    theme_family: ThemeFamily,
    stylekeeper: Arc<Stylekeeper>,
}

impl Hookway {
    pub fn new(stylekeeper: Arc<Stylekeeper>, theme_family: ThemeFamily) -> Self {
        let mut hookway = Self {
            table: IndexMap::new(),
            theme_family,
            stylekeeper,
        };

        hookway.register(
            theme_family.head_hook(),
            LATE_PRIORITY,
            HookHandler::OutputCustomCssStylesheet,
        );
        hookway.register(
            NEW_SITE_INITIALISED,
            DEFAULT_PRIORITY,
            HookHandler::PublishInitialStylesheet,
        );

        tracing::info!(
            "Hook table built for {:?} themes: {:?}",
            theme_family,
            hookway.table.keys().collect::<Vec<_>>()
        );

        hookway
    }

    fn register(&mut self, hook: &str, priority: i32, handler: HookHandler) {
        let handlers = self.table.entry(hook.to_string()).or_default();

        handlers.push((priority, handler));
        // Stable sort keeps registration order among equal priorities.
        handlers.sort_by_key(|(priority, _)| *priority);
    }

    pub fn theme_family(&self) -> ThemeFamily {
        self.theme_family
    }

    pub fn head_hook(&self) -> &'static str {
        self.theme_family.head_hook()
    }

    /// Handlers for `hook`, in the order they run.
    pub fn handlers(&self, hook: &str) -> Vec<HookHandler> {
        self.table
            .get(hook)
            .map(|handlers| handlers.iter().map(|(_, handler)| *handler).collect())
            .unwrap_or_default()
    }

    /// Runs every handler on `hook` and returns their concatenated output.
    /// Unknown hooks produce nothing.
    pub async fn fire(&self, hook: &str) -> CustomCssResult<String> {
        let mut output = String::new();

        for handler in self.handlers(hook) {
            tracing::debug!("Running {:?} for hook `{}`", handler, hook);

            match handler {
                HookHandler::OutputCustomCssStylesheet => {
                    output.push_str(&self.stylekeeper.render_stylesheet_link());
                }
                HookHandler::PublishInitialStylesheet => {
                    self.stylekeeper.new_site_initialised().await?;
                }
            }
        }

        Ok(output)
    }

    /// Output of the active theme's head hook.
    pub async fn render_head(&self) -> CustomCssResult<String> {
        self.fire(self.head_hook()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        hookway::{
            HookHandler, Hookway, ThemeFamily, NEW_SITE_INITIALISED, OM4_THEME_END_HEAD,
            WOO_HEAD, WP_HEAD,
        },
        optionarium::Optionarium,
        stylekeeper::Stylekeeper,
        timekeeper::FrozenTimekeeper,
        uploadvault::UploadVault,
    };

    async fn stylekeeper(root: &std::path::Path) -> Arc<Stylekeeper> {
        let clock = Arc::new(FrozenTimekeeper::at_unix(1_329_690_974));
        let uploadvault = Arc::new(UploadVault::new(
            root.to_path_buf(),
            "http://example.com/uploads",
            false,
            clock.clone(),
        ));

        Arc::new(
            Stylekeeper::new(Arc::new(Optionarium::in_memory()), uploadvault, clock)
                .await
                .unwrap(),
        )
    }

    #[test]
    fn theme_family_selects_the_head_hook() {
        assert_eq!(ThemeFamily::from_name("om4").head_hook(), OM4_THEME_END_HEAD);
        assert_eq!(ThemeFamily::from_name("WooThemes").head_hook(), WOO_HEAD);
        assert_eq!(ThemeFamily::from_name("twentytwelve").head_hook(), WP_HEAD);
    }

    #[tokio::test]
    async fn stylesheet_is_attached_to_one_head_hook_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let hookway = Hookway::new(stylekeeper(temp_dir.path()).await, ThemeFamily::Woo);

        assert_eq!(
            hookway.handlers(WOO_HEAD),
            vec![HookHandler::OutputCustomCssStylesheet]
        );
        assert!(hookway.handlers(WP_HEAD).is_empty());
        assert!(hookway.handlers(OM4_THEME_END_HEAD).is_empty());
    }

    #[tokio::test]
    async fn head_is_empty_until_published() {
        let temp_dir = tempfile::tempdir().unwrap();
        let hookway = Hookway::new(stylekeeper(temp_dir.path()).await, ThemeFamily::Generic);

        assert_eq!(hookway.render_head().await.unwrap(), "");
        assert_eq!(hookway.fire("unknown_hook").await.unwrap(), "");

        hookway.fire(NEW_SITE_INITIALISED).await.unwrap();

        let head = hookway.render_head().await.unwrap();
        assert!(head.contains(
            "<link rel=\"stylesheet\" href=\"http://example.com/uploads/custom-1329690974.css\""
        ));
    }
}
