use std::{path::Path, sync::Arc};

use crate::{
    configatron::Configatron,
    dashboard::{customcss::CustomCssScreen, Dashboard},
    gatekeeper::Gatekeeper,
    hookway::{Hookway, ThemeFamily},
    optionarium::Optionarium,
    stylekeeper::Stylekeeper,
    timekeeper::Timekeeper,
    uploadvault::UploadVault,
    CustomCssResult,
};

/// Every service of a running site, constructed once and shared by reference.
#[derive(Debug)]
pub struct Kickstartor {
    pub optionarium: Arc<Optionarium>,
    pub uploadvault: Arc<UploadVault>,
    pub gatekeeper: Arc<Gatekeeper>,
    pub stylekeeper: Arc<Stylekeeper>,
    pub hookway: Hookway,
    pub dashboard: Dashboard<CustomCssScreen>,
    pub site_url: String,
}

impl Kickstartor {
    /// Wires the services together. Relative paths in `configatron` resolve against `current_dir`.
    pub async fn assemble(
        configatron: &Configatron,
        current_dir: &Path,
        timekeeper: Arc<dyn Timekeeper>,
    ) -> CustomCssResult<Self> {
        tracing::info!("Assembling Custom CSS services from {:?}", current_dir);

        let optionarium = Arc::new(
            Optionarium::load(current_dir.join(configatron.get_options_file())).await?,
        );

        let uploadvault = Arc::new(UploadVault::new(
            current_dir.join(configatron.get_uploads_dir()),
            &configatron.get_uploads_url(),
            configatron.get_use_year_month_folders(),
            timekeeper.clone(),
        ));

        let gatekeeper = Arc::new(
            Gatekeeper::new(
                &optionarium,
                configatron.get_users(),
                configatron.get_nonce_lifetime(),
                timekeeper.clone(),
            )
            .await?,
        );

        let stylekeeper = Arc::new(
            Stylekeeper::new(optionarium.clone(), uploadvault.clone(), timekeeper).await?,
        );

        let hookway = Hookway::new(
            stylekeeper.clone(),
            ThemeFamily::from_name(&configatron.get_theme_family()),
        );

        let site_url = configatron.get_site_url();
        let dashboard = Dashboard::new(
            CustomCssScreen::new(stylekeeper.clone(), &site_url),
            gatekeeper.clone(),
        );

        Ok(Self {
            optionarium,
            uploadvault,
            gatekeeper,
            stylekeeper,
            hookway,
            dashboard,
            site_url,
        })
    }
}
