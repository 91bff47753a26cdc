use std::{io, path::PathBuf, sync::Arc};

use chrono::Local;
use configatron::{Configatron, ConfigurationJson};
use error::{CustomCssError, ErrorAction, ErrorKind};
use hookway::NEW_SITE_INITIALISED;
use kickstartor::Kickstartor;
use lothlorien::Lothlorien;
use timekeeper::SystemTimekeeper;
use tracing::{level_filters::LevelFilter, Level};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{
    fmt::format::{DefaultFields, Format},
    FmtSubscriber,
};

mod configatron;
mod dashboard;
mod error;
mod gatekeeper;
mod hookway;
mod kickstartor;
mod lothlorien;
mod optionarium;
mod stylekeeper;
mod timekeeper;
mod uploadvault;
mod utils;

const CONFIG_FILE: &str = "customcss.config.json";

#[derive(Clone, PartialEq, Debug)]
pub enum CustomCssRuntimeKind {
    /// Serve the dashboard and the public site.
    Start,
    /// Fire the new-site lifecycle event once and exit.
    Init,
}

pub type CustomCssRuntimeResult<T> = io::Result<T>;
pub type CustomCssResult<T> = Result<T, CustomCssError>;

#[derive(Clone, PartialEq, Debug)]
pub struct CustomCssRuntime {
    runtime_mode: CustomCssRuntimeKind,
    current_dir: PathBuf,
    configatron: Configatron,
}

impl CustomCssRuntime {
    pub fn new(runtime_mode: CustomCssRuntimeKind, current_dir: PathBuf) -> Self {
        Self {
            runtime_mode,
            current_dir,
            configatron: Configatron::default(),
        }
    }

    pub async fn run(&mut self) -> CustomCssRuntimeResult<()> {
        let config_found = self.load_customcss_config()?;

        // The guard flushes the log file when dropped, so it lives as long as the runtime.
        let _guard = self.init_log_subscriber()?;

        if !config_found {
            tracing::warn!(
                "No {} found in {:?}, using the default configurations",
                CONFIG_FILE,
                self.current_dir
            );
        }

        match self.runtime_mode {
            CustomCssRuntimeKind::Start => self.start_server_mode().await,
            CustomCssRuntimeKind::Init => self.start_init_mode().await,
        }
    }

    async fn assemble_services(&self) -> CustomCssResult<Arc<Kickstartor>> {
        let services =
            Kickstartor::assemble(&self.configatron, &self.current_dir, Arc::new(SystemTimekeeper))
                .await?;

        Ok(Arc::new(services))
    }

    async fn start_server_mode(&mut self) -> CustomCssRuntimeResult<()> {
        let lothlorien = Lothlorien::new(&self.configatron.get_port());
        let listener = lothlorien.create_listener().await?;

        // Unset site and uploads URLs follow the port actually bound.
        self.configatron
            .resolve_local_addr(Lothlorien::local_addr(&listener)?);
        self.configatron.log_summary();

        let services = self.assemble_services().await?;

        lothlorien.serve(listener, services).await?;

        Ok(())
    }

    async fn start_init_mode(&mut self) -> CustomCssRuntimeResult<()> {
        self.configatron.log_summary();

        let services = self.assemble_services().await?;

        services.hookway.fire(NEW_SITE_INITIALISED).await?;

        tracing::info!(
            "New site initialised, stylesheet published at {}",
            services.stylekeeper.get_published_url()
        );
        println!(
            "Custom CSS stylesheet published at {}",
            services.stylekeeper.get_published_url()
        );

        Ok(())
    }

    /// Reads `customcss.config.json` from the working directory and returns whether it existed.
    /// A missing file keeps the defaults.
    ///
    /// Runs before the log subscriber exists, so it reports through its return value only.
    fn load_customcss_config(&mut self) -> CustomCssResult<bool> {
        let config_path = self.current_dir.join(CONFIG_FILE);

        let raw_config = match std::fs::read_to_string(&config_path) {
            Ok(raw_config) => raw_config,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.configatron = Configatron::default();

                return Ok(false);
            }
            Err(err) => {
                return Err(CustomCssError::raise_critical_runtime_error(
                    ErrorKind::ConfigFileReadError,
                    &format!("Failed to read {:?}: {}", config_path, err),
                    ErrorAction::Exit,
                ));
            }
        };

        let config_json: ConfigurationJson = serde_json::from_str(&raw_config).map_err(|err| {
            CustomCssError::raise_critical_runtime_error(
                ErrorKind::ConfigFileParsingError,
                &format!("Failed to parse {:?}: {}", config_path, err),
                ErrorAction::Fix,
            )
        })?;

        self.configatron = Configatron::from_json(config_json);

        Ok(true)
    }

    fn generate_log_filename(&self) -> String {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();

        format!("customcss_log_{}.log", timestamp)
    }

    fn generate_log_subscriber(
        &self,
    ) -> (
        FmtSubscriber<DefaultFields, Format, LevelFilter, NonBlocking>,
        WorkerGuard,
    ) {
        let file_name = self.generate_log_filename();
        let file_appender = rolling::never(
            self.current_dir.join(self.configatron.get_logs_dir()),
            file_name,
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::TRACE)
            .with_writer(non_blocking)
            .finish();

        (subscriber, guard)
    }

    fn init_log_subscriber(&self) -> CustomCssResult<WorkerGuard> {
        let (subscriber, guard) = self.generate_log_subscriber();

        tracing::subscriber::set_global_default(subscriber).map_err(|err| {
            CustomCssError::raise_critical_runtime_error(
                ErrorKind::TracingSubscriberInitializationFailed,
                &err.to_string(),
                ErrorAction::Exit,
            )
        })?;

        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use crate::{error::ErrorKind, CustomCssRuntime, CustomCssRuntimeKind};

    #[test]
    fn missing_config_file_keeps_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut runtime =
            CustomCssRuntime::new(CustomCssRuntimeKind::Start, temp_dir.path().to_path_buf());

        assert!(!runtime.load_customcss_config().unwrap());

        assert_eq!(runtime.configatron.get_site_url(), "http://127.0.0.1");
        assert_eq!(runtime.configatron.get_options_file(), "options.json");
    }

    #[test]
    fn config_file_is_loaded_from_the_working_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("customcss.config.json"),
            r#"{ "port": "8080", "siteUrl": "https://example.com/", "themeFamily": "woo" }"#,
        )
        .unwrap();

        let mut runtime =
            CustomCssRuntime::new(CustomCssRuntimeKind::Init, temp_dir.path().to_path_buf());
        assert!(runtime.load_customcss_config().unwrap());

        assert_eq!(runtime.configatron.get_port(), "8080");
        assert_eq!(runtime.configatron.get_site_url(), "https://example.com");
        assert_eq!(
            runtime.configatron.get_uploads_url(),
            "https://example.com/uploads"
        );
        assert_eq!(runtime.configatron.get_theme_family(), "woo");
    }

    #[test]
    fn malformed_config_file_is_a_parsing_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("customcss.config.json"), "{ nope").unwrap();

        let mut runtime =
            CustomCssRuntime::new(CustomCssRuntimeKind::Start, temp_dir.path().to_path_buf());
        let err = runtime.load_customcss_config().unwrap_err();

        assert_eq!(err.get_kind(), ErrorKind::ConfigFileParsingError);
        assert!(err.is_critical());
    }

    #[test]
    fn log_files_are_timestamped() {
        let runtime = CustomCssRuntime::new(CustomCssRuntimeKind::Start, std::env::temp_dir());
        let file_name = runtime.generate_log_filename();

        assert!(file_name.starts_with("customcss_log_"));
        assert!(file_name.ends_with(".log"));
    }
}
