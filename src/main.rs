mod app;
mod dicom;
mod launch;
mod loader;
mod presets;
mod renderer;
mod scan;
mod series;
mod settings;
#[cfg(test)]
mod testing;
mod view;
mod viewer;
mod windowing;

use clap::Parser;

use crate::app::{DicomScopeApp, Startup, APP_TITLE};
use crate::launch::{resolve_launch_request, Cli};
use crate::settings::Settings;

const DIRECTORY_ENV: &str = "DICOMSCOPE_DIR";

fn main() -> eframe::Result<()> {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .try_init();

    let cli = Cli::parse();
    let settings = Settings::load();

    let (launch, status) = match resolve_launch_request(&cli) {
        Ok(request) => (request, None),
        Err(err) => {
            log::warn!("Launch argument error: {err}");
            (None, Some(format!("Launch URL/args error: {err}")))
        }
    };
    let initial_directory = app::initial_directory(std::env::var_os(DIRECTORY_ENV), &settings);

    let startup = Startup {
        launch,
        initial_directory,
        keep_view: cli.keep_view,
        status,
    };

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title(APP_TITLE)
            .with_inner_size([1280.0, 820.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        APP_TITLE,
        native_options,
        Box::new(move |_cc| Ok(Box::new(DicomScopeApp::new(settings, startup)))),
    )
}
