use std::{env, io};

use customcss::{CustomCssRuntime, CustomCssRuntimeKind, CustomCssRuntimeResult};

/// Entry point of the Custom CSS service.
///
/// `start` serves the dashboard and the public site; `init` publishes the initial stylesheet of a
/// new site and exits.
#[tokio::main]
async fn main() -> CustomCssRuntimeResult<()> {
    let mut args = env::args();

    // Skip the program name.
    args.next();

    let runtime_mode = match args.next().as_deref() {
        Some("start") => CustomCssRuntimeKind::Start,
        Some("init") => CustomCssRuntimeKind::Init,
        _ => {
            eprintln!("Usage: customcss <mode>\nAvailable modes: 'start' or 'init'");

            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Invalid Custom CSS mode!",
            ));
        }
    };

    let current_dir = env::current_dir()?;
    let mut runtime = CustomCssRuntime::new(runtime_mode, current_dir);

    runtime.run().await
}
