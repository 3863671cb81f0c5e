use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::Path,
    sync::Mutex,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// HTTP stack internals stay quiet unless asked for explicitly.
const QUIET_DIRECTIVES: &[&str] = &["hyper=warn", "hyper_util=warn", "reqwest=warn"];

pub fn init(level: &str, debug: bool, file: Option<&Path>) -> Result<()> {
    let mut filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .with_context(|| format!("Invalid log level '{level}'"))?
    };
    for directive in QUIET_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }

    let file_layer = match file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(debug)
                .with_file(debug)
                .with_line_number(debug),
        )
        .with(file_layer)
        .try_init()?;

    Ok(())
}
