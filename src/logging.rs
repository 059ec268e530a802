//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over everything else. Otherwise each `-v` raises the level
/// one step above the configured filter. When logging to a file, the returned
/// guard must stay alive until exit or buffered lines are lost.
pub fn init(config: &LoggingConfig, verbose: u8) -> Result<Option<WorkerGuard>> {
  let default_filter = match verbose {
    0 => config
      .filter
      .clone()
      .unwrap_or_else(|| "cache_worker=info".to_string()),
    1 => "cache_worker=debug".to_string(),
    _ => "cache_worker=trace".to_string(),
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

  let (writer, guard) = match &config.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::never(dir, file_name);
      let (non_blocking, guard) = tracing_appender::non_blocking(appender);
      (BoxMakeWriter::new(non_blocking), Some(guard))
    }
    None => (BoxMakeWriter::new(std::io::stderr), None),
  };

  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(config.file.is_none())
    .with_target(false);

  let installed = if config.json {
    builder.json().try_init()
  } else {
    builder.try_init()
  };
  installed.map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
