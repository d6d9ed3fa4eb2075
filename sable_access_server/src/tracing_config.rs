use crate::config::*;
use tracing::Subscriber;
use tracing_core::LevelFilter;
use tracing_subscriber::{
    filter::{filter_fn, Targets},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

use std::{io::Error as IoError, path::Path};

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// The output layer for one log target, filtered to the events it accepts
fn target_layer<S>(entry: LogEntry, dir: &Path) -> Result<BoxedLayer<S>, IoError>
    where S: Subscriber + Send + Sync,
          for<'span> S: LookupSpan<'span>,
{
    let fmt = tracing_subscriber::fmt::layer();
    let layer = match &entry.target
    {
        LogTarget::File { filename } =>
        {
            std::fs::create_dir_all(dir)?;
            fmt.with_writer(tracing_appender::rolling::daily(dir, filename))
               .with_ansi(false)
               .boxed()
        }
        LogTarget::Builtin(BuiltinLogTarget::Stdout) => fmt.with_writer(std::io::stdout).with_ansi(entry.ansi).boxed(),
        LogTarget::Builtin(BuiltinLogTarget::Stderr) => fmt.with_writer(std::io::stderr).with_ansi(entry.ansi).boxed(),
    };

    Ok(layer.with_filter(filter_fn(move |metadata| entry.accepts(metadata))).boxed())
}

/// Build the subscriber described by a logging config: one layer per target,
/// under a global per-module filter.
pub fn build_subscriber(conf: LoggingConfig) -> Result<impl Subscriber, IoError>
{
    let layers = conf.targets
                     .into_iter()
                     .map(|entry| target_layer(entry, &conf.dir))
                     .collect::<Result<Vec<_>, _>>()?;

    // Default stays permissive; per-target filters do the rest
    let default_level = conf.default_level.map(LevelFilter::from).unwrap_or(LevelFilter::TRACE);
    let filter = Targets::new()
                    .with_default(default_level)
                    .with_targets(conf.module_levels.into_iter().map(|(module, level)| (module, LevelFilter::from(level))));

    Ok(tracing_subscriber::registry()
            .with(filter)
            .with(layers))
}
