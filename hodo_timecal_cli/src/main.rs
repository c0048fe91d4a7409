//! # hodo_timecal_cli
//!
//! Part of the hodo_timecal crate family.
//!
//! This is the command line application to calibrate the hodoscope channel delays.
//!
//! ## Install
//!
//! Use `cargo install --path ./hodo_timecal_cli`
//!
//! ## Use
//!
//! Make a template configuration and edit it
//!
//! ```bash
//! hodo_timecal_cli new -p config.yml
//! ```
//!
//! then run the calibration
//!
//! ```bash
//! hodo_timecal_cli -p config.yml
//! ```
//!
//! A log file `hodo_timecal.log` is written to the working directory. While the progress
//! bars are shown, log messages only go to the file.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use spdlog::Logger;

use libhodo_timecal::config::Config;
use libhodo_timecal::error::ConfigError;
use libhodo_timecal::process::process;
use libhodo_timecal::worker_status::WorkerStatus;

fn make_template_config(path: &Path) -> Result<(), ConfigError> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

/// Build the terminal + file logger and the file only logger used while progress bars are drawn
fn make_loggers(log_path: &Path) -> Result<(Arc<Logger>, Arc<Logger>), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(log_path)
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let term_sink = Arc::new(
        spdlog::sink::StdStreamSink::builder()
            .std_stream(spdlog::sink::StdStream::Stderr)
            .build()?,
    );
    let logger = Arc::new(
        Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink.clone())
            .sink(term_sink)
            .build()?,
    );
    let file_logger = Arc::new(
        Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    Ok((logger, file_logger))
}

fn cli() -> Command {
    Command::new("hodo_timecal_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .global(true)
                .help("Path to the configuration file"),
        )
}

fn main() {
    // Create a cli
    let matches = cli().get_matches();

    // Initialize feedback
    let (logger, file_logger) = match make_loggers(Path::new("./hodo_timecal.log")) {
        Ok(loggers) => loggers,
        Err(e) => {
            eprintln!("Could not create logging: {e}");
            return;
        }
    };
    spdlog::set_default_logger(logger.clone());

    // Parse the cli
    let path_arg = match matches.subcommand() {
        Some((_, sub_matches)) => sub_matches.get_one::<String>("path"),
        None => matches.get_one::<String>("path"),
    };
    let config_path = match path_arg {
        Some(p) => PathBuf::from(p),
        None => {
            spdlog::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        spdlog::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => spdlog::info!("Done."),
            Err(e) => spdlog::error!("{e}"),
        }
        return;
    }

    // Load our config
    spdlog::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            spdlog::error!("{e}");
            return;
        }
    };
    if !config.is_n_threads_valid() {
        spdlog::error!("Number of threads must be at least 1, found {}", config.n_threads);
        return;
    }
    spdlog::info!("Config successfully loaded.");
    spdlog::info!("Data Path: {}", config.data_path.to_string_lossy());
    spdlog::info!("Output Path: {}", config.output_path.to_string_lossy());
    spdlog::info!("Output Tag: {}", config.output_tag);
    spdlog::info!("Runs: {}", config.run_label());
    for (idx, board) in config.boards.iter().enumerate() {
        spdlog::info!(
            "Board {} (0x{}, {}) Map: {} Delays: {}",
            idx,
            board.id,
            board.label,
            board.mapping_path.to_string_lossy(),
            board.delay_path.to_string_lossy()
        );
    }

    // Setup the progress bars, one per worker
    let pb_manager = MultiProgress::new();
    let style = ProgressStyle::with_template("[{bar:40}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bars: Vec<ProgressBar> = (0..config.n_threads.max(1))
        .map(|idx| {
            let bar = pb_manager.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar.set_message(format!("Worker {idx}: waiting"));
            bar
        })
        .collect();

    // The bars own the terminal until the work is done
    if let Err(e) = pb_manager.println("Progress details are written to hodo_timecal.log") {
        spdlog::warn!("Could not write to the terminal: {e}");
    }
    spdlog::set_default_logger(file_logger);

    let (tx, rx) = mpsc::channel::<WorkerStatus>();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, tx));

    loop {
        while let Ok(status) = rx.recv_timeout(Duration::from_millis(250)) {
            if let Some(bar) = bars.get(status.worker_id) {
                bar.set_position((status.progress * 100.0) as u64);
                bar.set_message(format!(
                    "Worker {}: run {}",
                    status.worker_id, status.run_number
                ));
            }
        }

        if handle.is_finished() {
            for bar in bars.iter() {
                bar.finish();
            }
            spdlog::set_default_logger(logger.clone());
            match handle.join() {
                Ok(result) => match result {
                    Ok(output) => spdlog::info!(
                        "Successfully calibrated {} channels!",
                        output.correction.entries.len()
                    ),
                    Err(e) => spdlog::error!("Calibration failed with error: {e}"),
                },
                Err(_) => spdlog::error!("Failed to join calibration task!"),
            }
            break;
        }
    }

    spdlog::info!("Done.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_accepts_path() {
        let matches = cli()
            .try_get_matches_from(["hodo_timecal_cli", "new", "-p", "config.yml"])
            .unwrap();
        let (name, sub_matches) = matches.subcommand().unwrap();
        assert_eq!(name, "new");
        assert_eq!(
            sub_matches.get_one::<String>("path").map(String::as_str),
            Some("config.yml")
        );

        let matches = cli()
            .try_get_matches_from(["hodo_timecal_cli", "-p", "config.yml"])
            .unwrap();
        assert!(matches.subcommand().is_none());
        assert_eq!(
            matches.get_one::<String>("path").map(String::as_str),
            Some("config.yml")
        );
    }

    #[test]
    fn test_loggers() {
        let dir = std::env::temp_dir().join(format!("hodo_timecal_cli_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let (logger, file_logger) = make_loggers(&dir.join("test.log")).unwrap();
        assert_eq!(logger.sinks().len(), 2);
        // Nothing but the file while bars are drawn
        assert_eq!(file_logger.sinks().len(), 1);
    }
}
