use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::accumulator::{EventAccumulator, WarningSummary};
use super::channel_map::ChannelMap;
use super::config::Config;
use super::delay::{DelayCorrection, DelayCorrector, DelayTable};
use super::error::ProcessorError;
use super::event_file::EventFile;
use super::peak::{PeakExtractor, PeakTable};
use super::report::CalibrationReport;
use super::time_store::TimeDistributionStore;
use super::worker_status::WorkerStatus;

/// Everything a calibration pass produces
#[derive(Debug)]
pub struct CalibrationOutput {
    pub store: TimeDistributionStore,
    pub summary: WarningSummary,
    pub peaks: PeakTable,
    pub correction: DelayCorrection,
    pub report: CalibrationReport,
}

/// Stream one run file through the accumulator.
pub fn process_run(
    config: &Config,
    run_number: i32,
    accumulator: &mut EventAccumulator,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<(), ProcessorError> {
    let run_path = config.get_run_file(run_number);
    let mut run_file = EventFile::open(&run_path)?;
    let total_data_size = run_path.metadata()?.len();
    spdlog::info!(
        "Run {} size: {}",
        run_number,
        human_bytes::human_bytes(total_data_size as f64)
    );

    let flush_frac: f32 = 0.01;
    let flush_val = (total_data_size as f64 * flush_frac as f64) as u64;
    let mut last_flush: u64 = 0;
    let mut progress: f32 = 0.0;
    let counts_before = accumulator.store().trigger_counts().to_vec();

    accumulator.begin_run(run_number);
    tx.send(WorkerStatus::new(0.0, run_number, *worker_id))?;
    while let Some(event) = run_file.get_next_event()? {
        accumulator.process_event(&event);
        if run_file.bytes_read() - last_flush > flush_val {
            last_flush = run_file.bytes_read();
            progress = (last_flush as f64 / total_data_size as f64) as f32;
            tx.send(WorkerStatus::new(progress, run_number, *worker_id))?;
        }
    }
    if progress < 1.0 {
        tx.send(WorkerStatus::new(1.0, run_number, *worker_id))?;
    }

    spdlog::info!(
        "Run {} had {} events",
        run_number,
        run_file.events_read()
    );
    for (trigger, (after, before)) in accumulator
        .store()
        .trigger_counts()
        .iter()
        .zip(counts_before.iter())
        .enumerate()
    {
        let name = config
            .triggers
            .get(trigger)
            .map(|t| t.name.as_str())
            .unwrap_or("?");
        spdlog::info!("Total\t{}\t{} trigger in run {}", after - before, name, run_number);
    }
    Ok(())
}

/// Process a subset of runs with a private accumulator, returning its store and summary
pub fn process_subset(
    config: Config,
    channel_map: Arc<ChannelMap>,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<i32>,
) -> Result<(TimeDistributionStore, WarningSummary), ProcessorError> {
    let mut accumulator =
        EventAccumulator::new(channel_map, config.n_triggers(), &config.calibration);
    for run in subset {
        if config.does_run_exist(run) {
            spdlog::info!("Processing run {}...", run);
            process_run(&config, run, &mut accumulator, &tx, &worker_id)?;
            spdlog::info!("Finished processing run {}.", run);
        } else {
            spdlog::info!("Run {} does not exist, skipping...", run);
        }
    }
    Ok(accumulator.finish())
}

/// Divide the run list in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<i32>> {
    let n_subsets = config.n_threads.max(1) as usize;
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); n_subsets];

    for (idx, run) in config.run_numbers.iter().enumerate() {
        subsets[idx % n_subsets].push(*run)
    }

    subsets
}

/// Run the accumulation phase on all runs, one worker per non-empty subset, and merge the
/// results. Only returns once every worker is done.
pub fn accumulate(
    config: &Config,
    channel_map: Arc<ChannelMap>,
    tx: &Sender<WorkerStatus>,
) -> Result<(TimeDistributionStore, WarningSummary), ProcessorError> {
    let mut workers = Vec::new();
    for (idx, subset) in create_subsets(config).into_iter().enumerate() {
        // Dont make empty workers
        if subset.is_empty() {
            continue;
        }
        let conf = config.clone();
        let map = channel_map.clone();
        let tx = tx.clone();
        workers.push((
            idx,
            std::thread::spawn(move || process_subset(conf, map, tx, idx, subset)),
        ));
    }

    let mut store =
        TimeDistributionStore::new(config.n_triggers(), config.n_boards(), &config.calibration);
    let mut summary = WarningSummary::default();
    let mut first_error: Option<ProcessorError> = None;
    for (idx, handle) in workers {
        match handle.join() {
            Ok(Ok((worker_store, worker_summary))) => {
                store.merge(&worker_store)?;
                summary.merge(&worker_summary);
            }
            Ok(Err(e)) => {
                spdlog::error!("Worker {} failed: {}", idx, e);
                first_error.get_or_insert(e);
            }
            Err(_) => {
                spdlog::error!("Worker {} panicked", idx);
                first_error.get_or_insert(ProcessorError::JoinError(idx));
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    spdlog::info!(
        "Accumulated {} of {} events; {} non-physics, {} rejected, {} bad hits in {} events",
        summary.events_accumulated,
        summary.events_seen,
        summary.non_physics_events,
        summary.rejected_events,
        summary.bad_hits,
        summary.events_with_bad_hits
    );
    Ok((store, summary))
}

/// Read the previous delay table of every board
pub fn read_delay_tables(config: &Config) -> Result<Vec<DelayTable>, ProcessorError> {
    let mut tables = Vec::with_capacity(config.n_boards());
    for (board, info) in config.boards.iter().enumerate() {
        tables.push(DelayTable::read(board, &info.delay_path)?);
    }
    Ok(tables)
}

/// Peak extraction and delay correction on a fully merged store
pub fn calibrate(
    config: &Config,
    channel_map: &ChannelMap,
    store: TimeDistributionStore,
    summary: WarningSummary,
    old_delays: &[DelayTable],
) -> Result<CalibrationOutput, ProcessorError> {
    let extractor = PeakExtractor::new(&config.calibration);
    spdlog::info!("Extracting peaks with {:?}", extractor);
    let peaks = extractor.extract(&store, channel_map);
    for trigger in config.calibration.eligible_triggers.iter() {
        spdlog::info!(
            "Trigger {} has {} channels with a peak",
            config.triggers[*trigger].name,
            peaks.n_measured(*trigger)
        );
    }

    let correction = DelayCorrector::new(&config.calibration).correct(&peaks, old_delays)?;
    let report = CalibrationReport::new(
        config,
        &format!("{:?}", config.calibration.peak_estimator),
        channel_map,
        &store,
        &summary,
        &peaks,
        &correction.entries,
    )?;

    Ok(CalibrationOutput {
        store,
        summary,
        peaks,
        correction,
        report,
    })
}

/// Write the new delay files and the report, returning the paths written
pub fn write_outputs(
    config: &Config,
    output: &CalibrationOutput,
) -> Result<Vec<PathBuf>, ProcessorError> {
    let mut written = Vec::new();
    for table in output.correction.tables.iter() {
        let path = config.get_delay_output_file(table.board)?;
        table.write(&path)?;
        written.push(path);
    }
    let report_path = config.get_report_file()?;
    output.report.write(&report_path)?;
    written.push(report_path);
    Ok(written)
}

/// The main entry point: build the channel map, accumulate every run, extract peaks and
/// write the new delays.
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<CalibrationOutput, ProcessorError> {
    config.validate()?;
    let channel_map = Arc::new(ChannelMap::new(
        &config.boards,
        config.calibration.n_channels,
    )?);
    spdlog::info!(
        "Loaded channel map with {} boards of {} channels",
        channel_map.n_boards(),
        channel_map.n_channels()
    );
    for (board, entry) in channel_map.iter() {
        spdlog::debug!(
            "board {} (0x{}) ch {} {} station {} disc {} ({}) port {} vhdl {}",
            board,
            entry.board_id,
            entry.channel_id,
            entry.display_name,
            entry.station_id,
            entry.discriminator_id,
            entry.discriminator_name(),
            entry.port_name,
            entry.vhdl_name
        );
    }
    // Fail before spending time on the runs if the old delays are unusable
    let old_delays = read_delay_tables(&config)?;

    let (store, summary) = accumulate(&config, channel_map.clone(), &tx)?;
    let output = calibrate(&config, &channel_map, store, summary, &old_delays)?;
    for path in write_outputs(&config, &output)? {
        spdlog::info!("Wrote {}", path.to_string_lossy());
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::tests::hit;
    use crate::channel_map::tests::make_source;
    use crate::event::RawEvent;
    use crate::event_file::EventWriter;
    use std::sync::mpsc;

    /// Lay out a complete calibration input set in a scratch directory
    fn make_workspace(name: &str, runs: &[i32]) -> Config {
        let root = std::env::temp_dir().join(format!(
            "hodo_timecal_{}_{}",
            name,
            std::process::id()
        ));
        let data = root.join("data");
        let output = root.join("out");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::create_dir_all(&output).unwrap();

        let mut config = Config::default();
        config.data_path = data;
        config.output_path = output;
        config.output_tag = String::from("test");
        config.run_numbers = runs.to_vec();
        for (idx, board) in config.boards.iter_mut().enumerate() {
            board.mapping_path = root.join(format!("map_{idx}.txt"));
            board.delay_path = root.join(format!("time_{idx}.txt"));
            std::fs::write(&board.mapping_path, make_source(96)).unwrap();
            let delays: String = (0..96).map(|ch| format!("{ch}:f64\n")).collect();
            std::fs::write(&board.delay_path, delays).unwrap();
        }
        config
    }

    fn write_run(config: &Config, run: i32, tdc: u32) {
        let mut writer = EventWriter::create(&config.get_run_file(run)).unwrap();
        for id in 0..20 {
            let event = RawEvent::new(
                id,
                14,
                1 << 5,
                vec![hit(0x420, 3, tdc), hit(0x430, 70, tdc + 2), hit(0x420, 500, 600)],
            );
            writer.write_event(&event).unwrap();
        }
        writer.write_event(&RawEvent::new(99, 3, 1 << 5, vec![hit(0x420, 3, 510)])).unwrap();
        writer.flush().unwrap();
    }

    #[test]
    fn test_create_subsets() {
        let mut config = Config::default();
        config.run_numbers = vec![10, 11, 12, 13, 14];
        config.n_threads = 2;
        assert_eq!(create_subsets(&config), vec![vec![10, 12, 14], vec![11, 13]]);
        config.n_threads = 8;
        let subsets = create_subsets(&config);
        assert_eq!(subsets.iter().filter(|s| !s.is_empty()).count(), 5);
    }

    #[test]
    fn test_full_pass() {
        let mut config = make_workspace("full", &[1, 2, 3]);
        config.n_threads = 2;
        write_run(&config, 1, 640);
        write_run(&config, 2, 640);
        // run 3 is missing and skipped

        let (tx, rx) = mpsc::channel();
        let output = process(config.clone(), tx).unwrap();
        assert!(rx.try_iter().count() > 0);

        assert_eq!(output.store.trigger_count(5), 40);
        assert_eq!(output.summary.bad_hits, 40);
        assert_eq!(output.summary.non_physics_events, 2);
        assert_eq!(output.peaks.get(5, 0, 3).time(), Some(640.5));
        // 640 - 650 + 100 and 642 - 650 + 100
        assert_eq!(output.correction.tables[0].get(3), Some(90));
        assert_eq!(output.correction.tables[1].get(70), Some(92));
        assert_eq!(output.correction.tables[2].get(70), Some(100));

        let written = std::fs::read_to_string(config.get_delay_output_file(0).unwrap()).unwrap();
        assert!(written.starts_with("0:f64\n1:f64\n2:f64\n3:f5a\n"));
        assert!(config.get_report_file().unwrap().exists());
    }

    #[test]
    fn test_threads_do_not_change_result() {
        let config = make_workspace("threads", &[1, 2, 3, 4]);
        for (run, tdc) in [(1, 600), (2, 610), (3, 620), (4, 610)] {
            write_run(&config, run, tdc);
        }
        let map = Arc::new(ChannelMap::new(&config.boards, 96).unwrap());
        let (tx, _rx) = mpsc::channel();

        let mut single = config.clone();
        single.n_threads = 1;
        let (store_single, summary_single) = accumulate(&single, map.clone(), &tx).unwrap();

        let mut parallel = config.clone();
        parallel.n_threads = 3;
        let (store_parallel, summary_parallel) = accumulate(&parallel, map, &tx).unwrap();

        assert_eq!(store_single, store_parallel);
        assert_eq!(summary_single.bad_hits, summary_parallel.bad_hits);
        assert_eq!(
            store_single.time_histogram(5, 0, 3).mode_bin_center(),
            Some(610.5)
        );
    }

    #[test]
    fn test_truncated_delay_table_aborts() {
        let config = make_workspace("truncated", &[1]);
        write_run(&config, 1, 640);
        let short: String = (0..50).map(|ch| format!("{ch}:f64\n")).collect();
        std::fs::write(&config.boards[3].delay_path, short).unwrap();
        let (tx, _rx) = mpsc::channel();
        assert!(matches!(
            process(config, tx),
            Err(ProcessorError::DelayError(_))
        ));
    }
}
