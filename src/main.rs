use pulsewatch::batch_store::DirBatchStore;
use pulsewatch::clock::SystemClock;
use pulsewatch::config::EngineConfig;
use pulsewatch::indicator::SettingsIndicator;
use pulsewatch::recorder::{format_last_save, RecordingEngine, Status};
use pulsewatch::runtime::{self, EngineCommand};
use pulsewatch::sensor::SimulatedSensor;
use pulsewatch::settings::FileSettingsStore;
use pulsewatch::telemetry::LineTelemetry;
use std::process::ExitCode;
use std::time::Duration;

const USAGE: &str = "usage: pulsewatch [run [SECONDS] | status | start | stop | delete]";

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");

    let config = match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}; using defaults", e);
            EngineConfig::default()
        }
    };

    let data_dir = config.resolved_data_dir();
    log::info!("Data directory: {}", data_dir.display());

    let settings = FileSettingsStore::in_dir(&data_dir);
    let sensor = SimulatedSensor::new();
    let engine = RecordingEngine::new(
        config,
        settings.clone(),
        DirBatchStore::new(&data_dir),
        sensor.clone(),
        LineTelemetry::new(std::io::stdout()),
        SystemClock,
    )
    .with_indicator(SettingsIndicator::new(settings));

    let handle = match runtime::spawn(engine) {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        "status" => Ok(()),
        "start" => handle.set_recording(true),
        "stop" => handle.set_recording(false),
        "delete" => handle.delete_all_data().map(|erased| {
            println!("Deleted {} files", erased);
        }),
        "run" => {
            let seconds = match args.get(1).map(|s| s.parse::<u64>()) {
                None => 60,
                Some(Ok(seconds)) => seconds,
                Some(Err(_)) => {
                    eprintln!("{}", USAGE);
                    return ExitCode::FAILURE;
                }
            };
            let samples = handle.sample_sender();
            let feed = sensor.spawn_feed(Duration::from_secs(1), move |hr| {
                samples.send(EngineCommand::Sample(hr)).is_ok()
            });
            std::thread::sleep(Duration::from_secs(seconds));
            drop(feed);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let status = result.and_then(|_| handle.status());
    match status {
        Ok(status) => {
            print_status(&status);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_status(status: &Status) {
    eprintln!("Status:        {}", if status.is_recording { "Recording" } else { "Stopped" });
    eprintln!("Data Files:    {} files", status.file_count);
    eprintln!("Storage Used:  {} KB", status.size_kb_text());
    eprintln!("Last Save:     {}", format_last_save(status.last_save));
    eprintln!("Total Records: {}", status.total_recordings);
    eprintln!("Buffer:        {} readings", status.buffer_size);
    if status.health.flush_failures > 0 {
        eprintln!("Flush errors:  {}", status.health.flush_failures);
    }
}
