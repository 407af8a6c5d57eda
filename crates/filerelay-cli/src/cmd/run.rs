use crate::output::{print_cycle, print_json};
use anyhow::Context;
use filerelay_core::client::HttpDeliveryClient;
use filerelay_core::config::Config;
use filerelay_core::engine::{Engine, ThreadSleeper};
use filerelay_core::io::ensure_dir;
use filerelay_core::schedule::Scheduler;
use filerelay_core::store::FileStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn run(config: &Config, once: bool, max_cycles: Option<u64>, json: bool) -> anyhow::Result<()> {
    config.ensure_valid().context("refusing to start")?;

    let directory = &config.directory_path;
    if ensure_dir(directory)
        .with_context(|| format!("failed to create input directory {}", directory.display()))?
    {
        tracing::info!(directory = %directory.display(), "created input directory");
    }

    let store = FileStore::open(&config.processed_state_path).with_context(|| {
        format!(
            "failed to open processed-state store {}",
            config.processed_state_path.display()
        )
    })?;
    let client = HttpDeliveryClient::new(&config.delivery).context("failed to build delivery client")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                // Second signal: the operator wants out now.
                std::process::exit(130);
            }
            tracing::warn!("shutdown requested, finishing current step");
        })
        .context("failed to install signal handler")?;
    }

    tracing::info!(
        directory = %directory.display(),
        store = %config.processed_state_path.display(),
        url = %client.url(),
        format = config.delivery.payload_format.as_str(),
        retry_delay_secs = config.retry_delay_seconds,
        "filerelay starting"
    );

    let mut engine = Engine::new(store, client, config.retry_policy())
        .with_sleeper(ThreadSleeper::interruptible(Arc::clone(&shutdown)))
        .with_shutdown(Arc::clone(&shutdown));

    if once {
        let report = engine
            .run_cycle(directory)
            .context("delivery cycle failed")?;
        if json {
            print_json(&report)?;
        } else {
            print_cycle(&report);
        }
        return Ok(());
    }

    let mut scheduler = Scheduler::new(config.schedule_interval(), Arc::clone(&shutdown));
    if let Some(n) = max_cycles {
        scheduler = scheduler.max_cycles(n);
    }
    let summary = scheduler.run(&mut engine, directory);

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "{} cycle(s): {} delivered, {} rejected, {} failed cycle(s)",
            summary.cycles, summary.succeeded, summary.failed, summary.failed_cycles
        );
    }
    Ok(())
}
