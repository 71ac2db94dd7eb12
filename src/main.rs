use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use log::{info, warn};

use pupil_pp::data::export::{export_segments, segments_batch};
use pupil_pp::data::loader::{load_session, save_session};
use pupil_pp::{run_job, JobFile};

const USAGE: &str = "usage: pupil-pp <session.parquet|session.json> [job.json]";

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(session_path) = args.next().map(PathBuf::from) else {
        bail!(USAGE);
    };
    let job_path = args.next().map(PathBuf::from);
    if args.next().is_some() {
        bail!(USAGE);
    }

    let job_file = match &job_path {
        Some(path) => read_job(path)?,
        None => JobFile::default(),
    };
    let job = job_file.resolve().context("invalid job")?;

    let mut session = load_session(&session_path)
        .with_context(|| format!("loading {}", session_path.display()))?;
    let (processed, index) = run_job(&mut session, &job).context("preprocessing failed")?;

    if let Some(reason) = processed.reconstruction.degradation() {
        warn!("output channel is degraded: {reason}");
    }
    for (eye, report) in &processed.reports {
        for stage in &report.stages {
            info!(
                "eye {eye}: {:?} removed {} sample(s)",
                stage.stage, stage.invalidated
            );
        }
    }

    save_session(&session_path, &session)
        .with_context(|| format!("saving {}", session_path.display()))?;
    info!(
        "channel {index} ('{}') written to {}",
        session.channels[index].chantype,
        session_path.display()
    );

    let segments = &processed.reconstruction.signal().segments;
    if !segments.is_empty() {
        let table = pretty_format_batches(&[segments_batch(segments)?])
            .context("formatting segment table")?;
        println!("{table}");
    }
    if let Some(csv_path) = &job.segments_csv {
        export_segments(csv_path, segments)?;
        info!("segment statistics written to {}", csv_path.display());
    }

    Ok(())
}

fn read_job(path: &Path) -> Result<JobFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading job file {}", path.display()))?;
    JobFile::from_json(&text).with_context(|| format!("parsing job file {}", path.display()))
}
