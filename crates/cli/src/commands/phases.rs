use crate::error::{Error, Result};
use crate::signals::cancel_on_signal;
use crate::systemctl::agents_running;
use crate::{PhasesCommand, RestartArgs, StartArgs, StatusArgs, StopArgs};

use nodelet::Nodelet;
use nodelet_config::ConfigOverrides;
use nodelet_phases::{PhaseRecord, PhaseStatus, script_file};
use tokio_util::sync::CancellationToken;
use tracing::{Level, warn};

pub async fn phases(command: PhasesCommand) -> Result<()> {
    let verbose = match &command {
        PhasesCommand::List => false,
        PhasesCommand::Start(args) => args.verbose,
        PhasesCommand::Stop(args) => args.verbose,
        PhasesCommand::Restart(args) => args.verbose,
        PhasesCommand::Status(args) => args.verbose,
    };

    // Console output without decoration, like the init scripts.
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_level(false)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let ctx = CancellationToken::new();
    cancel_on_signal(ctx.clone())?;
    let mut nodelet = manual_nodelet(verbose, &ctx).await?;

    match command {
        PhasesCommand::List => {
            print!("{}", list_table(&nodelet.list_phases()));
            Ok(())
        }
        PhasesCommand::Start(args) => start(&mut nodelet, &ctx, &args).await,
        PhasesCommand::Stop(args) => stop(&mut nodelet, &ctx, &args).await,
        PhasesCommand::Restart(args) => restart(&mut nodelet, &ctx, &args).await,
        PhasesCommand::Status(args) => status(&mut nodelet, &ctx, &args).await,
    }
}

/// Overrides for running phases by hand: no daemon side effects and no
/// tolerance for failing checks.
fn manual_overrides(verbose: bool) -> ConfigOverrides {
    ConfigOverrides {
        debug: verbose,
        status_threshold_seconds: Some(0),
        phase_retry: Some(1),
        disable_loop: true,
        disable_sunpike: true,
        disable_ext_file: true,
        disable_config_update: true,
        ..ConfigOverrides::default()
    }
}

async fn manual_nodelet(verbose: bool, ctx: &CancellationToken) -> Result<Nodelet> {
    let config = nodelet_config::load(None, &manual_overrides(verbose))?;
    Ok(Nodelet::from_config(config, ctx.clone()).await?)
}

/// Maps a 1-based phase number to a chain index; 0 means the whole chain
/// and maps to 0 as well.
fn phase_index(phase: usize, len: usize) -> Result<usize> {
    if phase > len {
        return Err(Error::InvalidPhaseIndex(phase));
    }
    Ok(phase.saturating_sub(1))
}

fn ensure_agents_stopped() -> Result<()> {
    if agents_running() {
        return Err(Error::AgentsRunning);
    }
    Ok(())
}

async fn start(nodelet: &mut Nodelet, ctx: &CancellationToken, args: &StartArgs) -> Result<()> {
    ensure_agents_stopped()?;
    let index = phase_index(args.phase, nodelet.chain().len())?;

    let result = start_from(nodelet, ctx, index, args.single).await;
    print!("{}", status_table(&nodelet.list_phases()));
    result
}

async fn start_from(
    nodelet: &mut Nodelet,
    ctx: &CancellationToken,
    index: usize,
    single: bool,
) -> Result<()> {
    if single {
        nodelet.start_single(ctx, index).await?;
    } else {
        nodelet.start_chain(ctx, index).await?;
    }
    Ok(())
}

async fn stop_to(
    nodelet: &mut Nodelet,
    ctx: &CancellationToken,
    index: usize,
    single: bool,
    force: bool,
) -> Result<()> {
    if single {
        nodelet.stop_single(ctx, index).await?;
    } else {
        nodelet.stop_chain(ctx, index, force).await?;
    }
    Ok(())
}

async fn stop(nodelet: &mut Nodelet, ctx: &CancellationToken, args: &StopArgs) -> Result<()> {
    ensure_agents_stopped()?;
    let index = phase_index(args.phase, nodelet.chain().len())?;

    let result = stop_to(nodelet, ctx, index, args.single, args.force).await;
    print!("{}", status_table(&nodelet.list_phases()));
    result
}

async fn restart(nodelet: &mut Nodelet, ctx: &CancellationToken, args: &RestartArgs) -> Result<()> {
    if !args.regen_certs {
        nodelet.skip_gen_certs_phase();
    }
    ensure_agents_stopped()?;
    let index = phase_index(args.phase, nodelet.chain().len())?;

    if let Err(e) = stop_to(nodelet, ctx, index, args.single, false).await {
        warn!("failed to cleanly stop the stack, attempting to start anyway: {e}");
    }

    let result = start_from(nodelet, ctx, index, args.single).await;
    print!("{}", status_table(&nodelet.list_phases()));
    result
}

async fn status(nodelet: &mut Nodelet, ctx: &CancellationToken, args: &StatusArgs) -> Result<()> {
    let running = match args.phase {
        Some(phase) => {
            let len = nodelet.chain().len();
            if phase == 0 || phase > len {
                return Err(Error::InvalidPhaseIndex(phase));
            }
            let records = nodelet.phases_status(ctx, Some(phase - 1)).await;
            print!("{}", status_table_for(&records, phase));
            records.iter().all(|r| r.status == PhaseStatus::Running)
        }
        None => {
            let running = nodelet.status(ctx).await;
            print!("{}", status_table(&nodelet.list_phases()));
            running
        }
    };

    if !running {
        return Err(Error::NotRunning);
    }
    println!("Platform9 Kubernetes stack is running");
    Ok(())
}

fn list_table(records: &[PhaseRecord]) -> String {
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let file = script_file(record.order).unwrap_or("-");
            vec![
                (i + 1).to_string(),
                file.to_string(),
                record.name.clone(),
                format!("{file} status"),
            ]
        })
        .collect::<Vec<_>>();

    render_table(&["Index Number", "File", "Name", "Status Check"], &rows)
}

fn status_table(records: &[PhaseRecord]) -> String {
    status_table_for(records, 1)
}

/// Status table whose first row is numbered `first`.
fn status_table_for(records: &[PhaseRecord], first: usize) -> String {
    let rows = records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            vec![
                (first + i).to_string(),
                record.name.clone(),
                record.status.to_string(),
            ]
        })
        .collect::<Vec<_>>();

    render_table(&["Index Number", "Name", "Phase Status"], &rows)
}

/// Left-aligned, borderless table with uppercase headers.
fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.len()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let header = headers.iter().map(|h| h.to_uppercase()).collect::<Vec<_>>();
    std::iter::once(&header)
        .chain(rows)
        .map(|row| {
            let line = row
                .iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("   ");
            format!("{}\n", line.trim_end())
        })
        .collect()
}
