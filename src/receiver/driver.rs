use super::host::Host;
use super::{ReceiverError, ReceiverHandle};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Ticks `handle` against `host` at `tick_hz` until `cancel` fires
///
/// Stands in for a host application's frame loop. The handle is stopped with
/// the host before returning so held hotkeys are released and the reader is
/// told to shut down.
pub async fn run_tick_loop<H: Host>(
    mut handle: ReceiverHandle,
    mut host: H,
    tick_hz: u32,
    cancel: CancellationToken,
) -> Result<H, ReceiverError> {
    let period = Duration::from_secs_f64(1.0 / f64::from(tick_hz.max(1)));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Tick loop running at {} Hz", tick_hz);

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Tick loop cancelled");
                break Ok(());
            }
            _ = ticker.tick() => {
                match handle.tick(&mut host) {
                    Ok(report) => {
                        if report.steps > 0 || !report.hotkeys.is_empty() {
                            debug!(
                                "Tick {}: {} mode, backlog {}, steps {}, applied {}",
                                report.tick_sequence,
                                report.mode,
                                report.backlog,
                                report.steps,
                                report.applied.is_some()
                            );
                        }
                    }
                    Err(e) => break Err(e),
                }
            }
        }
    };

    handle.stop_with_host(&mut host);
    result.map(|_| host)
}
