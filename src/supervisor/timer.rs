// src/supervisor/timer.rs

//! Periodic command execution.
//!
//! Each tick starts its own run; a run still going when the next tick
//! fires is not waited for, so slow commands can overlap.

use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TimerSpec;
use crate::engine::Engine;
use crate::exec::pipeline;

/// Run `spec` every `spec.tick` until the service starts shutting down.
///
/// The first run happens one full tick after start. A command that cannot
/// be built stops the timer for good.
pub async fn run_timer(name: String, spec: TimerSpec, engine: Arc<Engine>) {
    if spec.tick.is_zero() {
        warn!(timer = %name, "tick not set; timer disabled");
        return;
    }

    let command = spec.to_command();
    let mut ticker = interval_at(Instant::now() + spec.tick, spec.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(timer = %name, tick = ?spec.tick, "starting timer");

    loop {
        ticker.tick().await;
        if engine.processes().is_exiting() {
            break;
        }

        let built = {
            let resolver = engine.resolver(None);
            match engine.builder().build(&command, &resolver) {
                Ok(built) => built,
                Err(e) => {
                    warn!(timer = %name, error = %e, "create timer command failed");
                    break;
                }
            }
        };

        let timer_name = name.clone();
        let deadline = spec.deadline;
        tokio::spawn(async move {
            match pipeline::run_foreground(&built, None, deadline).await {
                Ok(out) => debug!(timer = %timer_name, bytes = out.len(), "timer command done"),
                Err(e) => warn!(timer = %timer_name, error = %e, "timer command execution failed"),
            }
        });
    }

    info!(timer = %name, "timer stopped");
}
