//! Periodic demo messages.
//!
//! Every tick, each connected domain gets `from tart-eventsource <n>` at
//! `ansible://<domain>/#demo`, routed through the receptionist the
//! transport handed out. Domains that disconnected are forgotten first.

use std::sync::Arc;
use std::time::Duration;

use tart_eventsource::{DomainRegistry, Message, SCHEME};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ansible::LoggingAnsible;

/// Capability every demo message is addressed to.
pub const DEMO_CAPABILITY: &str = "demo";

fn demo_message(domain: &str, tick: u64) -> Message {
    let address = format!("{SCHEME}://{domain}/#{DEMO_CAPABILITY}");
    Message::new(address, format!("from tart-eventsource {tick}")).on_fail(|e| {
        warn!(error = %e, "Demo message failed");
    })
}

/// Send demo messages until `stop` is cancelled.
pub async fn run(
    ansible: Arc<LoggingAnsible>,
    registry: Arc<DomainRegistry>,
    interval: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tick += 1;
        let pruned = ansible.prune(&registry);
        for (domain, receptionist) in ansible.routes() {
            if let Err(e) = receptionist.tell(demo_message(&domain, tick)) {
                warn!(domain = %domain, error = %e, "Receptionist unavailable");
            }
        }
        debug!(tick, domains = ansible.len(), pruned, "Demo tick");
    }

    debug!("Demo sender stopped");
}
