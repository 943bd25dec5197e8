//! Reclaimer thread - drains unreachability notices
//!
//! Exits once every sender (the reclaimer and all live guards) is gone.

use super::{Notice, Shared};
use crate::logging::{debug, info};
use flume::Receiver;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(super) fn spawn(
    name: &str,
    shared: Arc<Shared>,
    notices: Receiver<Notice>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run(shared, notices))
}

fn run(shared: Arc<Shared>, notices: Receiver<Notice>) {
    debug!("Reclaimer thread started");

    while let Ok(notice) = notices.recv() {
        match notice {
            Notice::Unreachable(id) => {
                shared.reclaim(id);
                shared.mark_pending(-1);
            }
            Notice::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    let leftover = shared.registry.len();
    if leftover > 0 {
        info!(registrations = leftover, "Reclaimer stopping with live registrations");
    } else {
        debug!("Reclaimer thread stopped");
    }
}
