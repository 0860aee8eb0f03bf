//! `watch`: run the sync layer and stream events until interrupted.

use std::sync::Arc;
use std::time::Duration;

use rescuelink_core::{StaticSession, SyncEvent, SyncFacade, Viewer, topics};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, Painter};

/// Narrow an event to what `viewer` may see. `None` drops it entirely.
fn scoped(mut event: SyncEvent, viewer: &Viewer) -> Option<SyncEvent> {
    if event.collection.is_none() {
        // Unrecognized frames carry no records to scope by.
        return viewer.role.sees_everything().then_some(event);
    }
    let before = event.records.len();
    event.records.retain(|r| viewer.can_see(r));
    if before > 0 && event.records.is_empty() {
        return None;
    }
    Some(event)
}

fn wanted(topics: &[String], event: &SyncEvent) -> bool {
    topics.is_empty() || topics.iter().any(|t| t == &event.topic)
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let profile_name = resolved.profile_name;
    let mut sync = resolved.sync;
    if let Some(secs) = args.poll_interval {
        sync.polling_enabled = secs > 0;
        if secs > 0 {
            sync.poll_interval = Duration::from_secs(secs);
        }
    }

    let viewer = args.scope.viewer();
    let session = Arc::new(StaticSession::new(resolved.token).with_role(viewer.role));
    let facade = SyncFacade::new(sync, session.clone())?;
    let painter = Painter::new(global.color);

    // Callbacks run on the sync tasks; hand events to this one for printing.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = facade.subscribe(topics::WILDCARD, move |event: &SyncEvent| {
        let _ = tx.send(event.clone());
    });
    let mut status = facade.watch_status();

    facade
        .start()
        .await
        .map_err(|e| CliError::from(e).for_profile(&profile_name))?;
    info!(profile = %profile_name, "watching");

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut interrupted => {
                debug!("interrupted");
                break Ok(());
            }
            () = &mut deadline => break Ok(()),
            Some(event) = rx.recv() => {
                if !wanted(&args.topics, &event) {
                    continue;
                }
                if let Some(event) = scoped(event, &viewer) {
                    match output::render_event(global.output, &event, painter) {
                        Ok(line) => output::print_output(&line, global.quiet),
                        Err(e) => break Err(e),
                    }
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = status.borrow_and_update().clone();
                if !global.quiet {
                    eprintln!("{}", output::render_status(&current, painter));
                }
                if current.auth_rejected || session.is_rejected() {
                    break Err(CliError::AuthFailed {
                        profile: profile_name.clone(),
                    });
                }
            }
        }
    };

    facade.stop().await;
    outcome
}
