//! `snapshot`: one poll cycle, printed through the viewer's scope.

use std::sync::Arc;

use rescuelink_core::{Collection, RecordFilter, StaticSession, SyncFacade};

use crate::cli::{GlobalOpts, SnapshotArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, Painter};

pub async fn handle(args: SnapshotArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resolved = config::resolve(global)?;
    let collection = Collection::from(args.collection);
    let viewer = args.scope.viewer();

    let mut filters = vec![RecordFilter::VisibleTo(viewer.clone())];
    if args.unresolved {
        filters.push(RecordFilter::Unresolved);
    }
    if let Some(min) = args.min_severity {
        filters.push(RecordFilter::AtLeast(min.into()));
    }

    let session = Arc::new(StaticSession::new(resolved.token).with_role(viewer.role));
    let records = SyncFacade::oneshot(resolved.sync, session, |facade| async move {
        Ok(facade.snapshot(collection, &viewer))
    })
    .await
    .map_err(|e| CliError::from(e).for_profile(&resolved.profile_name))?;

    let records: Vec<_> = records
        .into_iter()
        .filter(|r| filters.iter().all(|f| f.matches(r)))
        .collect();

    let out = output::render_records(global.output, &records, Painter::new(global.color))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
