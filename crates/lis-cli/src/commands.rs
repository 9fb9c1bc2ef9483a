//! Subcommand handlers

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use futures::future::try_join_all;
use lis_engine::aliquot::{self, AliquotForm};
use lis_engine::api::NodeFilter;
use lis_engine::capacity::{classify, classify_in_tree};
use lis_engine::grid::{coordinate_label, is_occupied};
use lis_engine::{
    Actor, AliquotSplitter, BoxGridAssigner, DeletionEvent, DeletionGuard, DeletionOutcome, DeletionState,
    DeletionWorkflow, EngineConfig, PlacementSession, PlacementStatus, StorageApi, ViewScope,
};
use lis_model::{LocationType, NodeId, SampleItem, StorageBox, StorageTree};
use std::sync::Arc;

fn required<T>(args: &ArgMatches, name: &str) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

async fn load_tree(api: &dyn StorageApi) -> Result<StorageTree> {
    let filter = NodeFilter::all();
    let listings = try_join_all(LocationType::ALL.into_iter().map(|kind| {
        let filter = &filter;
        async move {
            api.list_nodes(kind, filter)
                .await
                .map(|nodes| (kind, nodes))
                .with_context(|| format!("listing {}", kind.plural()))
        }
    }))
    .await?;

    let mut tree = StorageTree::new();
    for (kind, nodes) in listings {
        for node in nodes {
            tree.insert(kind, node);
        }
    }
    if let Err(e) = tree.validate() {
        tracing::warn!(error = %e, "hierarchy has dangling parents");
    }
    Ok(tree)
}

pub(crate) async fn capacity(api: &dyn StorageApi, args: &ArgMatches) -> Result<()> {
    let kind: LocationType = required(args, "type")?;
    let only = args.get_one::<String>("id").map(|id| NodeId::from(id.as_str()));
    let tree = load_tree(api).await?;

    let mut shown = 0;
    for (key, node) in tree.of_kind(kind) {
        if only.as_ref().is_some_and(|id| id != &key.id) {
            continue;
        }
        let Some(report) = classify_in_tree(&tree, key) else {
            continue;
        };
        let severity = report.severity().map_or_else(|| "-".to_string(), |s| s.to_string());
        println!("{:<8} {:<24} {:<18} {}", key.id, node.display_name(), report.label(), severity);
        shown += 1;
    }
    if shown == 0 {
        bail!("no matching {} found", kind.plural());
    }
    Ok(())
}

pub(crate) async fn aliquot(api: Arc<dyn StorageApi>, args: &ArgMatches) -> Result<()> {
    let parent_id: String = required(args, "parent")?;
    let remaining: f64 = required(args, "remaining")?;
    let quantity: String = required(args, "quantity")?;
    let count: i64 = required(args, "count")?;

    let parent = SampleItem::new(parent_id.as_str(), parent_id.as_str(), remaining);
    let mut form = AliquotForm::new(quantity, count);
    if let Some(notes) = args.get_one::<String>("notes") {
        form = form.with_notes(notes.clone());
    }

    println!("Quantity per aliquot: {}", aliquot::preview(&parent, &form)?);
    if !args.get_flag("submit") {
        return Ok(());
    }

    let splitter = AliquotSplitter::new(api, ViewScope::new());
    let split = splitter.submit(&parent, &form).await?;
    for created in split.created() {
        println!("created {} ({})", created.external_id, created.id);
    }
    if let Some(left) = split.response.parent_updated_remaining_quantity {
        println!("Parent remaining: {left:.3}");
    }
    if let Some(discrepancy) = split.discrepancy {
        eprintln!("warning: {discrepancy}");
    }
    Ok(())
}

/// One line per row; occupied cells are bracketed
fn render_grid(storage_box: &StorageBox) -> String {
    let schema = storage_box.schema();
    let mut out = String::new();
    for row in 0..storage_box.rows() {
        let line: String = (0..storage_box.columns())
            .map(|col| {
                let label = coordinate_label(schema, row, col);
                if is_occupied(storage_box, &label) {
                    format!("[{label:^5}]")
                } else {
                    format!(" {label:^5} ")
                }
            })
            .collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

pub(crate) async fn grid(api: &dyn StorageApi, args: &ArgMatches) -> Result<()> {
    let box_id: String = required(args, "box")?;
    let storage_box = api.get_box(&NodeId::from(box_id.as_str())).await?;
    println!(
        "{} ({})",
        storage_box.node.display_name(),
        classify(&storage_box.node).label()
    );
    print!("{}", render_grid(&storage_box));
    Ok(())
}

async fn session_for_box(
    assigner: &BoxGridAssigner,
    api: &dyn StorageApi,
    box_id: &NodeId,
) -> Result<PlacementSession> {
    let storage_box = api.get_box(box_id).await?;
    let rack = storage_box
        .node
        .parent_id
        .clone()
        .with_context(|| format!("box {box_id} is not in a rack"))?;
    let mut session = PlacementSession::new();
    assigner.load_rack(&mut session, rack).await?;
    session.select_box(box_id)?;
    Ok(session)
}

fn report_placement(session: &PlacementSession) {
    match session.status() {
        Some(PlacementStatus::Success {
            coordinate,
            box_label,
            hierarchical_path,
        }) => {
            println!("Placed at {coordinate} in {box_label}");
            if let Some(path) = hierarchical_path {
                println!("{path}");
            }
        }
        Some(PlacementStatus::Failed { message }) => eprintln!("Placement failed: {message}"),
        None => {}
    }
}

pub(crate) async fn assign(api: Arc<dyn StorageApi>, args: &ArgMatches) -> Result<()> {
    let box_id = NodeId::from(required::<String>(args, "box")?);
    let sample: String = required(args, "sample")?;
    let coordinate: String = required(args, "coordinate")?;

    let assigner = BoxGridAssigner::new(api.clone(), ViewScope::new());
    let mut session = session_for_box(&assigner, api.as_ref(), &box_id).await?;
    session.set_sample(sample);
    if let Some(notes) = args.get_one::<String>("notes") {
        session.set_notes(notes.clone());
    }
    session.select_coordinate(&coordinate)?;

    let result = assigner.assign(&mut session).await;
    report_placement(&session);
    result?;
    Ok(())
}

pub(crate) async fn move_sample(api: Arc<dyn StorageApi>, args: &ArgMatches) -> Result<()> {
    let box_id = NodeId::from(required::<String>(args, "box")?);
    let sample: String = required(args, "sample")?;
    let coordinate: String = required(args, "coordinate")?;

    let assigner = BoxGridAssigner::new(api.clone(), ViewScope::new());
    let mut session = session_for_box(&assigner, api.as_ref(), &box_id).await?;
    session.set_sample(sample);
    session.select_coordinate(&coordinate)?;

    let result = assigner
        .move_sample(&mut session, args.get_one::<String>("reason").cloned())
        .await;
    report_placement(&session);
    result?;
    Ok(())
}

pub(crate) async fn delete(api: Arc<dyn StorageApi>, config: &EngineConfig, args: &ArgMatches) -> Result<()> {
    let kind: LocationType = required(args, "type")?;
    let id: String = required(args, "id")?;
    let actor = Actor::with_roles(
        args.get_many::<String>("role")
            .map(|roles| roles.cloned().collect::<Vec<_>>())
            .unwrap_or_default(),
    );

    let workflow = DeletionWorkflow::new(api, ViewScope::new());
    let mut guard = DeletionGuard::new(kind, id.as_str(), actor.is_admin(config));
    workflow.check(&mut guard).await?;

    match guard.state() {
        DeletionState::Deletable { .. } => println!("{kind} {id} has no dependants"),
        DeletionState::CascadeConfirmable { message, summary, .. } => {
            println!("{message}");
            println!("{}", summary.describe());
        }
        DeletionState::Blocked { message, .. } => bail!("{message}"),
        other => bail!("unexpected deletion state: {}", other.phase()),
    }

    if !args.get_flag("acknowledge") {
        println!("Re-run with --acknowledge to delete");
        return Ok(());
    }
    guard.apply(DeletionEvent::Acknowledge(true))?;
    guard.apply(DeletionEvent::Confirm)?;

    match workflow.delete(&mut guard).await? {
        DeletionOutcome::Deleted => {
            println!("Deleted {kind} {id}");
            Ok(())
        }
        DeletionOutcome::Blocked(message) | DeletionOutcome::Failed(message) => bail!(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lis_model::PositionSchema;
    use pretty_assertions::assert_eq;

    #[test]
    fn grid_marks_occupied_cells() {
        let storage_box = StorageBox::new(1u64, "Box", 2, 3).with_occupied("B2", "7", "EXT-7");
        assert_eq!(
            render_grid(&storage_box),
            "  A1     A2     A3\n  B1   [ B2  ]  B3\n"
        );
    }

    #[test]
    fn grid_uses_number_schema() {
        let storage_box = StorageBox::new(1u64, "Box", 1, 2).with_schema(PositionSchema::NumberNumber);
        assert_eq!(render_grid(&storage_box), "  1-1    1-2\n");
    }
}
