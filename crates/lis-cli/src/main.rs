//! `lisctl` - operator CLI for the storage placement engine

mod commands;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use lis_engine::{EngineConfig, StorageApi};
use lis_http::HttpStorageApi;
use lis_model::LocationType;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn kind_arg() -> Arg {
    Arg::new("type")
        .required(true)
        .value_parser(|s: &str| s.parse::<LocationType>().map_err(|e| e.to_string()))
        .help("Location type: room, device, shelf, rack or box")
}

fn cli() -> Command {
    Command::new("lisctl")
        .version(lis_engine::VERSION)
        .about("Storage capacity, aliquoting, box placement and guarded deletion")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .global(true)
                .help("Backend origin; overrides config and LIS_BASE_URL"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("capacity")
                .about("Occupancy and capacity of every node of a type")
                .arg(kind_arg())
                .arg(Arg::new("id").long("id").help("Only this node")),
        )
        .subcommand(
            Command::new("aliquot")
                .about("Preview or submit an aliquot split")
                .arg(Arg::new("parent").long("parent").required(true).help("Parent sample item id"))
                .arg(
                    Arg::new("remaining")
                        .long("remaining")
                        .required(true)
                        .value_parser(value_parser!(f64))
                        .help("Parent's remaining quantity"),
                )
                .arg(
                    Arg::new("quantity")
                        .long("quantity")
                        .required(true)
                        .help("Total quantity to transfer"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i64))
                        .help("Number of aliquots (1-100)"),
                )
                .arg(Arg::new("notes").long("notes").help("Free-text notes"))
                .arg(
                    Arg::new("submit")
                        .long("submit")
                        .action(ArgAction::SetTrue)
                        .help("Create the aliquots instead of only previewing"),
                ),
        )
        .subcommand(
            Command::new("grid")
                .about("Show a box's coordinate grid")
                .arg(Arg::new("box").long("box").required(true).help("Box id")),
        )
        .subcommand(
            Command::new("assign")
                .about("Place a sample in a box coordinate")
                .arg(Arg::new("box").long("box").required(true).help("Box id"))
                .arg(
                    Arg::new("sample")
                        .long("sample")
                        .required(true)
                        .help("Sample item id, external id or accession number"),
                )
                .arg(Arg::new("coordinate").long("coordinate").required(true).help("e.g. B2 or 2-2"))
                .arg(Arg::new("notes").long("notes").help("Free-text notes")),
        )
        .subcommand(
            Command::new("move")
                .about("Move a placed sample to another coordinate")
                .arg(Arg::new("sample").long("sample").required(true).help("Sample item id"))
                .arg(Arg::new("box").long("box").required(true).help("Target box id"))
                .arg(Arg::new("coordinate").long("coordinate").required(true).help("Target coordinate"))
                .arg(Arg::new("reason").long("reason").help("Reason recorded with the movement")),
        )
        .subcommand(
            Command::new("delete")
                .about("Check constraints and delete a location")
                .arg(kind_arg())
                .arg(Arg::new("id").required(true).help("Node id"))
                .arg(
                    Arg::new("role")
                        .long("role")
                        .action(ArgAction::Append)
                        .help("Role held by the operator (repeatable)"),
                )
                .arg(
                    Arg::new("acknowledge")
                        .long("acknowledge")
                        .action(ArgAction::SetTrue)
                        .help("Acknowledge the warning and delete"),
                ),
        )
}

/// Apply environment then flag overrides on top of the file configuration
fn apply_overrides(
    mut config: EngineConfig,
    env_base_url: Option<String>,
    env_log: Option<String>,
    flag_base_url: Option<&String>,
) -> EngineConfig {
    if let Some(url) = env_base_url {
        config = config.with_base_url(url);
    }
    if let Some(level) = env_log {
        config = config.with_log_level(level);
    }
    if let Some(url) = flag_base_url {
        config = config.with_base_url(url.clone());
    }
    config
}

fn resolve_config(matches: &ArgMatches) -> Result<EngineConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let config = apply_overrides(
        config,
        std::env::var("LIS_BASE_URL").ok(),
        std::env::var("LIS_LOG").ok(),
        matches.get_one::<String>("base-url"),
    );
    config.validate()?;
    Ok(config)
}

fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let config = resolve_config(matches)?;
    init_tracing(&config.log_level, matches.get_flag("log-json"));
    tracing::debug!(base_url = %config.base_url, "lisctl starting");

    let api: Arc<dyn StorageApi> = Arc::new(HttpStorageApi::new(config.clone())?);
    dispatch(api, &config, matches).await
}

async fn dispatch(api: Arc<dyn StorageApi>, config: &EngineConfig, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("capacity", args)) => commands::capacity(api.as_ref(), args).await,
        Some(("aliquot", args)) => commands::aliquot(api, args).await,
        Some(("grid", args)) => commands::grid(api.as_ref(), args).await,
        Some(("assign", args)) => commands::assign(api, args).await,
        Some(("move", args)) => commands::move_sample(api, args).await,
        Some(("delete", args)) => commands::delete(api, config, args).await,
        Some((other, _)) => anyhow::bail!("unknown command {other}"),
        None => anyhow::bail!("no command given"),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    if let Err(e) = run(&matches).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lis_model::{NodeId, SampleItemId};
    use lis_test_utils::{seeded_storage, InMemoryStorage};
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> ArgMatches {
        cli().try_get_matches_from(args).unwrap()
    }

    async fn run_against(storage: &Arc<InMemoryStorage>, args: &[&str]) -> Result<()> {
        let api: Arc<dyn StorageApi> = storage.clone();
        dispatch(api, &EngineConfig::default(), &parse(args)).await
    }

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn flag_beats_environment() {
        let flag = "https://flag.example".to_string();
        let config = apply_overrides(
            EngineConfig::default(),
            Some("https://env.example".into()),
            Some("debug".into()),
            Some(&flag),
        );
        assert_eq!(config.base_url, "https://flag.example");
        assert_eq!(config.log_level, "debug");

        let config = apply_overrides(EngineConfig::default(), Some("https://env.example".into()), None, None);
        assert_eq!(config.base_url, "https://env.example");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn location_type_accepts_plurals() {
        let matches = parse(&["lisctl", "capacity", "Shelves"]);
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<LocationType>("type"), Some(&LocationType::Shelf));
        assert!(cli().try_get_matches_from(["lisctl", "capacity", "drawer"]).is_err());
    }

    #[tokio::test]
    async fn capacity_reports_known_nodes() {
        let storage = Arc::new(seeded_storage(false));
        run_against(&storage, &["lisctl", "capacity", "device"]).await.unwrap();
        assert!(run_against(&storage, &["lisctl", "capacity", "rack", "--id", "99"])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn aliquot_preview_does_not_submit() {
        let storage = Arc::new(seeded_storage(false));
        run_against(
            &storage,
            &["lisctl", "aliquot", "--parent", "102", "--remaining", "10", "--quantity", "10", "--count", "3"],
        )
        .await
        .unwrap();
        assert!(storage.calls().is_empty());

        assert!(run_against(
            &storage,
            &["lisctl", "aliquot", "--parent", "102", "--remaining", "10", "--quantity", "11", "--count", "3"],
        )
        .await
        .is_err());
    }

    #[tokio::test]
    async fn assign_then_move() {
        let storage = Arc::new(seeded_storage(false));
        run_against(
            &storage,
            &["lisctl", "assign", "--box", "9", "--sample", "EXT-102", "--coordinate", "a1"],
        )
        .await
        .unwrap();
        assert_eq!(
            storage.placement(&SampleItemId::from("102")),
            Some((NodeId::from(9u64), "A1".to_string()))
        );

        run_against(
            &storage,
            &["lisctl", "move", "--sample", "102", "--box", "10", "--coordinate", "3-3"],
        )
        .await
        .unwrap();
        assert_eq!(
            storage.placement(&SampleItemId::from("102")),
            Some((NodeId::from(10u64), "3-3".to_string()))
        );

        assert!(run_against(
            &storage,
            &["lisctl", "assign", "--box", "9", "--sample", "EXT-103", "--coordinate", "C4"],
        )
        .await
        .is_err());
    }

    #[tokio::test]
    async fn delete_requires_acknowledgement_and_admin_role() {
        let storage = Arc::new(seeded_storage(true));
        run_against(&storage, &["lisctl", "delete", "room", "2"]).await.unwrap();
        assert!(storage.contains(LocationType::Room, &NodeId::from(2u64)));

        assert!(run_against(&storage, &["lisctl", "delete", "room", "1", "--acknowledge"])
            .await
            .is_err());
        assert!(storage.contains(LocationType::Room, &NodeId::from(1u64)));

        run_against(
            &storage,
            &["lisctl", "delete", "room", "1", "--role", "Global Administrator", "--acknowledge"],
        )
        .await
        .unwrap();
        assert!(!storage.contains(LocationType::Room, &NodeId::from(1u64)));
    }
}
