use clap::{Arg, Command};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};
use veloren_plot_alloc::{
    terrain::{BlockKind, ChunkGen, ChunkStore, FlatGen, IslandGen},
    PlotAllocator, PlotIndex, PlotRegistry, Settings, WorldId,
};

fn main() -> ExitCode {
    let matches = Command::new("plot-alloc")
        .version(clap::crate_version!())
        .about("Allocates plots on an in-memory world and prints where they went")
        .arg(
            Arg::new("settings")
                .long("settings")
                .value_name("FILE")
                .default_value("plots.ron")
                .help("RON file with the per-world plot layout, created if missing"),
        )
        .arg(
            Arg::new("world")
                .long("world")
                .default_value("default")
                .help("which world of the settings file to allocate in"),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .long("count")
                .default_value("10")
                .value_parser(clap::value_parser!(u32))
                .help("number of plots to allocate"),
        )
        .arg(
            Arg::new("terrain")
                .long("terrain")
                .default_value("islands")
                .value_parser(["flat", "islands"])
                .help("terrain the world is pre-generated with"),
        )
        .arg(
            Arg::new("radius")
                .long("radius")
                .default_value("32")
                .value_parser(clap::value_parser!(i32))
                .help("radius, in chunks, of the pre-generated area around the origin"),
        )
        .get_matches();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings_path = matches
        .get_one::<String>("settings")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("plots.ron"));
    let world = WorldId::from(
        matches
            .get_one::<String>("world")
            .map(String::as_str)
            .unwrap_or("default"),
    );
    let count = matches.get_one::<u32>("count").copied().unwrap_or(10);
    let radius = matches.get_one::<i32>("radius").copied().unwrap_or(32);

    let settings = Settings::load(&settings_path);
    let Some(world_settings) = settings.world(&world).cloned() else {
        error!(%world, ?settings_path, "World is not configured");
        return ExitCode::FAILURE;
    };

    let gen: Box<dyn ChunkGen> = match matches.get_one::<String>("terrain").map(String::as_str) {
        Some("flat") => Box::new(FlatGen {
            height: world_settings.height - 40,
            ground: BlockKind::Earth,
            sea_level: world_settings.height - 10,
        }),
        _ => Box::new(IslandGen {
            seed: 5284,
            sea_level: world_settings.height - 10,
            radius: radius * 4,
        }),
    };
    let terrain = ChunkStore::new(gen);
    let origin_key = veloren_plot_alloc::terrain::chunk_key(world_settings.origin());
    if let Err(e) = terrain.pregenerate(origin_key, radius) {
        error!(?e, "Failed to pre-generate terrain");
        return ExitCode::FAILURE;
    }
    info!(chunks = terrain.len(), "Terrain pre-generated");

    let index = Arc::new(PlotRegistry::new(
        world_settings.origin(),
        world_settings.spacing,
    ));
    let height = world_settings.height;
    let allocator = PlotAllocator::new();
    if let Err(e) = allocator.register_world(
        world.clone(),
        world_settings,
        Arc::clone(&index) as Arc<dyn PlotIndex>,
        Arc::new(terrain),
    ) {
        error!(%e, "Failed to register world");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("plot-alloc")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(?e, "Failed to start the tokio runtime");
            return ExitCode::FAILURE;
        },
    };

    runtime.block_on(async {
        for _ in 0..count {
            match allocator.allocate(&world).await {
                Ok(pos) => println!("{} {} {}", pos.x, pos.y, height),
                Err(e) => {
                    error!(%e, "Stopping");
                    return ExitCode::FAILURE;
                },
            }
        }
        info!(plots = index.len(), "Done");
        ExitCode::SUCCESS
    })
}
