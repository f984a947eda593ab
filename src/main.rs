use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tunebar::app::{self, AppOptions};
use tunebar::config::{self, ConfigStore};
use tunebar::core::PlayerController;
use tunebar::{audio, library, logging};

#[derive(Parser, Debug)]
#[command(name = "tunebar")]
#[command(about = "A compact always-on-top style music bar for a folder of playlists")]
struct Args {
    /// Music root; every folder one or two levels down becomes a playlist
    #[arg(long)]
    music_dir: Option<PathBuf>,

    /// Where settings.json and logs/ live
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Run without an audio device
    #[arg(long)]
    silent: bool,

    /// Do not start playing the restored track on launch
    #[arg(long)]
    no_autoplay: bool,

    /// Monitor poll interval in milliseconds
    #[arg(long, default_value_t = 500)]
    tick_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_dir = args.config_dir.unwrap_or_else(config::config_root);
    let _log_guard = logging::init(&config_dir.join("logs"))?;

    let music_root = args.music_dir.unwrap_or_else(config::default_music_root);
    tracing::info!(music_root = %music_root.display(), "starting");

    let engine = audio::bind_engine(args.silent)?;
    let catalog = library::scan(&music_root);
    let controller = PlayerController::new(engine, ConfigStore::in_dir(&config_dir), catalog);

    app::run(
        controller,
        AppOptions {
            music_root,
            tick: Duration::from_millis(args.tick_ms.max(10)),
            autoplay: !args.no_autoplay,
        },
    )
}
