mod cli;

use clap::Parser;
use cli::{Args, Commands};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatsense={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let data_dir = args.data_dir;
    let result = match args.command {
        Commands::Parse { file } => cli::handle_parse(&file, data_dir),
        Commands::Process { file } => cli::handle_process(&file, data_dir),
        Commands::Profiles { main_user, platform } => {
            cli::handle_profiles(&main_user, platform.as_deref(), data_dir)
        }
        Commands::Context { participant, main_user, platform } => {
            cli::handle_context(&participant, &main_user, platform.as_deref(), data_dir)
        }
        Commands::Updates { file, limit } => cli::handle_updates(&file, limit, data_dir),
    };

    if let Err(e) = result {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}
