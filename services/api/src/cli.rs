use crate::demo::{run_demo, run_fee_quote, DemoArgs, FeeArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use homestay::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Homestay Registration Service",
    about = "Run the homestay registration workflow service or explore it from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Quote the registration fee for a property
    Fee(FeeArgs),
    /// Walk one application from submission to certificate in-process
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Fee(args) => run_fee_quote(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
