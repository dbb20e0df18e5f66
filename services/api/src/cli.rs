use crate::demo::{run_demo, run_policy_show, DemoArgs, PolicyShowArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use role_verification::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Role Verification Service",
    about = "Run and inspect the role-based identity verification workflow",
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
    /// Walk one applicant through registration, document review, and approval
    Demo(DemoArgs),
    /// Inspect the role policy table the service would load
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Print each role with its required and optional document types
    Show(PolicyShowArgs),
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
        Command::Demo(args) => run_demo(args),
        Command::Policy {
            command: PolicyCommand::Show(args),
        } => run_policy_show(args),
    }
}
