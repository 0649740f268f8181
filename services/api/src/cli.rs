use crate::demo::{run_billing_export, run_demo, BillingExportArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use prevcare::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Prevention Cascade Service",
    about = "Run the HIV prevention care-cascade service and billing tools from the command line",
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
    /// Billing ledger projections for the program payer
    Billing {
        #[command(subcommand)]
        command: BillingCommand,
    },
    /// Run an end-to-end CLI demo covering the full care cascade
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum BillingCommand {
    /// Export accepted billing events as the payer CSV
    Export(BillingExportArgs),
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
        Command::Billing {
            command: BillingCommand::Export(args),
        } => run_billing_export(args),
        Command::Demo(args) => run_demo(args),
    }
}
