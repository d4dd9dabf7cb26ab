use crate::demo::{run_demo, run_report, DemoArgs, ReportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use mvj::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "mvj-api",
    about = "Land lease administration service and command line tools",
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
    /// Seed demo data and walk through charging, payment and crediting
    Demo(DemoArgs),
    /// Run a leasing report over the demo data
    Report(ReportArgs),
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
        Command::Demo(args) => run_demo(args).await,
        Command::Report(args) => run_report(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["mvj-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn report_takes_slug_and_query() {
        let cli = Cli::try_parse_from([
            "mvj-api",
            "report",
            "invoice_payments",
            "--query",
            "start_date=2024-01-01&end_date=2024-12-31",
            "--format",
            "csv",
        ])
        .expect("parses");
        let Some(Command::Report(args)) = cli.command else {
            panic!("expected the report command");
        };
        assert_eq!(args.slug, "invoice_payments");
        assert_eq!(
            args.query.as_deref(),
            Some("start_date=2024-01-01&end_date=2024-12-31")
        );
    }
}
