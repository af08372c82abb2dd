use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lsifq",
    version,
    about = "Precise code-intelligence query server",
    after_help = r#"Examples:
  lsifq serve --db ./lsifq.sqlite
  lsifq serve --db ./lsifq.sqlite --bundle-manager-url http://localhost:3187
  lsifq request --db ./lsifq.sqlite --method definitions \
      --params '{"path":"svc/a.go","line":3,"character":5,"uploadId":7}'
  lsifq request --db ./lsifq.sqlite --method references \
      --params '{"repositoryId":1,"commit":"deadbeef","path":"svc/a.go","line":3,"character":5,"uploadId":7,"limit":25}'
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run JSONL RPC server over stdin/stdout.
    Serve {
        /// Path to the metadata store database.
        #[arg(long)]
        db: PathBuf,
        /// Bundle manager base URL; overrides LSIFQ_BUNDLE_MANAGER_URL.
        #[arg(long)]
        bundle_manager_url: Option<String>,
    },
    /// Issue one method call and print the response.
    Request {
        /// Path to the metadata store database.
        #[arg(long)]
        db: PathBuf,
        /// Bundle manager base URL; overrides LSIFQ_BUNDLE_MANAGER_URL.
        #[arg(long)]
        bundle_manager_url: Option<String>,
        #[arg(long)]
        method: String,
        /// Params record as JSON.
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, default_value = "1")]
        id: String,
    },
}
