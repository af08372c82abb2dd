use anyhow::Result;
use clap::Parser;
use lsifq::{cli, rpc};

fn main() -> Result<()> {
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Serve {
            db,
            bundle_manager_url,
        } => rpc::serve(db, bundle_manager_url),
        cli::Command::Request {
            db,
            bundle_manager_url,
            method,
            params,
            id,
        } => {
            let response = rpc::call(db, bundle_manager_url, method, &params, &id)?;
            println!("{response}");
            Ok(())
        }
    }
}
