mod dedup_cmd;
mod sub_parse;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Fetch every subscription source listed in --input and write one deduplicated link file per source.
  Dedup(dedup_cmd::Args),

  /// Parse subscription text (vless/vmess/trojan/ss/ssr/hy2/tuic links) and output fingerprinted JSONL.
  SubParse(sub_parse::Args),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let cli = Cli::parse();
  match cli.command {
    Commands::Dedup(args) => dedup_cmd::run(args).await,
    Commands::SubParse(args) => sub_parse::run(args).await,
  }
}
