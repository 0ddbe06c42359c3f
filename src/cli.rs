use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (any format the config crate understands)
    #[arg(long)]
    pub config: Option<String>,
    /// Render notifications to stdout instead of delivering them
    #[arg(long)]
    pub dry_run: bool,
}
