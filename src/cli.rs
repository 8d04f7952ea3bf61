use clap::{Parser, Subcommand};

#[derive(Parser)]
#[clap(name = "scbox", version)]
#[clap(about = "Keep a local directory tree synchronized with an FTP repository", long_about = None)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
    #[clap(long, global = true, help = "Write debug traces to the log file")]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[clap(about = "Push local changes to the remote tree", name = "u", display_order = 1)]
    Upload {},
    #[clap(about = "Pull remote changes into the local tree", name = "d", display_order = 2)]
    Download {},
    #[clap(about = "Synchronize: download, then upload", name = "s", display_order = 3)]
    Sync {},
}
